use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("設定ディレクトリが見つかりません")]
    ConfigDirNotFound,

    #[error(
        "マニフェストが見つかりません。以下の場所を確認してください:\n\
        - カレントディレクトリ: letsflow.local.yaml, letsflow.yaml, .letsflow.yaml\n\
        - ./.letsflow/ ディレクトリ\n\
        または LETSFLOW_MANIFEST 環境変数で直接指定できます"
    )]
    ManifestNotFound,

    #[error(
        "APIトークンが設定されていません。LETSCLOUD_API_TOKEN 環境変数か \
        ~/.config/letsflow/config.yaml の api_token を設定してください"
    )]
    MissingToken,

    #[error("APIトークンが不正です: {0}")]
    InvalidToken(String),

    #[error("設定値が不正です: {0}")]
    InvalidValue(String),

    #[error("設定ファイルの読み込みに失敗しました ({path}): {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("IO エラー: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
