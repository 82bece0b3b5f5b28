pub mod error;
pub mod settings;
pub mod token;

pub use error::*;
pub use settings::Settings;
pub use token::{ApiToken, MOCK_TOKEN};

use std::path::PathBuf;

pub const ENV_MANIFEST_PATH: &str = "LETSFLOW_MANIFEST";

/// LetsFlowの設定ディレクトリを取得（作成はしない）
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("letsflow");
    Ok(config_dir)
}

/// プロジェクトのマニフェスト (letsflow.yaml) を探す
///
/// 以下の優先順位で検索:
/// 1. 環境変数 LETSFLOW_MANIFEST (直接パス指定)
/// 2. カレントディレクトリ: letsflow.local.yaml, letsflow.yaml, .letsflow.yaml
/// 3. ./.letsflow/ ディレクトリ内: 同様の順序
pub fn find_manifest_file() -> Result<PathBuf> {
    // 1. 環境変数で直接指定
    if let Ok(manifest_path) = std::env::var(ENV_MANIFEST_PATH) {
        let path = PathBuf::from(manifest_path);
        if path.exists() {
            return Ok(path);
        }
    }

    let current_dir = std::env::current_dir()?;
    let candidates = ["letsflow.local.yaml", "letsflow.yaml", ".letsflow.yaml"];

    // 2. カレントディレクトリで検索
    for filename in &candidates {
        let path = current_dir.join(filename);
        if path.exists() {
            return Ok(path);
        }
    }

    // 3. ./.letsflow/ ディレクトリで検索
    let project_dir = current_dir.join(".letsflow");
    if project_dir.is_dir() {
        for filename in &candidates {
            let path = project_dir.join(filename);
            if path.exists() {
                return Ok(path);
            }
        }
    }

    Err(ConfigError::ManifestNotFound)
}
