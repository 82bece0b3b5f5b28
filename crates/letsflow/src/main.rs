mod commands;
mod engine;
mod project;

use clap::{Parser, Subcommand};
use letsflow_cloud::OperationContext;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "letsflow")]
#[command(about = "LetsCloud のインスタンスと SSH キーをマニフェストで宣言的に管理", long_about = None)]
struct Cli {
    /// ログを詳細表示 (-v: info, -vv: debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// マニフェストの内容をLetsCloudに反映
    Apply,
    /// 状態ファイルのリソースをLetsCloudから再読み込み
    Refresh,
    /// リソースを削除
    Destroy {
        /// リソース名（省略時は状態ファイルの全リソース）
        name: Option<String>,
        /// 確認なしで実行
        #[arg(short, long)]
        yes: bool,
    },
    /// 既存のリソースを状態ファイルに取り込む
    #[command(subcommand)]
    Import(ImportCommands),
    /// ロケーションで利用できるプランを表示
    Plans {
        /// ロケーションのスラッグ (例: MIA1)
        location: String,
    },
    /// アカウントのSSHキーを参照
    #[command(subcommand)]
    SshKeys(SshKeyCommands),
    /// 状態ファイルの内容を表示
    State,
    /// バージョン情報を表示
    Version,
}

#[derive(Subcommand)]
enum ImportCommands {
    /// インスタンスを取り込む
    Instance {
        /// マニフェスト上のリソース名
        name: String,
        /// LetsCloudのインスタンスID
        id: String,
    },
    /// SSHキーを取り込む
    SshKey {
        /// マニフェスト上のリソース名
        name: String,
        /// LetsCloudのSSHキーID
        id: String,
    },
}

#[derive(Subcommand)]
enum SshKeyCommands {
    /// SSHキーの一覧を表示
    List,
    /// SSHキーをIDまたはラベルで表示
    Show {
        /// SSHキーID（ラベルより優先）
        #[arg(long)]
        id: Option<String>,
        /// SSHキーのラベル
        #[arg(long)]
        label: Option<String>,
    },
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Operation context cancelled on Ctrl-C
fn cancel_on_ctrl_c() -> OperationContext {
    let token = CancellationToken::new();
    let on_signal = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n中断しています...");
            on_signal.cancel();
        }
    });
    OperationContext::with_token(token)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        // 設定不要
        Commands::Version => {
            println!("letsflow {}", env!("CARGO_PKG_VERSION"));
        }
        // ネットワーク不要
        Commands::State => {
            let project = project::Project::discover_for_state()?;
            commands::state::handle(&project).await?;
        }
        Commands::Apply => {
            let project = project::Project::discover()?;
            let engine = engine::Engine::connect().await?;
            let ctx = cancel_on_ctrl_c();
            commands::apply::handle(&project, &engine, &ctx).await?;
        }
        Commands::Refresh => {
            let project = project::Project::discover_for_state()?;
            let engine = engine::Engine::connect().await?;
            commands::refresh::handle(&project, &engine).await?;
        }
        Commands::Destroy { name, yes } => {
            let project = project::Project::discover_for_state()?;
            let engine = engine::Engine::connect().await?;
            commands::destroy::handle(&project, &engine, name.as_deref(), yes).await?;
        }
        Commands::Import(import) => {
            let project = project::Project::discover_for_state()?;
            let engine = engine::Engine::connect().await?;
            match import {
                ImportCommands::Instance { name, id } => {
                    commands::import::handle_instance(&project, &engine, &name, &id).await?;
                }
                ImportCommands::SshKey { name, id } => {
                    commands::import::handle_ssh_key(&project, &engine, &name, &id).await?;
                }
            }
        }
        Commands::Plans { location } => {
            let engine = engine::Engine::connect().await?;
            commands::plans::handle(&engine, &location).await?;
        }
        Commands::SshKeys(cmd) => {
            let engine = engine::Engine::connect().await?;
            match cmd {
                SshKeyCommands::List => commands::ssh_keys::handle_list(&engine).await?,
                SshKeyCommands::Show { id, label } => {
                    commands::ssh_keys::handle_show(&engine, id.as_deref(), label.as_deref())
                        .await?
                }
            }
        }
    }

    Ok(())
}
