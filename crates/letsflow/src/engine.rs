//! Controllers wired to the configured gateway

use colored::Colorize;
use letsflow_cloud::{InstanceController, SshKeyController};
use letsflow_config::Settings;

pub struct Engine {
    pub instances: InstanceController,
    pub ssh_keys: SshKeyController,
}

impl Engine {
    /// Load settings and connect to LetsCloud (or the in-memory gateway).
    pub async fn connect() -> anyhow::Result<Self> {
        let settings = Settings::load()?;
        let gateway = letsflow_cloud_letscloud::connect(&settings).await?;

        if gateway.name() == "fake" {
            eprintln!(
                "{}",
                "テスト用トークンのため、インメモリのゲートウェイを使用します".yellow()
            );
        }

        Ok(Self {
            instances: InstanceController::new(gateway.clone())
                .with_poll_profiles(settings.discovery_poll, settings.tracking_poll)
                .with_retry(settings.create_retry.clone())
                .with_import_defaults(settings.import_defaults.clone()),
            ssh_keys: SshKeyController::new(gateway),
        })
    }
}
