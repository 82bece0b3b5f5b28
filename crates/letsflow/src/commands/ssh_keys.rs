use crate::engine::Engine;
use colored::Colorize;
use letsflow_cloud::SshKeySelector;

pub async fn handle_list(engine: &Engine) -> anyhow::Result<()> {
    let keys = engine.ssh_keys.list().await?;

    if keys.is_empty() {
        println!("{}", "SSHキーはありません".dimmed());
        return Ok(());
    }

    println!("{}", format!("SSHキー一覧 ({} 件):", keys.len()).bold());
    for key in &keys {
        println!("  • {} [{}]", key.label.cyan(), key.id);
    }
    Ok(())
}

pub async fn handle_show(
    engine: &Engine,
    id: Option<&str>,
    label: Option<&str>,
) -> anyhow::Result<()> {
    let selector = SshKeySelector::from_parts(id, label)?;
    let key = engine.ssh_keys.lookup(&selector).await?;

    println!("ID:     {}", key.id);
    println!("ラベル: {}", key.label.cyan());
    Ok(())
}
