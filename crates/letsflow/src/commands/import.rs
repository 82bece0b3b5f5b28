use super::describe_instance;
use crate::engine::Engine;
use crate::project::Project;
use colored::Colorize;

pub async fn handle_instance(
    project: &Project,
    engine: &Engine,
    name: &str,
    id: &str,
) -> anyhow::Result<()> {
    let lock = project.state.acquire_lock().await?;
    let mut state = project.state.load().await?;

    if let Some(existing) = state.instance(name) {
        anyhow::bail!(
            "インスタンス '{}' は既に状態ファイルにあります [{}]",
            name,
            existing.id
        );
    }

    let doc = engine.instances.import(id).await?;
    println!("{} {}: {}", "✓".green(), name, describe_instance(&doc));
    println!(
        "  {}",
        format!(
            "plan/image は API から取得できないため {} / {} を仮に設定しました",
            doc.plan_slug, doc.image_slug
        )
        .dimmed()
    );

    state.set_instance(name, doc);
    project.state.save(&state).await?;
    lock.release().await?;
    Ok(())
}

pub async fn handle_ssh_key(
    project: &Project,
    engine: &Engine,
    name: &str,
    id: &str,
) -> anyhow::Result<()> {
    let lock = project.state.acquire_lock().await?;
    let mut state = project.state.load().await?;

    if let Some(existing) = state.ssh_key(name) {
        anyhow::bail!(
            "SSHキー '{}' は既に状態ファイルにあります [{}]",
            name,
            existing.id
        );
    }

    let doc = engine.ssh_keys.import(id).await?;
    println!("{} {}: {} [{}]", "✓".green(), name, doc.label, doc.id);

    state.set_ssh_key(name, doc);
    project.state.save(&state).await?;
    lock.release().await?;
    Ok(())
}
