use super::describe_instance;
use crate::project::Project;
use colored::Colorize;

pub async fn handle(project: &Project) -> anyhow::Result<()> {
    let state = project.state.load().await?;

    println!("状態ファイル: {}", project.state.state_path().display());
    if state.is_empty() {
        println!("{}", "管理中のリソースはありません".dimmed());
        return Ok(());
    }

    println!(
        "最終更新: {}",
        state.updated_at.format("%Y-%m-%d %H:%M:%S UTC")
    );

    if !state.ssh_keys.is_empty() {
        println!();
        println!("{}", format!("SSHキー ({} 件):", state.ssh_keys.len()).bold());
        for (name, tracked) in &state.ssh_keys {
            let managed = if project.manifest.ssh_keys.contains_key(name) {
                ""
            } else {
                " (マニフェスト外)"
            };
            println!(
                "  • {}: {} [{}]{}",
                name.cyan(),
                tracked.document.label,
                tracked.document.id,
                managed.yellow()
            );
        }
    }

    if !state.instances.is_empty() {
        println!();
        println!(
            "{}",
            format!("インスタンス ({} 件):", state.instances.len()).bold()
        );
        for (name, tracked) in &state.instances {
            let managed = if project.manifest.instances.contains_key(name) {
                ""
            } else {
                " (マニフェスト外)"
            };
            println!(
                "  • {}: {}{}",
                name.cyan(),
                describe_instance(&tracked.document),
                managed.yellow()
            );
        }
    }
    Ok(())
}
