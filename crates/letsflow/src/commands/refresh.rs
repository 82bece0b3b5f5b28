use super::describe_instance;
use crate::engine::Engine;
use crate::project::Project;
use colored::Colorize;

pub async fn handle(project: &Project, engine: &Engine) -> anyhow::Result<()> {
    println!("{}", "状態を再読み込み中...".blue());

    let lock = project.state.acquire_lock().await?;
    let mut state = project.state.load().await?;
    let mut failures = 0usize;

    if state.is_empty() {
        println!("{}", "状態ファイルにリソースがありません".dimmed());
    }

    let instance_names: Vec<String> = state.instances.keys().cloned().collect();
    for name in instance_names {
        let Some(prior) = state.instance(&name).cloned() else {
            continue;
        };
        match engine.instances.read(&prior).await {
            Ok(doc) => {
                println!("  {} {}: {}", "✓".green(), name, describe_instance(&doc));
                state.set_instance(&name, doc);
            }
            Err(e) if e.is_not_found() => {
                println!(
                    "  {} {}: リモートに存在しないため状態から外しました [{}]",
                    "⚠".yellow(),
                    name,
                    prior.id
                );
                state.remove_instance(&name);
            }
            Err(e) => {
                failures += 1;
                println!("  {} {}: {}", "✗".red(), name, e);
            }
        }
    }

    let key_names: Vec<String> = state.ssh_keys.keys().cloned().collect();
    for name in key_names {
        let Some(prior) = state.ssh_key(&name).cloned() else {
            continue;
        };
        match engine.ssh_keys.read(&prior).await {
            Ok(doc) => {
                println!("  {} {}: {} [{}]", "✓".green(), name, doc.label, doc.id);
                state.set_ssh_key(&name, doc);
            }
            Err(e) if e.is_not_found() => {
                println!(
                    "  {} {}: リモートに存在しないため状態から外しました [{}]",
                    "⚠".yellow(),
                    name,
                    prior.id
                );
                state.remove_ssh_key(&name);
            }
            Err(e) => {
                failures += 1;
                println!("  {} {}: {}", "✗".red(), name, e);
            }
        }
    }

    project.state.save(&state).await?;
    lock.release().await?;

    if failures > 0 {
        anyhow::bail!("{} 件のリソースの読み込みに失敗しました", failures);
    }
    Ok(())
}
