use crate::engine::Engine;
use crate::project::Project;
use colored::Colorize;

pub async fn handle(
    project: &Project,
    engine: &Engine,
    name: Option<&str>,
    yes: bool,
) -> anyhow::Result<()> {
    let lock = project.state.acquire_lock().await?;
    let mut state = project.state.load().await?;

    // 削除対象（インスタンスを先に、SSHキーは後に）
    let (instances, ssh_keys): (Vec<String>, Vec<String>) = match name {
        Some(name) => {
            let is_instance = state.instances.contains_key(name);
            let is_key = state.ssh_keys.contains_key(name);
            if !is_instance && !is_key {
                anyhow::bail!("リソース '{}' は状態ファイルにありません", name);
            }
            (
                is_instance.then(|| name.to_string()).into_iter().collect(),
                is_key.then(|| name.to_string()).into_iter().collect(),
            )
        }
        None => (
            state.instances.keys().cloned().collect(),
            state.ssh_keys.keys().cloned().collect(),
        ),
    };

    if instances.is_empty() && ssh_keys.is_empty() {
        println!("{}", "削除するリソースがありません".dimmed());
        return Ok(());
    }

    println!("{}", "削除対象:".bold());
    for name in &instances {
        println!("  • インスタンス {}", name.cyan());
    }
    for name in &ssh_keys {
        println!("  • SSHキー {}", name.cyan());
    }

    // 確認（--yesが指定されていない場合）
    if !yes {
        println!();
        println!("{}", "警告: LetsCloud上のリソースを削除します。".yellow());
        println!("実行するには --yes オプションを指定してください");
        return Ok(());
    }

    let mut failures = 0usize;

    for name in &instances {
        let Some(prior) = state.instance(name).cloned() else {
            continue;
        };
        match engine.instances.delete(&prior).await {
            Ok(()) => {
                println!("  {} インスタンス {} を削除しました", "✓".green(), name);
                state.remove_instance(name);
            }
            Err(e) => {
                failures += 1;
                println!("  {} インスタンス {}: {}", "✗".red(), name, e);
            }
        }
        project.state.save(&state).await?;
    }

    for name in &ssh_keys {
        let Some(prior) = state.ssh_key(name).cloned() else {
            continue;
        };
        match engine.ssh_keys.delete(&prior).await {
            Ok(()) => {
                println!("  {} SSHキー {} を削除しました", "✓".green(), name);
                state.remove_ssh_key(name);
            }
            Err(e) if e.is_not_found() => {
                println!(
                    "  {} SSHキー {} は既に存在しません。状態から外しました",
                    "⚠".yellow(),
                    name
                );
                state.remove_ssh_key(name);
            }
            Err(e) => {
                failures += 1;
                println!("  {} SSHキー {}: {}", "✗".red(), name, e);
            }
        }
        project.state.save(&state).await?;
    }

    lock.release().await?;

    if failures > 0 {
        anyhow::bail!("{} 件のリソースの削除に失敗しました", failures);
    }
    Ok(())
}
