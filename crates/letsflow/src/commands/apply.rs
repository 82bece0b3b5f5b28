use super::describe_instance;
use crate::engine::Engine;
use crate::project::Project;
use colored::Colorize;
use letsflow_cloud::{
    CloudError, InstanceDocument, OperationContext, ProjectState, SshKeyDocument,
    normalize_public_key,
};

pub async fn handle(project: &Project, engine: &Engine, ctx: &OperationContext) -> anyhow::Result<()> {
    println!("{}", "マニフェストを反映中...".green());
    println!("プロジェクト: {}", project.root.display().to_string().cyan());

    let lock = project.state.acquire_lock().await?;
    let mut state = project.state.load().await?;
    let mut failures = 0usize;

    // SSHキーを先に作成（インスタンスから参照されるため）
    for (name, desired) in &project.manifest.ssh_keys {
        println!();
        println!("{}", format!("■ SSHキー {}", name).bold());
        match apply_ssh_key(engine, &mut state, name, desired).await {
            Ok(()) => {}
            Err(e) => {
                failures += 1;
                println!("  {} {}", "✗".red(), e);
            }
        }
        project.state.save(&state).await?;
    }

    for (name, desired) in &project.manifest.instances {
        if ctx.token().is_cancelled() {
            break;
        }
        println!();
        println!("{}", format!("■ インスタンス {}", name).bold());
        match apply_instance(engine, &mut state, name, desired, ctx).await {
            Ok(()) => {}
            Err(e) => {
                failures += 1;
                println!("  {} {}", "✗".red(), e);
            }
        }
        project.state.save(&state).await?;
    }

    report_orphans(project, &state);
    lock.release().await?;

    println!();
    if failures > 0 {
        anyhow::bail!("{} 件のリソースの反映に失敗しました", failures);
    }
    println!("{}", "✓ 反映が完了しました".green());
    Ok(())
}

async fn apply_ssh_key(
    engine: &Engine,
    state: &mut ProjectState,
    name: &str,
    desired: &SshKeyDocument,
) -> Result<(), CloudError> {
    let Some(prior) = state.ssh_key(name).cloned() else {
        println!("  作成中: {}", desired.label.cyan());
        let created = engine.ssh_keys.create(desired).await?;
        println!("  {} 作成しました [{}]", "✓".green(), created.id);
        state.set_ssh_key(name, created);
        return Ok(());
    };

    let key_changed = !prior.key.is_empty()
        && normalize_public_key(&desired.key).map_or(true, |key| key != prior.key);
    if prior.label != desired.label || key_changed {
        engine.ssh_keys.update(&prior, desired).await?;
    }

    println!("  {} 変更なし [{}]", "•".dimmed(), prior.id);
    Ok(())
}

async fn apply_instance(
    engine: &Engine,
    state: &mut ProjectState,
    name: &str,
    desired: &InstanceDocument,
    ctx: &OperationContext,
) -> Result<(), CloudError> {
    let desired = resolve_ssh_key_refs(state, desired);

    let Some(prior) = state.instance(name).cloned() else {
        println!(
            "  作成中: {} ({}) 準備完了まで待機します...",
            desired.label.cyan(),
            desired.hostname
        );
        let created = engine.instances.create(&desired, ctx).await?;
        println!("  {} {}", "✓".green(), describe_instance(&created));
        state.set_instance(name, created);
        return Ok(());
    };

    let changes = prior.immutable_changes(&desired);
    if !changes.is_empty() {
        println!(
            "  {} 変更できない属性があります ({})。反映するには destroy 後に再度 apply してください",
            "⚠".yellow(),
            changes.join(", ")
        );
    }

    if prior.password_changed(&desired) {
        println!("  パスワードを更新中...");
        let updated = engine.instances.update(&prior, &desired).await?;
        println!("  {} {}", "✓".green(), describe_instance(&updated));
        state.set_instance(name, updated);
    } else {
        println!("  {} 変更なし [{}]", "•".dimmed(), prior.id);
    }
    Ok(())
}

/// Replace SSH key resource names with the identifiers recorded in state.
fn resolve_ssh_key_refs(state: &ProjectState, desired: &InstanceDocument) -> InstanceDocument {
    let mut resolved = desired.clone();
    resolved.ssh_keys = desired
        .ssh_keys
        .iter()
        .map(|r| state.ssh_key_id(r).map(str::to_string).unwrap_or_else(|| r.clone()))
        .collect();
    resolved
}

fn report_orphans(project: &Project, state: &ProjectState) {
    let orphans: Vec<String> = state
        .instances
        .keys()
        .filter(|name| !project.manifest.instances.contains_key(*name))
        .map(|name| format!("インスタンス {}", name))
        .chain(
            state
                .ssh_keys
                .keys()
                .filter(|name| !project.manifest.ssh_keys.contains_key(*name))
                .map(|name| format!("SSHキー {}", name)),
        )
        .collect();

    if orphans.is_empty() {
        return;
    }

    println!();
    println!(
        "{}",
        "マニフェストにないリソースが状態ファイルに残っています（自動削除はしません）:".yellow()
    );
    for orphan in orphans {
        println!("  • {}", orphan);
    }
    println!("削除するには {} を実行してください", "letsflow destroy <name>".cyan());
}
