#![allow(deprecated)] // TODO: cargo_bin → cargo_bin_cmd! へ移行

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;
use tempfile::TempDir;

const MANIFEST: &str = r#"
ssh_keys:
  deploy:
    label: deploy
    key: ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIExample user@laptop

instances:
  web:
    label: web-1
    hostname: web-1.example.com
    location: MIA1
    plan: plan-1
    image: ubuntu-22-04
    ssh_keys: [deploy]
    password: change-me-please
"#;

/// モックトークンでインメモリのゲートウェイを使うコマンド
fn letsflow(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("letsflow").unwrap();
    cmd.current_dir(dir)
        .env("LETSCLOUD_API_TOKEN", "mock-token-for-testing")
        .env("LETSFLOW_CONFIG_PATH", dir.join("no-config.yaml"))
        .env("NO_COLOR", "1")
        .env_remove("LETSCLOUD_API_URL")
        .env_remove("LETSFLOW_MANIFEST")
        .env_remove("RUST_LOG");
    cmd
}

fn project_with_manifest() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("letsflow.yaml"), MANIFEST).unwrap();
    dir
}

fn read_state(dir: &Path) -> serde_json::Value {
    let content = std::fs::read_to_string(dir.join(".letsflow/state.json")).unwrap();
    serde_json::from_str(&content).unwrap()
}

/// CLIヘルプが正しく表示されることを確認
#[test]
fn test_cli_help() {
    let mut cmd = Command::cargo_bin("letsflow").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("apply"))
        .stdout(predicate::str::contains("destroy"))
        .stdout(predicate::str::contains("import"))
        .stdout(predicate::str::contains("ssh-keys"));
}

/// バージョン表示が正しく動作することを確認
#[test]
fn test_cli_version() {
    let mut cmd = Command::cargo_bin("letsflow").unwrap();
    cmd.arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("letsflow"));
}

/// 不正なコマンドでエラーになることを確認
#[test]
fn test_invalid_command() {
    let mut cmd = Command::cargo_bin("letsflow").unwrap();
    cmd.arg("invalid-command").assert().failure();
}

/// トークン未設定ではネットワークを使うコマンドが失敗することを確認
#[test]
fn test_missing_token() {
    let dir = tempfile::tempdir().unwrap();
    letsflow(dir.path())
        .env_remove("LETSCLOUD_API_TOKEN")
        .args(["plans", "MIA1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("APIトークン"));
}

/// 短すぎるトークンは接続前に拒否されることを確認
#[test]
fn test_short_token_rejected() {
    let dir = tempfile::tempdir().unwrap();
    letsflow(dir.path())
        .env("LETSCLOUD_API_TOKEN", "short")
        .args(["ssh-keys", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("APIトークンが不正です"));
}

#[test]
fn test_plans() {
    let dir = tempfile::tempdir().unwrap();
    letsflow(dir.path())
        .args(["plans", "MIA1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("plan-1"))
        .stdout(predicate::str::contains("10.00 USD"));
}

#[test]
fn test_ssh_keys_list_empty() {
    let dir = tempfile::tempdir().unwrap();
    letsflow(dir.path())
        .args(["ssh-keys", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("SSHキーはありません"));
}

/// ID もラベルも指定しないと検証エラーになることを確認
#[test]
fn test_ssh_keys_show_requires_selector() {
    let dir = tempfile::tempdir().unwrap();
    letsflow(dir.path())
        .args(["ssh-keys", "show"])
        .assert()
        .failure();
}

#[test]
fn test_ssh_keys_show_unknown_label() {
    let dir = tempfile::tempdir().unwrap();
    letsflow(dir.path())
        .args(["ssh-keys", "show", "--label", "missing"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No SSH key found with label 'missing'"));
}

/// マニフェストがないと apply は失敗することを確認
#[test]
fn test_apply_without_manifest() {
    let dir = tempfile::tempdir().unwrap();
    letsflow(dir.path())
        .arg("apply")
        .assert()
        .failure()
        .stderr(predicate::str::contains("マニフェストが見つかりません"));
}

#[test]
fn test_apply_records_state() {
    let dir = project_with_manifest();

    letsflow(dir.path())
        .arg("apply")
        .assert()
        .success()
        .stdout(predicate::str::contains("mock-ssh-key-1"))
        .stdout(predicate::str::contains("web-1 [mock-instance-1] running"))
        .stdout(predicate::str::contains("反映が完了しました"));

    let state = read_state(dir.path());
    assert_eq!(state["ssh_keys"]["deploy"]["id"], "mock-ssh-key-1");
    let web = &state["instances"]["web"];
    assert_eq!(web["id"], "mock-instance-1");
    assert_eq!(web["state"], "running");
    assert_eq!(web["ipv4"], "192.168.1.1");
    assert_eq!(web["ipv6"], "2001:db8::1");
    assert_eq!(web["ssh_keys"][0], "mock-ssh-key-1");
    assert_eq!(web["plan"], "plan-1");

    // ロックは解放済み
    assert!(!dir.path().join(".letsflow/lock.json").exists());
}

/// 状態表示はネットワークを使わない
#[test]
fn test_state_after_apply() {
    let dir = project_with_manifest();
    letsflow(dir.path()).arg("apply").assert().success();

    letsflow(dir.path())
        .env_remove("LETSCLOUD_API_TOKEN")
        .arg("state")
        .assert()
        .success()
        .stdout(predicate::str::contains("deploy"))
        .stdout(predicate::str::contains("mock-instance-1"));
}

#[test]
fn test_state_empty() {
    let dir = tempfile::tempdir().unwrap();
    letsflow(dir.path())
        .arg("state")
        .assert()
        .success()
        .stdout(predicate::str::contains("管理中のリソースはありません"));
}

/// --yes がなければ何も削除しない
#[test]
fn test_destroy_requires_yes() {
    let dir = project_with_manifest();
    letsflow(dir.path()).arg("apply").assert().success();

    letsflow(dir.path())
        .arg("destroy")
        .assert()
        .success()
        .stdout(predicate::str::contains("--yes"));

    let state = read_state(dir.path());
    assert_eq!(state["instances"]["web"]["id"], "mock-instance-1");
}

/// 別プロセスのインメモリゲートウェイにはリソースがないため、
/// 削除済みとして状態から外れる
#[test]
fn test_destroy_removes_from_state() {
    let dir = project_with_manifest();
    letsflow(dir.path()).arg("apply").assert().success();

    letsflow(dir.path())
        .args(["destroy", "--yes"])
        .assert()
        .success();

    let state = read_state(dir.path());
    assert!(state["instances"].as_object().is_none_or(|m| m.is_empty()));
    assert!(state["ssh_keys"].as_object().is_none_or(|m| m.is_empty()));
}

#[test]
fn test_destroy_unknown_name() {
    let dir = tempfile::tempdir().unwrap();
    letsflow(dir.path())
        .args(["destroy", "nothing", "--yes"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("nothing"));
}

/// リモートに存在しないリソースは refresh で状態から外れる
#[test]
fn test_refresh_drops_missing_resources() {
    let dir = project_with_manifest();
    letsflow(dir.path()).arg("apply").assert().success();

    letsflow(dir.path())
        .arg("refresh")
        .assert()
        .success()
        .stdout(predicate::str::contains("状態から外しました"));

    let state = read_state(dir.path());
    assert!(state["instances"].as_object().is_none_or(|m| m.is_empty()));
}

#[test]
fn test_import_unknown_instance() {
    let dir = tempfile::tempdir().unwrap();
    letsflow(dir.path())
        .args(["import", "instance", "web", "does-not-exist"])
        .assert()
        .failure();
}

/// マニフェストに id を書くと拒否される
#[test]
fn test_manifest_rejects_computed_fields() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("letsflow.yaml"),
        "instances:\n  web:\n    id: abc\n    label: web-1\n",
    )
    .unwrap();

    letsflow(dir.path())
        .arg("apply")
        .assert()
        .failure()
        .stderr(predicate::str::contains("id と state"));
}
