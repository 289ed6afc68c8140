//! End-to-end tests running the `cswap` binary against a fake home.
//!
//! Every test points the binary at a temp home through `CSWAP_*`
//! variables and uses the file vault, so nothing touches the real
//! keychain or `~/.claude`.

use std::fs;
use std::time::Duration;

use assert_cmd::Command;
use predicates::prelude::*;

use cswap::core::lock::VaultLock;
use cswap::test_utils::{TestHost, has_ansi_codes, parse_robot};

mod common;

use common::logger::TestLogger;

#[allow(deprecated)]
fn cswap(host: &TestHost) -> Command {
    let mut cmd = Command::cargo_bin("cswap").unwrap();
    cmd.envs(host.cli_env())
        .env_remove("CSWAP_LOCK_TIMEOUT")
        .env_remove("CSWAP_IDENTITY_FILE")
        .env_remove("CSWAP_HOST_CREDENTIALS_FILE")
        .env_remove("CSWAP_LOG")
        .env_remove("CSWAP_LOG_FILE")
        .env_remove("RUST_LOG");
    cmd
}

fn run_json(host: &TestHost, args: &[&str]) -> serde_json::Value {
    let output = cswap(host).args(args).arg("--json").output().unwrap();
    assert!(
        output.status.success(),
        "cswap {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    parse_robot(&String::from_utf8_lossy(&output.stdout))
}

#[test]
fn add_list_switch_status_flow() {
    let log = TestLogger::new("add_list_switch_status_flow");
    let host = TestHost::new();

    log.command(&["add-account"]);
    host.login("a@x.com", "tok-a");
    cswap(&host)
        .args(["add-account", "--no-color"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Added account 1: a@x.com"));

    host.login("b@x.com", "tok-b");
    cswap(&host).arg("add-account").assert().success();

    log.command(&["list"]);
    cswap(&host)
        .args(["list", "--no-color"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1: a@x.com"))
        .stdout(predicate::str::contains("2: b@x.com (active)"));

    log.command(&["switch", "1"]);
    cswap(&host)
        .args(["switch", "1", "--no-color"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Switched to account 1: a@x.com (was b@x.com)"))
        .stdout(predicate::str::contains("Restart Claude Code"));
    assert_eq!(host.live_profile().as_deref(), Some("a@x.com"));
    assert!(host.live_credential().unwrap().contains("tok-a"));

    cswap(&host)
        .args(["status", "--no-color"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Active account: a@x.com (1 of 2)"));
    log.finish_ok();
}

#[test]
fn switch_without_selector_rotates() {
    let host = TestHost::new();
    host.login("a@x.com", "tok-a");
    cswap(&host).arg("add-account").assert().success();
    host.login("b@x.com", "tok-b");
    cswap(&host).arg("add-account").assert().success();

    let first = run_json(&host, &["switch"]);
    let second = run_json(&host, &["switch"]);

    assert_eq!(first["data"]["account"]["label"], "a@x.com");
    assert_eq!(second["data"]["account"]["label"], "b@x.com");
    assert_eq!(host.live_profile().as_deref(), Some("b@x.com"));
}

#[test]
fn json_output_uses_envelope() {
    let host = TestHost::new();
    host.login("a@x.com", "tok-a");

    let added = run_json(&host, &["add-account"]);
    assert_eq!(added["schemaVersion"], "cswap.v1");
    assert_eq!(added["command"], "add-account");
    assert_eq!(added["data"]["account"]["id"], 1);
    assert_eq!(added["data"]["account"]["active"], true);
    assert_eq!(added["data"]["total"], 1);

    let listed = run_json(&host, &["list"]);
    let accounts = listed["data"].as_array().unwrap();
    assert_eq!(accounts.len(), 1);
    assert_eq!(accounts[0]["label"], "a@x.com");
    assert_eq!(accounts[0]["position"], 1);
    assert_eq!(accounts[0]["secretRef"], "account-1");

    let status = run_json(&host, &["status"]);
    assert_eq!(status["data"]["active"]["label"], "a@x.com");
    assert_eq!(status["data"]["liveIdentity"]["email"], "a@x.com");
    assert_eq!(status["data"]["liveUnmanaged"], false);
}

#[test]
fn commands_leave_a_log_trail_without_credentials() {
    let host = TestHost::new();
    host.login("a@x.com", "SECRET-TOKEN-A");

    cswap(&host).arg("add-account").assert().success();

    let logs: Vec<_> = fs::read_dir(host.backup_root().join("logs"))
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect();
    assert_eq!(logs.len(), 1);
    let trail = fs::read_to_string(&logs[0]).unwrap();
    assert!(trail.contains("Adding account"));
    assert!(!trail.contains("SECRET-TOKEN-A"));
}

#[test]
fn json_output_never_contains_credentials() {
    let host = TestHost::new();
    host.login("a@x.com", "SECRET-TOKEN-A");

    let output = cswap(&host)
        .args(["add-account", "--json", "--verbose"])
        .output()
        .unwrap();

    assert!(output.status.success());
    assert!(!String::from_utf8_lossy(&output.stdout).contains("SECRET-TOKEN-A"));
    assert!(!String::from_utf8_lossy(&output.stderr).contains("SECRET-TOKEN-A"));
}

#[test]
fn remove_with_yes_deletes_account() {
    let host = TestHost::new();
    host.login("a@x.com", "tok-a");
    cswap(&host).arg("add-account").assert().success();

    cswap(&host)
        .args(["remove-account", "a@x.com", "--yes", "--no-color"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed account 1: a@x.com"))
        .stdout(predicate::str::contains("no account is active now"));

    cswap(&host)
        .args(["list", "--no-color"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No managed accounts"));
    assert_eq!(host.live_profile().as_deref(), Some("a@x.com"));
}

#[test]
fn remove_without_tty_does_not_prompt() {
    let host = TestHost::new();
    host.login("a@x.com", "tok-a");
    cswap(&host).arg("add-account").assert().success();

    cswap(&host)
        .args(["remove-account", "1"])
        .write_stdin("")
        .assert()
        .success();

    assert!(run_json(&host, &["list"])["data"].as_array().unwrap().is_empty());
}

#[test]
fn purge_clears_vault_but_keeps_lock_file() {
    let host = TestHost::new();
    host.login("a@x.com", "tok-a");
    cswap(&host).arg("add-account").assert().success();
    assert!(host.layout().registry_file().exists());

    let purged = run_json(&host, &["purge", "--yes"]);

    assert_eq!(purged["data"]["accountsRemoved"], 1);
    assert!(!host.layout().registry_file().exists());
    assert!(!host.layout().snapshots_dir().exists());
    assert!(!host.layout().credentials_dir().exists());
    assert!(host.layout().lock_file().exists());
    assert!(host.live_credential().is_some());
}

#[test]
fn switch_reports_saved_unmanaged_login() {
    let host = TestHost::new();
    host.login("a@x.com", "tok-a");
    cswap(&host).arg("add-account").assert().success();
    host.login("b@x.com", "tok-b");
    cswap(&host).arg("add-account").assert().success();
    host.login("c@x.com", "tok-c");

    cswap(&host)
        .args(["switch", "1", "--no-color"])
        .assert()
        .success()
        .stdout(predicate::str::contains("c@x.com was signed in but not managed"))
        .stdout(predicate::str::contains("Switched to account 1: a@x.com (was c@x.com)"));

    let listed = run_json(&host, &["list"]);
    assert_eq!(listed["data"].as_array().unwrap().len(), 3);
}

#[test]
fn paths_reports_env_overrides() {
    let host = TestHost::new();

    let paths = run_json(&host, &["paths"]);

    let data = &paths["data"];
    assert_eq!(data["backupRoot"], host.backup_root().display().to_string());
    assert_eq!(data["backupRootSource"], "environment variable");
    assert_eq!(data["hostConfigDir"], host.config_dir().display().to_string());
    assert_eq!(data["secretBackend"], "file vault");
    assert_eq!(
        data["logDir"],
        host.backup_root().join("logs").display().to_string()
    );
}

#[test]
fn no_color_output_has_no_ansi() {
    let host = TestHost::new();
    host.login("a@x.com", "tok-a");

    let output = cswap(&host)
        .args(["add-account", "--no-color"])
        .output()
        .unwrap();

    assert!(output.status.success());
    assert!(!has_ansi_codes(&String::from_utf8_lossy(&output.stdout)));
}

#[test]
fn held_lock_makes_mutations_busy() {
    let host = TestHost::new();
    host.login("a@x.com", "tok-a");
    let _held = VaultLock::acquire(&host.backup_root(), Duration::from_secs(1)).unwrap();

    cswap(&host)
        .arg("add-account")
        .env("CSWAP_LOCK_TIMEOUT", "1")
        .assert()
        .code(4)
        .stderr(predicate::str::contains("CSWAP-B001"));

    // Reads do not take the lock.
    cswap(&host).arg("list").assert().success();
}
