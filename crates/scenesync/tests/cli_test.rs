//! Integration tests for the `scenesync` CLI binary.
//!
//! Argument parsing, help output, shell completions, config handling and
//! error exit codes, without a live StudioPro instance.
#![allow(clippy::unwrap_used)]

use std::path::Path;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a command for the `scenesync` binary with env isolation.
///
/// Clears all `SCENESYNC_*` env vars and points config directories at
/// `home` so tests never touch the user's real configuration.
fn scenesync_cmd_in(home: &Path) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("scenesync");
    cmd.env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join(".config"))
        .env_remove("SCENESYNC_PROFILE")
        .env_remove("SCENESYNC_HOST")
        .env_remove("SCENESYNC_PORT")
        .env_remove("SCENESYNC_PASSWORD")
        .env_remove("SCENESYNC_OUTPUT")
        .env_remove("SCENESYNC_TIMEOUT")
        .env_remove("SCENESYNC_DEFAULT_PROFILE");
    cmd
}

fn scenesync_cmd() -> assert_cmd::Command {
    scenesync_cmd_in(Path::new("/tmp/scenesync-cli-test-nonexistent"))
}

/// Concatenate stdout + stderr from a command output for flexible matching.
fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let output = scenesync_cmd().output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    let text = combined_output(&output);
    assert!(text.contains("Usage"), "Expected 'Usage' in output:\n{text}");
}

#[test]
fn test_help_flag() {
    scenesync_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("StudioPro")
            .and(predicate::str::contains("snapshot"))
            .and(predicate::str::contains("watch"))
            .and(predicate::str::contains("request")),
    );
}

#[test]
fn test_version_flag() {
    scenesync_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("scenesync"));
}

#[test]
fn test_snapshot_help_lists_sections() {
    scenesync_cmd()
        .args(["snapshot", "--help"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("scenes")
                .and(predicate::str::contains("transitions"))
                .and(predicate::str::contains("choices")),
        );
}

// ── Shell completions ───────────────────────────────────────────────

#[test]
fn test_completions_bash() {
    scenesync_cmd()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

#[test]
fn test_completions_zsh() {
    scenesync_cmd()
        .args(["completions", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("scenesync"));
}

// ── Argument errors ─────────────────────────────────────────────────

#[test]
fn test_invalid_subcommand() {
    scenesync_cmd().arg("frobnicate").assert().failure().code(2);
}

#[test]
fn test_invalid_section() {
    scenesync_cmd()
        .args(["snapshot", "hotkeys-and-more"])
        .assert()
        .failure()
        .code(2);
}

#[test]
fn test_invalid_output_format() {
    scenesync_cmd()
        .args(["--output", "xml", "snapshot"])
        .assert()
        .failure()
        .code(2);
}

#[test]
fn test_dsk_tab_zero_is_rejected() {
    scenesync_cmd().args(["dsk", "0"]).assert().failure().code(2);
}

#[test]
fn test_request_data_conflicts_with_file() {
    scenesync_cmd()
        .args(["request", "GetVersion", "--data", "{}", "-F", "x.json"])
        .assert()
        .failure()
        .code(2);
}

// ── Configuration ───────────────────────────────────────────────────

#[test]
fn test_no_config_is_a_usage_error() {
    let output = scenesync_cmd().arg("snapshot").output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    let text = combined_output(&output);
    assert!(
        text.contains("No remote configured"),
        "Expected config hint in output:\n{text}"
    );
}

#[test]
fn test_unknown_profile_is_a_usage_error() {
    let output = scenesync_cmd()
        .args(["--profile", "ghost", "snapshot"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("ghost"));
}

#[test]
fn test_config_show_without_file() {
    scenesync_cmd()
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[defaults]"));
}

#[test]
fn test_config_set_then_show() {
    let home = tempfile::tempdir().unwrap();

    scenesync_cmd_in(home.path())
        .args(["config", "set", "host", "studio.local"])
        .assert()
        .success();
    scenesync_cmd_in(home.path())
        .args(["config", "set", "port", "4456"])
        .assert()
        .success();

    scenesync_cmd_in(home.path())
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("[profiles.default]")
                .and(predicate::str::contains("host = \"studio.local\""))
                .and(predicate::str::contains("port = 4456")),
        );

    scenesync_cmd_in(home.path())
        .args(["config", "profiles"])
        .assert()
        .success()
        .stdout(predicate::str::contains("default *"));
}

#[test]
fn test_config_set_unknown_key() {
    let home = tempfile::tempdir().unwrap();
    scenesync_cmd_in(home.path())
        .args(["config", "set", "colour", "red"])
        .assert()
        .failure()
        .code(2);
}

#[test]
fn test_config_use_unknown_profile() {
    scenesync_cmd()
        .args(["config", "use", "ghost"])
        .assert()
        .failure()
        .code(2);
}

// ── Connection errors ───────────────────────────────────────────────

#[test]
fn test_refused_connection_exit_code() {
    let output = scenesync_cmd()
        .args(["--host", "127.0.0.1", "--port", "1", "--quiet", "snapshot"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(7));
    assert!(combined_output(&output).contains("ws://127.0.0.1:1"));
}
