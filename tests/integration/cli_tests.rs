//! Integration tests for the CLI binary.
//!
//! Runs the `bridgectl` binary against a throwaway data directory.
//!
//! This test is registered as a [[test]] in the bridge-gateway-cli crate
//! so that CARGO_BIN_EXE_bridgectl is available.

use std::path::Path;
use std::process::{Command, Output};

use bridge_gateway::Fingerprint;

/// Get a Command pointing to the `bridgectl` binary.
fn bridgectl() -> Command {
    Command::new(env!("CARGO_BIN_EXE_bridgectl"))
}

/// Run `bridgectl --home <home> <args>`.
fn run(home: &Path, args: &[&str]) -> Output {
    bridgectl()
        .arg("--home")
        .arg(home)
        .args(args)
        .output()
        .expect("failed to execute bridgectl")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn cli_responds_to_help() {
    let output = bridgectl()
        .arg("--help")
        .output()
        .expect("failed to execute bridgectl --help");

    assert!(
        output.status.success(),
        "bridgectl --help should exit with success, stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let stdout = stdout(&output);
    assert!(
        stdout.contains("bridgectl") || stdout.contains("Usage"),
        "bridgectl --help output should contain usage information, got: {stdout}"
    );
}

#[test]
fn cli_responds_to_version() {
    let output = bridgectl()
        .arg("--version")
        .output()
        .expect("failed to execute bridgectl --version");

    assert!(output.status.success());
    let stdout = stdout(&output);
    assert!(
        stdout.contains("0.1") || stdout.contains("bridgectl"),
        "bridgectl --version should contain version info, got: {stdout}"
    );
}

#[test]
fn cli_exits_with_error_on_unknown_flag() {
    let output = bridgectl()
        .arg("--nonexistent-flag")
        .output()
        .expect("failed to execute bridgectl");

    assert!(
        !output.status.success(),
        "bridgectl with unknown flag should exit with error"
    );
}

#[test]
fn cli_fingerprint_prints_colon_hex() {
    let dir = tempfile::tempdir().unwrap();
    let cert = dir.path().join("cert.der");
    std::fs::write(&cert, b"not really a certificate").unwrap();

    let output = bridgectl()
        .arg("fingerprint")
        .arg(&cert)
        .output()
        .expect("failed to execute bridgectl fingerprint");

    assert!(output.status.success());
    let expected = Fingerprint::of_certificate(b"not really a certificate").to_colon_hex();
    assert_eq!(stdout(&output).trim(), expected);
}

#[test]
fn cli_subject_select_show_clear() {
    let home = tempfile::tempdir().unwrap();

    let output = run(home.path(), &["subject", "show"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("No subject selected"));

    let output = run(
        home.path(),
        &[
            "subject",
            "select",
            "--measurement-code",
            "M-100",
            "--subject-code",
            "S-7",
            "--subject-name",
            "Jane Doe",
        ],
    );
    assert!(
        output.status.success(),
        "select failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let shown = stdout(&run(home.path(), &["subject", "show"]));
    assert!(shown.contains("M-100"));
    assert!(shown.contains("S-7"));
    assert!(shown.contains("Jane Doe"));

    assert!(run(home.path(), &["subject", "clear"]).status.success());
    let shown = stdout(&run(home.path(), &["subject", "show"]));
    assert!(shown.contains("No subject selected"));
}

#[test]
fn cli_empty_home_has_no_result_and_no_jobs() {
    let home = tempfile::tempdir().unwrap();

    let output = run(home.path(), &["result", "show"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("No result stored"));

    let output = run(home.path(), &["jobs", "list"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("No jobs"));

    let output = run(home.path(), &["jobs", "run"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("Ran 0 job(s)"));
}

#[test]
fn cli_jobs_list_rejects_unknown_state() {
    let home = tempfile::tempdir().unwrap();
    let output = run(home.path(), &["jobs", "list", "--state", "sideways"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("unknown job state"));
}

#[test]
fn cli_registry_add_then_list() {
    let home = tempfile::tempdir().unwrap();
    let cert = home.path().join("caller.der");
    std::fs::write(&cert, b"caller cert").unwrap();

    let output = run(
        home.path(),
        &[
            "registry",
            "add",
            "--name",
            "com.example.caller",
            "--uid",
            "10200",
            "--cert",
            cert.to_str().unwrap(),
        ],
    );
    assert!(
        output.status.success(),
        "registry add failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(home.path().join("registry.json").exists());

    let listed = stdout(&run(home.path(), &["registry", "list", "--verbose"]));
    assert!(listed.contains("com.example.caller"));
    assert!(listed.contains("uids=10200"));
    assert!(listed.contains(&Fingerprint::of_certificate(b"caller cert").to_colon_hex()));
}

#[test]
fn cli_config_init_writes_file() {
    let home = tempfile::tempdir().unwrap();
    let output = run(home.path(), &["config", "init"]);
    assert!(output.status.success());
    assert!(home.path().join("config.json").exists());

    let shown = stdout(&run(home.path(), &["config", "show"]));
    assert!(shown.contains("bridge.sock"));
}

#[test]
fn cli_call_without_server_fails() {
    let home = tempfile::tempdir().unwrap();
    let output = run(home.path(), &["call", "request-data"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("failed to connect"));
}
