//! CLI Integration Tests for nl-bridge
//!
//! Runs the built binary against the shipped units.

use std::path::PathBuf;
use std::process::{Command, Output};

/// Path to the nl-bridge binary built for this test run
fn nl_bridge_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_nl-bridge"))
}

/// Run the CLI from an empty directory so no stray nl-bridge.toml is picked up
fn run(args: &[&str]) -> Output {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    Command::new(nl_bridge_binary())
        .args(args)
        .current_dir(dir.path())
        .env_remove("NL_BRIDGE_LOG")
        .output()
        .expect("Failed to run nl-bridge")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

// ============================================================================
// Listing
// ============================================================================

#[test]
fn test_units_lists_net_smtp() {
    let output = run(&["units"]);
    assert!(
        output.status.success(),
        "units failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(stdout(&output).contains("net/smtp\t0.1\t9 symbols"));
}

#[test]
fn test_symbols_text() {
    let output = run(&["symbols", "net/smtp"]);
    assert!(output.status.success());
    let text = stdout(&output);
    for name in [
        "CRAMMD5Auth",
        "Dial",
        "NewClient",
        "PlainAuth",
        "SendMail",
        "Auth",
        "Client",
        "ServerInfo",
        "_Auth",
    ] {
        assert!(
            text.lines().any(|l| l.split_whitespace().next() == Some(name)),
            "missing {} in:\n{}",
            name,
            text
        );
    }
}

#[test]
fn test_symbols_json_filtered_by_kind() {
    let output = run(&["symbols", "net/smtp", "--json", "--kind", "interface-wrapper"]);
    assert!(output.status.success());

    let parsed: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("Invalid JSON output");
    let entries = parsed.as_array().expect("Expected a JSON array");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["name"], "_Auth");
    assert_eq!(entries[0]["kind"], "interface-wrapper");
    assert_eq!(
        entries[0]["shape"],
        "wrapper _net_smtp_Auth for net/smtp.Auth"
    );
}

#[test]
fn test_fingerprint_is_stable_hex() {
    let first = run(&["fingerprint", "net/smtp"]);
    let second = run(&["fingerprint", "net/smtp"]);
    assert!(first.status.success());

    let hash = stdout(&first).trim().to_string();
    assert_eq!(hash.len(), 64);
    assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    assert_eq!(hash, stdout(&second).trim());
}

// ============================================================================
// Failures and Configuration
// ============================================================================

#[test]
fn test_unknown_unit_fails() {
    let output = run(&["symbols", "net/http"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Unknown library unit: net/http"));
}

#[test]
fn test_config_disables_unit() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("custom.toml");
    std::fs::write(&config, "[registry]\ndisabled_units = [\"net/smtp\"]\n").unwrap();

    let output = run(&["units", "--config", config.to_str().unwrap()]);
    assert!(output.status.success());
    assert!(!stdout(&output).contains("net/smtp"));
}
