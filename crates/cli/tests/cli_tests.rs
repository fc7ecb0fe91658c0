//! CLI integration tests

use std::process::Command;

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let output = Command::new("cargo")
        .args(["run", "-p", "hunter-cli", "--", "--help"])
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(
        stdout.contains("IdleHunter"),
        "Should show app name"
    );
    assert!(stdout.contains("vms"), "Should show vms command");
    assert!(stdout.contains("runs"), "Should show runs command");
    assert!(stdout.contains("sources"), "Should show sources command");
    assert!(stdout.contains("scan"), "Should show scan command");
    assert!(stdout.contains("savings"), "Should show savings command");
}

/// Test that the CLI shows version
#[test]
fn test_cli_version() {
    let output = Command::new("cargo")
        .args(["run", "-p", "hunter-cli", "--", "--version"])
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("hunter"), "Should show binary name");
}

/// Test vms subcommand help
#[test]
fn test_vms_help() {
    let output = Command::new("cargo")
        .args(["run", "-p", "hunter-cli", "--", "vms", "--help"])
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Vms help should succeed");
    assert!(stdout.contains("--query"), "Should show query option");
    assert!(stdout.contains("--status"), "Should show status option");
    assert!(stdout.contains("--sort"), "Should show sort option");
    assert!(stdout.contains("--page"), "Should show page option");
}

/// Test scan subcommand help
#[test]
fn test_scan_help() {
    let output = Command::new("cargo")
        .args(["run", "-p", "hunter-cli", "--", "scan", "--help"])
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Scan help should succeed");
    assert!(stdout.contains("--source"), "Should show source option");
}
