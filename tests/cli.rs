use assert_cmd::Command;
use predicates::prelude::*;

#[allow(deprecated)]
fn fuelkvm() -> Command {
    Command::cargo_bin("fuelkvm").unwrap()
}

#[test]
fn test_help_exits_successfully() {
    fuelkvm().arg("--help").assert().success();
}

#[test]
fn test_version_exits_successfully() {
    fuelkvm()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("fuelkvm"));
}

#[test]
fn test_no_args_shows_usage() {
    fuelkvm()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_unknown_flag_fails() {
    fuelkvm()
        .args(["--nonexistent", "cluster.yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unexpected argument"));
}

#[test]
fn test_help_documents_options() {
    fuelkvm()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--libvirt-url"))
        .stdout(predicate::str::contains("--timeout"))
        .stdout(predicate::str::contains("description"));
}

#[test]
fn test_missing_description_file_fails() {
    // Fails during preflight, connect, or load depending on the host; it
    // must exit nonzero either way and never panic.
    fuelkvm()
        .args(["--libvirt-url", "test:///default", "/nonexistent/cluster.yaml"])
        .assert()
        .failure();
}
