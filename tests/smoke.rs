//! Smoke tests -- verify the binary runs and key subcommands exist.

use assert_cmd::Command;

#[test]
fn test_cli_help() {
    Command::cargo_bin("testforge")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicates::str::contains(
            "CLI companion for an automated API test generation",
        ));
}

#[test]
fn test_cli_version() {
    Command::cargo_bin("testforge")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicates::str::contains("testforge"));
}

#[test]
fn test_generate_subcommand_exists() {
    Command::cargo_bin("testforge")
        .unwrap()
        .args(["generate", "--help"])
        .assert()
        .success();
}

#[test]
fn test_execute_subcommand_exists() {
    Command::cargo_bin("testforge")
        .unwrap()
        .args(["execute", "--help"])
        .assert()
        .success();
}

#[test]
fn test_results_search_subcommand_exists() {
    Command::cargo_bin("testforge")
        .unwrap()
        .args(["results", "search", "--help"])
        .assert()
        .success();
}

#[test]
fn test_history_subcommand_exists() {
    Command::cargo_bin("testforge")
        .unwrap()
        .args(["history", "list", "--help"])
        .assert()
        .success();
}

#[test]
fn test_invalid_test_type_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("Api.java");
    std::fs::write(&input, "public class Api {}").unwrap();

    Command::cargo_bin("testforge")
        .unwrap()
        .args([
            "generate",
            "--test-type",
            "integration",
            "--input",
            input.to_str().unwrap(),
        ])
        .assert()
        .failure()
        .stderr(predicates::str::contains("invalid test type"));
}
