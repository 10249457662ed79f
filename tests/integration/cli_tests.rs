//! CLI surface tests: help, version, argument validation, local status.

use assert_cmd::Command;
use predicates::prelude::*;

fn cirrus() -> Command {
    #[allow(clippy::expect_used)]
    Command::cargo_bin("cirrus").expect("binary built")
}

#[test]
fn help_lists_the_subcommands() {
    cirrus()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("create"))
        .stdout(predicate::str::contains("remove"))
        .stdout(predicate::str::contains("status"));
}

#[test]
fn version_prints_the_crate_version() {
    cirrus()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn create_rejects_an_invalid_sandbox_name_before_touching_anything() {
    let home = tempfile::tempdir().expect("tempdir");
    cirrus()
        .env("HOME", home.path())
        .env_remove("AWS_ACCESS_KEY_ID")
        .env_remove("AWS_SECRET_ACCESS_KEY")
        .args(["create", "Bad_Name"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid sandbox name"));
}

#[test]
fn create_without_an_account_reports_the_missing_configuration() {
    let home = tempfile::tempdir().expect("tempdir");
    cirrus()
        .env("HOME", home.path())
        .env_remove("AWS_ACCESS_KEY_ID")
        .env_remove("AWS_SECRET_ACCESS_KEY")
        .env_remove("AWS_REGION")
        .args(["create", "api"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No cloud account configured"));
}

#[test]
fn remove_rejects_a_malformed_region() {
    let home = tempfile::tempdir().expect("tempdir");
    cirrus()
        .env("HOME", home.path())
        .env("AWS_ACCESS_KEY_ID", "AKIAEXAMPLE")
        .env("AWS_SECRET_ACCESS_KEY", "s3cret")
        .args(["remove", "api", "--region", "Paris"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not look like a region"));
}

#[test]
fn status_with_no_state_says_so() {
    let home = tempfile::tempdir().expect("tempdir");
    cirrus()
        .env("HOME", home.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Nothing provisioned"));
}

#[test]
fn unknown_subcommands_fail() {
    cirrus().arg("teleport").assert().failure();
}
