//! CLI argument handling tests.
//!
//! These run the real binary but never get past argument parsing, so
//! they need no privileges and no network state.

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn help_exits_zero() {
    Command::cargo_bin("b1b")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("bond"));
}

#[test]
fn version_exits_zero() {
    Command::cargo_bin("b1b")
        .unwrap()
        .arg("--version")
        .assert()
        .success();
}

#[test]
fn conflicting_log_destinations_exit_one() {
    Command::cargo_bin("b1b")
        .unwrap()
        .args(["--syslog", "--stderr"])
        .assert()
        .failure()
        .code(1);
}

#[test]
fn unknown_flag_exits_one() {
    Command::cargo_bin("b1b")
        .unwrap()
        .arg("--bogus")
        .assert()
        .failure()
        .code(1);
}
