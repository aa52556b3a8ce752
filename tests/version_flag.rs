use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn prints_version() {
    Command::new(env!("CARGO_BIN_EXE_feedr"))
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn prints_help() {
    Command::new(env!("CARGO_BIN_EXE_feedr"))
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Feedr").and(predicate::str::contains("--version")));
}
