use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn help_lists_subcommands() {
    Command::cargo_bin("chargechain-cli")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("charge"))
        .stdout(predicate::str::contains("chain"))
        .stdout(predicate::str::contains("verify"));
}

#[test]
fn charge_requires_recipient() {
    Command::cargo_bin("chargechain-cli")
        .unwrap()
        .args(["charge", "--from", "+1000", "--amount", "5"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--to"));
}

#[test]
fn verify_reports_unreachable_node() {
    Command::cargo_bin("chargechain-cli")
        .unwrap()
        .args(["--node", "http://127.0.0.1:1", "verify"])
        .env_remove("CHARGECHAIN_NODE")
        .assert()
        .failure()
        .stderr(predicate::str::contains("could not reach"));
}
