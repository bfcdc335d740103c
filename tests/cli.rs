use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn crawlspace_eval_prints_results() {
    let mut cmd = Command::cargo_bin("crawlspace").expect("binary exists");
    cmd.arg("eval").arg("1 == 1");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("true"));
}

#[test]
fn crawlspace_eval_uses_demo_registrations() {
    let mut cmd = Command::cargo_bin("crawlspace").expect("binary exists");
    cmd.arg("eval").arg("counter.Get()");
    cmd.assert().success().stdout(predicate::str::contains("0"));
}

#[test]
fn crawlspace_eval_reports_unknown_operators() {
    let mut cmd = Command::cargo_bin("crawlspace").expect("binary exists");
    cmd.arg("eval").arg("1 + 1");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("unknown op"));
}

#[test]
fn crawlspace_repl_reads_piped_input() {
    let mut cmd = Command::cargo_bin("crawlspace").expect("binary exists");
    cmd.arg("repl").write_stdin("print(\"piped\")\n");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("piped"));
}
