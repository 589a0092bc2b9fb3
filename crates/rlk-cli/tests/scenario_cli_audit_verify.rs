//! `rlk audit verify` walks the JSONL digest chain. No DB required.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::json;

use rlk_audit::{LadderEventKind, LadderLog};

#[test]
fn intact_chain_verifies() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("main.jsonl");

    let mut log = LadderLog::open(&path).unwrap();
    log.append("main", LadderEventKind::MatchApplied, json!({"winner": "a"}))
        .unwrap();
    log.append("main", LadderEventKind::PeriodReset, json!({})).unwrap();

    Command::cargo_bin("rlk")
        .unwrap()
        .args(["audit", "verify", "--path", path.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("chain_intact=true events=2"));
}

#[test]
fn tampered_chain_fails_with_line_number() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("main.jsonl");

    let mut log = LadderLog::open(&path).unwrap();
    log.append("main", LadderEventKind::MatchApplied, json!({"winner": "a"}))
        .unwrap();
    log.append("main", LadderEventKind::PeriodReset, json!({})).unwrap();

    let content = std::fs::read_to_string(&path).unwrap();
    std::fs::write(&path, content.replacen("\"a\"", "\"b\"", 1)).unwrap();

    Command::cargo_bin("rlk")
        .unwrap()
        .args(["audit", "verify", "--path", path.to_str().unwrap()])
        .assert()
        .failure()
        .stdout(predicate::str::contains("chain_intact=false line=1"));
}

#[test]
fn db_commands_explain_the_missing_env_var() {
    Command::cargo_bin("rlk")
        .unwrap()
        .env_remove("RLK_DATABASE_URL")
        .args(["db", "status"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("RLK_DATABASE_URL"));
}
