//! CLI integration tests for sqlmask.
//!
//! These tests verify command-line argument parsing, exit codes, and the
//! end-to-end behavior of the copy/sample/inspect/plan subcommands.

use assert_cmd::Command;
use predicates::prelude::*;
use rusqlite::Connection;
use std::path::Path;

/// Get a command for the sqlmask binary.
fn cmd() -> Command {
    Command::cargo_bin("sqlmask").unwrap()
}

fn create_test_db(path: &Path) {
    let conn = Connection::open(path).unwrap();
    conn.execute_batch(
        "CREATE TABLE users (id INTEGER PRIMARY KEY, email TEXT, country TEXT);
         CREATE TABLE orders (id INTEGER PRIMARY KEY, user_id INTEGER NOT NULL,
             FOREIGN KEY(user_id) REFERENCES users(id));
         INSERT INTO users VALUES (1, 'user1@example.com', 'US'), (2, 'user2@example.com', 'CA');
         INSERT INTO orders VALUES (10, 1), (11, 2);",
    )
    .unwrap();
}

// =============================================================================
// Help and Version Tests
// =============================================================================

#[test]
fn test_help_shows_all_commands() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("copy"))
        .stdout(predicate::str::contains("sample"))
        .stdout(predicate::str::contains("inspect"))
        .stdout(predicate::str::contains("plan"));
}

#[test]
fn test_copy_subcommand_help() {
    cmd()
        .args(["copy", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--in"))
        .stdout(predicate::str::contains("--out"))
        .stdout(predicate::str::contains("--config"))
        .stdout(predicate::str::contains("--salt"))
        .stdout(predicate::str::contains("--jobs"));
}

#[test]
fn test_version_flag() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("sqlmask"));
}

#[test]
fn test_global_flag_defaults() {
    cmd()
        .args(["copy", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[default: on]"))
        .stdout(predicate::str::contains("[default: 4]"));
}

// =============================================================================
// Argument validation
// =============================================================================

#[test]
fn test_copy_requires_in_and_out() {
    cmd().arg("copy").assert().failure();
    cmd().args(["copy", "--in", "x.sqlite"]).assert().failure();
}

#[test]
fn test_invalid_fk_mode_exits_with_config_code() {
    let tmp = tempfile::tempdir().unwrap();
    let in_path = tmp.path().join("in.sqlite");
    create_test_db(&in_path);
    cmd()
        .args([
            "copy",
            "--in",
            in_path.to_str().unwrap(),
            "--out",
            tmp.path().join("out.sqlite").to_str().unwrap(),
            "--fk",
            "maybe",
        ])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("invalid fk mode"));
}

#[test]
fn test_missing_input_file_fails() {
    let tmp = tempfile::tempdir().unwrap();
    cmd()
        .args([
            "copy",
            "--in",
            tmp.path().join("absent.sqlite").to_str().unwrap(),
            "--out",
            tmp.path().join("out.sqlite").to_str().unwrap(),
        ])
        .assert()
        .failure()
        .code(1);
}

// =============================================================================
// End-to-end subcommands
// =============================================================================

#[test]
fn test_copy_produces_masked_output() {
    let tmp = tempfile::tempdir().unwrap();
    let in_path = tmp.path().join("in.sqlite");
    let out_path = tmp.path().join("out.sqlite");
    let cfg_path = tmp.path().join("mask.yaml");
    create_test_db(&in_path);
    std::fs::write(
        &cfg_path,
        "tables:\n  users:\n    columns:\n      email:\n        type: HmacSha256\n        maxlen: 16\n",
    )
    .unwrap();

    cmd()
        .args([
            "copy",
            "--in",
            in_path.to_str().unwrap(),
            "--out",
            out_path.to_str().unwrap(),
            "--config",
            cfg_path.to_str().unwrap(),
            "--salt",
            "salt",
        ])
        .assert()
        .success();

    let out = Connection::open(&out_path).unwrap();
    let email: String = out
        .query_row("SELECT email FROM users WHERE id = 1", [], |r| r.get(0))
        .unwrap();
    assert_ne!(email, "user1@example.com");
    assert_eq!(email.len(), 16);
}

#[test]
fn test_sample_subsets_output() {
    let tmp = tempfile::tempdir().unwrap();
    let in_path = tmp.path().join("in.sqlite");
    let out_path = tmp.path().join("out.sqlite");
    let cfg_path = tmp.path().join("mask.yaml");
    create_test_db(&in_path);
    std::fs::write(
        &cfg_path,
        "subset:\n  roots:\n    - table: users\n      where: \"country = 'US'\"\n      limit: 1\n",
    )
    .unwrap();

    cmd()
        .args([
            "sample",
            "--in",
            in_path.to_str().unwrap(),
            "--out",
            out_path.to_str().unwrap(),
            "--config",
            cfg_path.to_str().unwrap(),
        ])
        .assert()
        .success();

    let out = Connection::open(&out_path).unwrap();
    let users: i64 = out
        .query_row("SELECT COUNT(1) FROM users", [], |r| r.get(0))
        .unwrap();
    let orders: i64 = out
        .query_row("SELECT COUNT(1) FROM orders", [], |r| r.get(0))
        .unwrap();
    assert_eq!(users, 1);
    assert_eq!(orders, 1);
}

#[test]
fn test_inspect_lists_tables_and_pii() {
    let tmp = tempfile::tempdir().unwrap();
    let in_path = tmp.path().join("in.sqlite");
    create_test_db(&in_path);

    cmd()
        .args(["inspect", "--in", in_path.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("users (2 rows)"))
        .stdout(predicate::str::contains("PII candidates: email"));
}

#[test]
fn test_inspect_writes_draft_config() {
    let tmp = tempfile::tempdir().unwrap();
    let in_path = tmp.path().join("in.sqlite");
    let draft_path = tmp.path().join("draft.yaml");
    create_test_db(&in_path);

    cmd()
        .args([
            "inspect",
            "--in",
            in_path.to_str().unwrap(),
            "--draft",
            draft_path.to_str().unwrap(),
        ])
        .assert()
        .success();

    let draft = std::fs::read_to_string(&draft_path).unwrap();
    assert!(draft.starts_with("# Draft mask config"));
    assert!(draft.contains("HmacSha256"));
}

#[test]
fn test_inspect_output_json() {
    let tmp = tempfile::tempdir().unwrap();
    let in_path = tmp.path().join("in.sqlite");
    create_test_db(&in_path);

    cmd()
        .args(["inspect", "--in", in_path.to_str().unwrap(), "--output-json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"pii_candidates\""))
        .stdout(predicate::str::contains("\"users\""));
}

#[test]
fn test_plan_shows_resolved_transformers() {
    let tmp = tempfile::tempdir().unwrap();
    let in_path = tmp.path().join("in.sqlite");
    let cfg_path = tmp.path().join("mask.yaml");
    create_test_db(&in_path);
    std::fs::write(
        &cfg_path,
        "tables:\n  users:\n    columns:\n      email:\n        type: HmacSha256\n",
    )
    .unwrap();

    cmd()
        .args([
            "plan",
            "--in",
            in_path.to_str().unwrap(),
            "--config",
            cfg_path.to_str().unwrap(),
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Plan:"))
        .stdout(predicate::str::contains("- users"))
        .stdout(predicate::str::contains("email: HmacSha256"))
        .stdout(predicate::str::contains("(no transforms)"));
}
