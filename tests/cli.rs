//! End-to-end coverage of the `neosearch-cli` demo binary via `assert_cmd`.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn cli(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("neosearch-cli").unwrap();
    cmd.current_dir(dir.path());
    cmd
}

#[test]
fn create_add_search_round_trip() {
    let dir = TempDir::new().unwrap();

    cli(&dir).args(["create-index", "products"]).assert().success();

    cli(&dir)
        .args(["add", "products", "1", r#"{"name": "red shoes"}"#])
        .assert()
        .success();

    cli(&dir)
        .args(["add", "products", "2", r#"{"name": "blue shoes"}"#])
        .assert()
        .success();

    cli(&dir)
        .args(["search", "products", "name", "shoes"])
        .assert()
        .success()
        .stdout(predicate::str::contains("2 match(es)"));
}

#[test]
fn search_with_no_matches_reports_zero() {
    let dir = TempDir::new().unwrap();
    cli(&dir).args(["create-index", "products"]).assert().success();
    cli(&dir)
        .args(["add", "products", "1", r#"{"name": "red shoes"}"#])
        .assert()
        .success();
    cli(&dir)
        .args(["search", "products", "name", "sandals"])
        .assert()
        .success()
        .stdout(predicate::str::contains("0 match(es)"));
}

#[test]
fn add_to_missing_index_fails() {
    let dir = TempDir::new().unwrap();
    cli(&dir)
        .args(["add", "products", "1", r#"{"name": "red shoes"}"#])
        .assert()
        .failure();
}
