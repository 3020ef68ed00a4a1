use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use rstest::rstest;
use std::path::{Path, PathBuf};

fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

fn person_schema(dir: &Path) -> PathBuf {
    write(
        dir,
        "person.yaml",
        r#"
name:
  .type: string
  .min: 2
age:
  .type: integer
  .min: 0
  .optional: true
"#,
    )
}

#[test]
fn test_report_conforming_document() {
    let dir = tempfile::tempdir().unwrap();
    let schema = person_schema(dir.path());
    let doc = write(dir.path(), "ada.json", r#"{"name": "Ada", "age": 36}"#);

    cargo_bin_cmd!("weft")
        .args(["report", schema.to_str().unwrap(), doc.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("[]"));
}

#[test]
fn test_report_lists_violations() {
    let dir = tempfile::tempdir().unwrap();
    let schema = person_schema(dir.path());
    let doc = write(dir.path(), "bad.json", r#"{"name": "A", "age": -1, "nick": "x"}"#);

    let output = cargo_bin_cmd!("weft")
        .args(["report", schema.to_str().unwrap(), doc.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("3 violation(s)"))
        .get_output()
        .stdout
        .clone();

    let errors: serde_json::Value = serde_json::from_slice(&output).unwrap();
    let mut kinds: Vec<&str> = errors
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["kind"].as_str().unwrap())
        .collect();
    kinds.sort();
    assert_eq!(kinds, vec!["ILLEGAL", "LIMIT", "LIMIT"]);
}

#[test]
fn test_validate_prints_first_error() {
    let dir = tempfile::tempdir().unwrap();
    let schema = person_schema(dir.path());
    let doc = write(dir.path(), "missing.yaml", "age: 3\n");

    cargo_bin_cmd!("weft")
        .args(["validate", schema.to_str().unwrap(), doc.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("MISSING at name"));
}

#[test]
fn test_validate_success() {
    let dir = tempfile::tempdir().unwrap();
    let schema = person_schema(dir.path());
    let doc = write(dir.path(), "ok.yml", "name: Ada\n");

    cargo_bin_cmd!("weft")
        .args(["validate", schema.to_str().unwrap(), doc.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("is valid"));
}

#[test]
fn test_transform_merges_into_target() {
    let dir = tempfile::tempdir().unwrap();
    let schema = write(
        dir.path(),
        "schema.json",
        r#"{"total": {".type": "number", ".add": true}, "tags": {".type": "array", ".append": true, ".unique": true}}"#,
    );
    let source = write(dir.path(), "source.json", r#"{"total": 2, "tags": ["b", "c"]}"#);
    let target = write(dir.path(), "target.json", r#"{"total": 40, "tags": ["a", "b"]}"#);

    let output = cargo_bin_cmd!("weft")
        .args([
            "transform",
            schema.to_str().unwrap(),
            source.to_str().unwrap(),
            "--target",
            target.to_str().unwrap(),
        ])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let merged: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(merged, serde_json::json!({"total": 42, "tags": ["a", "b", "c"]}));
}

#[test]
fn test_transform_failure() {
    let dir = tempfile::tempdir().unwrap();
    let schema = write(dir.path(), "schema.json", r#"{"n": {".type": "number", ".divide": true}}"#);
    let source = write(dir.path(), "source.json", r#"{"n": 0}"#);

    cargo_bin_cmd!("weft")
        .args(["transform", schema.to_str().unwrap(), source.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("INVALID at n"));
}

#[rstest]
#[case(r#"{".nope": true}"#, "Failed to compile schema")]
#[case("{not json", "Failed to read schema")]
fn test_bad_schema(#[case] contents: &str, #[case] message: &str) {
    let dir = tempfile::tempdir().unwrap();
    let schema = write(dir.path(), "schema.json", contents);
    let doc = write(dir.path(), "doc.json", "{}");

    cargo_bin_cmd!("weft")
        .args(["report", schema.to_str().unwrap(), doc.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains(message));
}

#[test]
fn test_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = write(dir.path(), "weft.yaml", "max_depth: 1\n");
    let schema = write(dir.path(), "schema.json", r#"{"next": {".recurse": 1, ".optional": true}}"#);
    let doc = write(dir.path(), "doc.json", r#"{"next": {"next": {"next": {}}}}"#);

    cargo_bin_cmd!("weft")
        .args([
            "--config",
            config.to_str().unwrap(),
            "report",
            schema.to_str().unwrap(),
            doc.to_str().unwrap(),
        ])
        .assert()
        .failure()
        .stdout(predicate::str::contains("LIMIT"));

    cargo_bin_cmd!("weft")
        .args(["--config", dir.path().join("absent.yaml").to_str().unwrap(), "report"])
        .args([schema.to_str().unwrap(), doc.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load configuration"));
}
