//! CLI binary integration tests using assert_cmd + predicates.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

#[allow(deprecated)]
fn cmd() -> Command {
    Command::cargo_bin("helm-launcher").expect("binary should exist")
}

/// Write a minimal chart into `dir`.
fn write_chart(dir: &std::path::Path) {
    fs::write(dir.join("Chart.yaml"), "apiVersion: v2\nname: web\nversion: 1.0.0\n").unwrap();
    fs::write(dir.join("values.yaml"), "replicas: 1\nimage: nginx\n").unwrap();
    fs::write(
        dir.join("values.schema.json"),
        serde_json::json!({
            "type": "object",
            "properties": {
                "replicas": { "type": "integer", "minimum": 1 },
                "image": { "type": "string" }
            }
        })
        .to_string(),
    )
    .unwrap();
}

// ── Form ────────────────────────────────────────────────────────────────────

#[test]
fn test_form_to_file() {
    let dir = TempDir::new().unwrap();
    write_chart(dir.path());
    let output = dir.path().join("form.json");

    cmd()
        .args(["form", dir.path().to_str().unwrap()])
        .args(["-o", output.to_str().unwrap()])
        .assert()
        .success();

    let content = fs::read_to_string(&output).expect("output file should exist");
    let form: serde_json::Value = serde_json::from_str(&content).expect("valid JSON");
    assert_eq!(form["main"][0]["helmValuesPath"], serde_json::json!(["replicas"]));
    assert_eq!(form["main"][0]["fieldType"], "integer");
    assert_eq!(form["erroredFormFields"], serde_json::json!([]));
}

#[test]
fn test_form_reports_errors_from_patch_file() {
    let dir = TempDir::new().unwrap();
    write_chart(dir.path());
    let patch = dir.path().join("patch.json");
    fs::write(&patch, r#"[{"path": ["replicas"], "value": 0}]"#).unwrap();

    cmd()
        .args(["form", dir.path().to_str().unwrap()])
        .args(["--patch", patch.to_str().unwrap()])
        .args(["--format", "compact"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"below_minimum\""));
}

// ── Resolve ─────────────────────────────────────────────────────────────────

#[test]
fn test_resolve_applies_query() {
    let dir = TempDir::new().unwrap();
    write_chart(dir.path());

    cmd()
        .args(["resolve", dir.path().to_str().unwrap()])
        .args(["--query", "replicas=3&image=«httpd»"])
        .args(["--format", "compact"])
        .assert()
        .success()
        .stdout("{\"replicas\":3,\"image\":\"httpd\"}\n");
}

#[test]
fn test_resolve_as_yaml() {
    let dir = TempDir::new().unwrap();
    write_chart(dir.path());

    cmd()
        .args(["resolve", dir.path().to_str().unwrap(), "--yaml"])
        .assert()
        .success()
        .stdout("replicas: 1\nimage: nginx\n");
}

#[test]
fn test_patch_and_query_conflict() {
    let dir = TempDir::new().unwrap();
    write_chart(dir.path());

    cmd()
        .args(["resolve", dir.path().to_str().unwrap()])
        .args(["--patch", "p.json", "--query", "replicas=2"])
        .assert()
        .failure();
}

// ── Diff ────────────────────────────────────────────────────────────────────

#[test]
fn test_diff_json_values_file() {
    let dir = TempDir::new().unwrap();
    write_chart(dir.path());
    let values = dir.path().join("edited.json");
    fs::write(&values, r#"{"replicas": 2, "image": "nginx"}"#).unwrap();

    cmd()
        .args(["diff", dir.path().to_str().unwrap(), values.to_str().unwrap()])
        .args(["--format", "compact"])
        .assert()
        .success()
        .stdout("[{\"path\":[\"replicas\"],\"value\":2}]\n");
}

#[test]
fn test_diff_removed_key_is_a_delete() {
    let dir = TempDir::new().unwrap();
    write_chart(dir.path());
    let values = dir.path().join("edited.yaml");
    fs::write(&values, "replicas: 1\n").unwrap();

    cmd()
        .args(["diff", dir.path().to_str().unwrap(), values.to_str().unwrap()])
        .arg("--query")
        .assert()
        .success()
        .stdout("image=-\n");
}

#[test]
fn test_diff_rejects_wrong_shape() {
    let dir = TempDir::new().unwrap();
    write_chart(dir.path());
    let values = dir.path().join("edited.yaml");
    fs::write(&values, "replicas:\n  nested: true\n").unwrap();

    cmd()
        .args(["diff", dir.path().to_str().unwrap(), values.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid values file"))
        .stderr(predicate::str::contains("replicas"));
}

// ── Url ─────────────────────────────────────────────────────────────────────

#[test]
fn test_url_encode() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("entries.json");
    fs::write(
        &input,
        r#"[{"path": ["resources", "limits", "memory"], "value": "2Gi"}, {"path": ["env", 1]}]"#,
    )
    .unwrap();

    cmd()
        .args(["url", "encode", input.to_str().unwrap()])
        .assert()
        .success()
        .stdout("resources.limits.memory=«2Gi»&env[1]=-\n");
}

#[test]
fn test_url_decode() {
    cmd()
        .args(["url", "decode", "?replicas=3&env[0].name=«FOO»"])
        .args(["--format", "compact"])
        .assert()
        .success()
        .stdout(
            "[{\"path\":[\"replicas\"],\"value\":3},{\"path\":[\"env\",0,\"name\"],\"value\":\"FOO\"}]\n",
        );
}

#[test]
fn test_url_decode_malformed() {
    cmd()
        .args(["url", "decode", "replicas=three"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to decode query"));
}

// ── Errors ──────────────────────────────────────────────────────────────────

#[test]
fn test_missing_chart_directory() {
    let dir = TempDir::new().unwrap();

    cmd()
        .args(["form", dir.path().join("nope").to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Chart.yaml"));
}

#[test]
fn test_invalid_patch_file() {
    let dir = TempDir::new().unwrap();
    write_chart(dir.path());
    let patch = dir.path().join("patch.json");
    fs::write(&patch, "not json").unwrap();

    cmd()
        .args(["resolve", dir.path().to_str().unwrap()])
        .args(["--patch", patch.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to parse JSON"));
}
