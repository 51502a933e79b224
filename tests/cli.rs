//! Integration tests: run the compo binary and check exit codes and output.

use std::path::Path;
use std::process::{Command, Output};

use serde_json::{json, Value};

fn compo(dir: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_compo"));
    cmd.current_dir(dir)
        .env("HOME", dir)
        .env("NO_COLOR", "1")
        .env_remove("COMPO_REGISTRY")
        .env_remove("COMPO_DOWNGRADE")
        .env_remove("COMPO_LOG");
    cmd
}

fn packument(dir: &Path, name: &str, versions: &[(&str, Value)]) {
    let versions: serde_json::Map<String, Value> = versions
        .iter()
        .map(|(version, deps)| {
            (
                version.to_string(),
                json!({"name": name, "version": version, "dependencies": deps}),
            )
        })
        .collect();
    let file = format!("{}.json", name.replace('/', "%2F"));
    std::fs::write(dir.join(file), json!({ "versions": versions }).to_string()).unwrap();
}

fn fixture() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let registry = dir.path().join("registry");
    std::fs::create_dir(&registry).unwrap();
    packument(
        &registry,
        "o-grid",
        &[("4.3.0", json!({})), ("5.0.0", json!({"o-colors": "^4.0.0"}))],
    );
    packument(&registry, "o-colors", &[("4.0.0", json!({})), ("4.1.0", json!({}))]);
    dir
}

fn stdout(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).to_string()
}

fn stderr(out: &Output) -> String {
    String::from_utf8_lossy(&out.stderr).to_string()
}

#[test]
fn test_help() {
    let dir = tempfile::tempdir().unwrap();
    let out = compo(dir.path()).arg("--help").output().unwrap();
    assert!(out.status.success(), "compo --help should succeed");
    let text = stdout(&out);
    assert!(text.contains("resolve"));
    assert!(text.contains("constraint"));
}

#[test]
fn test_version() {
    let dir = tempfile::tempdir().unwrap();
    let out = compo(dir.path()).arg("--version").output().unwrap();
    assert!(out.status.success());
    assert!(stdout(&out).contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_resolve_prints_selection() {
    let dir = fixture();
    std::fs::write(
        dir.path().join("package.json"),
        r#"{"name": "myapp", "dependencies": {"o-grid": "^5.0.0"}}"#,
    )
    .unwrap();

    let out = compo(dir.path())
        .args(["resolve", "--registry", "registry"])
        .output()
        .unwrap();
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    let text = stdout(&out);
    assert!(text.contains("o-grid 5.0.0"));
    assert!(text.contains("o-colors 4.1.0"));
}

#[test]
fn test_resolve_json_with_lock() {
    let dir = fixture();
    std::fs::write(
        dir.path().join("bundle.json"),
        r#"{"name": "myapp", "dependencies": {"o-grid": "*"}}"#,
    )
    .unwrap();

    let out = compo(dir.path())
        .args([
            "resolve",
            "--manifest",
            "bundle.json",
            "--registry",
            "registry",
            "--lock",
            "o-colors@4.0.0",
            "--json",
        ])
        .output()
        .unwrap();
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    let doc: Value = serde_json::from_str(stdout(&out).trim()).unwrap();
    assert_eq!(doc["root"], "myapp");
    let selected: Vec<String> = doc["packages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| format!("{}@{}", p["name"].as_str().unwrap(), p["version"].as_str().unwrap()))
        .collect();
    assert_eq!(selected, vec!["o-grid@5.0.0", "o-colors@4.0.0"]);
}

#[test]
fn test_resolve_failure_explained_on_stderr() {
    let dir = fixture();
    std::fs::write(
        dir.path().join("package.json"),
        r#"{"name": "install-dependencies-test", "dependencies": {"jakedash": "*"}}"#,
    )
    .unwrap();

    let out = compo(dir.path())
        .args(["resolve", "--registry", "registry"])
        .output()
        .unwrap();
    assert!(!out.status.success());
    assert_eq!(
        stderr(&out).trim_end(),
        "Because install-dependencies-test depends on jakedash@* which doesn't exist \
         (could not find package jakedash), version solving failed."
    );
}

#[test]
fn test_resolve_registry_from_config() {
    let dir = fixture();
    std::fs::write(dir.path().join(".comporc"), r#"{"registry": "registry", "downgrade": true}"#).unwrap();
    std::fs::write(
        dir.path().join("package.json"),
        r#"{"name": "myapp", "dependencies": {"o-colors": "^4.0.0"}}"#,
    )
    .unwrap();

    let out = compo(dir.path()).arg("resolve").output().unwrap();
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert!(stdout(&out).contains("o-colors 4.0.0"));
}

#[test]
fn test_resolve_without_registry_fails() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("package.json"), r#"{"name": "myapp"}"#).unwrap();
    let out = compo(dir.path()).arg("resolve").output().unwrap();
    assert!(!out.status.success());
    assert!(stderr(&out).contains("No registry configured"));
}

#[test]
fn test_constraint_command() {
    let dir = tempfile::tempdir().unwrap();
    let out = compo(dir.path())
        .args(["constraint", "^1.2.0", "1.2.3", "2.0.0"])
        .output()
        .unwrap();
    assert!(out.status.success());
    assert_eq!(stdout(&out), "^1.2.0\n1.2.3 allowed\n2.0.0 not allowed\n");

    let out = compo(dir.path()).args(["constraint", ">=2.0.0 <1.0.0"]).output().unwrap();
    assert!(!out.status.success());
}
