//! CLI Integration Tests
//!
//! Tests the command-line interface end-to-end.

use assert_cmd::Command;
use assert_fs::prelude::*;
use predicates::prelude::*;

const REQUIREMENT: &str = r#"# Bookmarks

## Saving

- Users can save a link with a title
- Users can tag saved links

## Search

- Users can search links by tag
"#;

/// Get the binary to test.
fn reqflow() -> Command {
    Command::cargo_bin("reqflow").unwrap()
}

/// Binary isolated in `temp`: documents, config lookup and cwd all point there.
fn reqflow_in(temp: &assert_fs::TempDir) -> Command {
    let mut cmd = reqflow();
    cmd.current_dir(temp.path())
        .env("XDG_CONFIG_HOME", temp.path().join("config"))
        .env("XDG_DATA_HOME", temp.path().join("data"))
        .env_remove("RUST_LOG")
        .env_remove("REQFLOW_RULES_DIR")
        .env("REQFLOW_DATA_DIR", temp.path().join("docs"));
    cmd
}

// ============================================================================
// Help & Version Tests
// ============================================================================

#[test]
fn test_help_flag() {
    reqflow()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage: reqflow"))
        .stdout(predicate::str::contains("resume"));
}

#[test]
fn test_version_flag() {
    reqflow()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_subcommand_help() {
    reqflow()
        .args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--requirement"));
}

#[test]
fn test_completions_bash() {
    reqflow()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("reqflow"));
}

// ============================================================================
// Document Lifecycle Tests
// ============================================================================

#[test]
fn test_init_then_status() {
    let temp = assert_fs::TempDir::new().unwrap();

    reqflow_in(&temp)
        .args(["init", "bookmarks", "--name", "hello-world"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created document 'bookmarks'"));

    temp.child("docs/bookmarks.rvd.json").assert(predicate::path::exists());

    reqflow_in(&temp)
        .args(["status", "bookmarks"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Project: hello-world"))
        .stdout(predicate::str::contains("Status: pending (0/8 phases)"))
        .stdout(predicate::str::contains("Next phase: functional"));
}

#[test]
fn test_init_twice_fails() {
    let temp = assert_fs::TempDir::new().unwrap();

    reqflow_in(&temp).args(["init", "dup", "--name", "dup"]).assert().success();
    reqflow_in(&temp)
        .args(["init", "dup", "--name", "dup"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn test_invalid_document_id() {
    let temp = assert_fs::TempDir::new().unwrap();

    reqflow_in(&temp)
        .args(["init", "../escape", "--name", "x"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid document id"));
}

#[test]
fn test_status_of_missing_document() {
    let temp = assert_fs::TempDir::new().unwrap();

    reqflow_in(&temp)
        .args(["status", "nothing"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn test_run_full_pipeline() {
    let temp = assert_fs::TempDir::new().unwrap();
    temp.child("requirement.md").write_str(REQUIREMENT).unwrap();

    reqflow_in(&temp)
        .args(["run", "bookmarks", "--requirement", "requirement.md", "--name", "Bookmarks"])
        .assert()
        .success()
        .stdout(predicate::str::contains("deployment"))
        .stdout(predicate::str::contains("Status: completed"));

    reqflow_in(&temp)
        .args(["status", "bookmarks", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"completedCount\": 8"))
        .stdout(predicate::str::contains("\"fingerprint\""));

    reqflow_in(&temp)
        .args(["show", "bookmarks", "functional"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Users can tag saved links"));
}

#[test]
fn test_run_with_unparsable_requirement_fails() {
    let temp = assert_fs::TempDir::new().unwrap();
    temp.child("requirement.md").write_str("Only prose, no list.\n").unwrap();

    reqflow_in(&temp)
        .args(["run", "prose", "--requirement", "requirement.md"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("✗ functional"))
        .stderr(predicate::str::contains("no list items"));
}

#[test]
fn test_resume_from_phase() {
    let temp = assert_fs::TempDir::new().unwrap();
    temp.child("requirement.md").write_str(REQUIREMENT).unwrap();

    reqflow_in(&temp)
        .args(["run", "bookmarks", "-r", "requirement.md"])
        .assert()
        .success();

    reqflow_in(&temp)
        .args(["resume", "bookmarks", "--from", "review"])
        .assert()
        .success()
        .stdout(predicate::str::contains("(already completed)"))
        .stdout(predicate::str::contains("Status: completed"));
}

#[test]
fn test_show_missing_section() {
    let temp = assert_fs::TempDir::new().unwrap();

    reqflow_in(&temp).args(["init", "empty", "--name", "empty"]).assert().success();
    reqflow_in(&temp)
        .args(["show", "empty", "review"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("has not been produced yet"));
}

// ============================================================================
// Validate Command Tests
// ============================================================================

#[test]
fn test_validate_valid_document() {
    let temp = assert_fs::TempDir::new().unwrap();

    reqflow_in(&temp).args(["init", "valid", "--name", "hello-world"]).assert().success();
    reqflow_in(&temp)
        .args(["validate", "docs/valid.rvd.json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("is valid"));
}

#[test]
fn test_validate_reports_every_violation() {
    let temp = assert_fs::TempDir::new().unwrap();
    temp.child("broken.json")
        .write_str(
            r#"{
                "version": "1.0.0",
                "project": { "name": "" },
                "functional": {
                    "timestamp": "2024-01-01T00:00:00Z",
                    "producedBy": "test",
                    "data": { "requirements": [] }
                }
            }"#,
        )
        .unwrap();

    reqflow_in(&temp)
        .args(["validate", "broken.json"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("created"))
        .stdout(predicate::str::contains("functional:"))
        .stderr(predicate::str::contains("violation(s)"));
}

// ============================================================================
// Rules Command Tests
// ============================================================================

#[test]
fn test_rules_list_builtin() {
    let temp = assert_fs::TempDir::new().unwrap();

    reqflow_in(&temp)
        .args(["rules", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("esm-require-not-defined"))
        .stdout(predicate::str::contains("(disabled)"));
}

#[test]
fn test_rules_list_phase_is_severity_ordered() {
    let temp = assert_fs::TempDir::new().unwrap();

    let output = reqflow_in(&temp)
        .args(["rules", "list", "--phase", "implementation", "--category", "code-generation"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    let critical = stdout.find("no-hardcoded-credentials").unwrap();
    let high = stdout.find("esm-imports").unwrap();
    assert!(critical < high);
}

#[test]
fn test_rules_dir_overrides_category() {
    let temp = assert_fs::TempDir::new().unwrap();
    temp.child("rules/validation.yaml")
        .write_str(
            r#"
- id: house-style
  name: House style
  category: validation
  phase: [review]
  severity: MEDIUM
  condition:
    type: always
  action:
    type: enforce-pattern
    params:
      forbidden: ["var "]
"#,
        )
        .unwrap();

    reqflow_in(&temp)
        .args(["--rules-dir", "rules", "rules", "list", "--category", "validation"])
        .assert()
        .success()
        .stdout(predicate::str::contains("house-style"))
        .stdout(predicate::str::contains("cargo-check").not());
}

#[test]
fn test_rules_apply_reports_violations() {
    let temp = assert_fs::TempDir::new().unwrap();
    temp.child("app/package.json").write_str(r#"{ "name": "app", "type": "module" }"#).unwrap();
    temp.child("app/src/index.js").write_str("const fs = require('fs');\n").unwrap();

    reqflow_in(&temp)
        .args(["rules", "apply", "implementation", "--dir", "app"])
        .assert()
        .success()
        .stdout(predicate::str::contains("✗ [HIGH] esm-imports"))
        .stdout(predicate::str::contains("1 failed"));
}

#[test]
fn test_rules_apply_abort() {
    let temp = assert_fs::TempDir::new().unwrap();
    temp.child("app/config.js").write_str("export const apiKey = 'sk_live_0123456789';\n").unwrap();

    reqflow_in(&temp)
        .args(["rules", "apply", "implementation", "--dir", "app"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no-hardcoded-credentials"));
}

// ============================================================================
// Fix Command Tests
// ============================================================================

#[test]
fn test_fix_known_error() {
    let temp = assert_fs::TempDir::new().unwrap();

    reqflow_in(&temp)
        .args(["fix", "ReferenceError: require is not defined in ES module scope"])
        .assert()
        .success()
        .stdout(predicate::str::contains("esm-require-not-defined"))
        .stdout(predicate::str::contains("import fs from 'fs';"));
}

#[test]
fn test_fix_unrelated_error() {
    let temp = assert_fs::TempDir::new().unwrap();

    reqflow_in(&temp)
        .args(["fix", "totally unrelated error"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No matching fix"));

    reqflow_in(&temp)
        .args(["fix", "totally unrelated error", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("null"));
}
