use std::fs;

use anyhow::Result;
use assert_cmd::Command;
use bb_integration_tests::cli_path;
use serde_json::Value;
use tempfile::TempDir;

fn write_workspace() -> Result<TempDir> {
    let dir = tempfile::tempdir()?;
    fs::write(
        dir.path().join("repository-config.json"),
        serde_json::json!({
            "hash_family": "plain-sha256",
            "root_repository": "main",
            "repositories": {
                "main": {
                    "workspace_root": {"type": "fs", "path": "."}
                }
            }
        })
        .to_string(),
    )?;
    fs::write(dir.path().join("a.txt"), b"hello from a\n")?;
    fs::write(
        dir.path().join("TARGETS"),
        serde_json::json!({
            "greeting": {
                "type": "generic",
                "name": "greeting",
                "cmd": ["/bin/sh", "-c", "cat a.txt > out.txt"],
                "outs": ["out.txt"],
                "deps": ["a.txt"]
            }
        })
        .to_string(),
    )?;
    Ok(dir)
}

/// End-to-end: a `generic` target's declared command is actually run
/// through `LocalApi` against an on-disk CAS, and `bb build` reports the
/// resulting output's digest (§4.6 built-in rules, §4.7 executor).
#[test]
fn building_a_generic_target_runs_its_command_and_reports_a_digest() -> Result<()> {
    let dir = write_workspace()?;
    let bin = cli_path()?;

    let assert = Command::new(&bin)
        .args(["build", "--workspace"])
        .arg(dir.path())
        .arg("greeting")
        .assert()
        .success();

    let output = assert.get_output();
    let rendered: Value = serde_json::from_slice(&output.stdout)?;
    let out_digest = rendered["outputs"]["out.txt"]["digest"]
        .as_str()
        .expect("out.txt should have a digest");
    assert!(!out_digest.is_empty());
    assert_eq!(rendered["stats"]["executed"], 1);

    let cache_root = dir.path().join(".bb-cache");
    assert!(cache_root.exists(), "local build root should have been created");
    Ok(())
}

/// `bb analyze` resolves source artifacts without running any action.
#[test]
fn analyzing_a_generic_target_does_not_execute_its_command() -> Result<()> {
    let dir = write_workspace()?;
    let bin = cli_path()?;

    let assert = Command::new(&bin)
        .args(["analyze", "--workspace"])
        .arg(dir.path())
        .arg("greeting")
        .assert()
        .success();

    let output = assert.get_output();
    let rendered: Value = serde_json::from_slice(&output.stdout)?;
    assert!(rendered["artifacts"]["out.txt"]["pending_action"].is_string());
    assert!(!dir.path().join("out.txt").exists());
    Ok(())
}

/// An unresolvable target surfaces as a non-zero exit with a diagnostic on
/// stderr, not a panic.
#[test]
fn building_an_unknown_target_fails_cleanly() -> Result<()> {
    let dir = write_workspace()?;
    let bin = cli_path()?;

    Command::new(&bin)
        .args(["build", "--workspace"])
        .arg(dir.path())
        .arg("does_not_exist")
        .assert()
        .failure();
    Ok(())
}
