use std::path::PathBuf;
use std::process::Command as StdCommand;

use anyhow::{anyhow, Context, Result};
use once_cell::sync::OnceCell;

static CLI_PATH: OnceCell<PathBuf> = OnceCell::new();

/// Root of the workspace (two levels up from this crate).
pub fn workspace_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .and_then(|p| p.parent())
        .expect("workspace root is two directories above the integration-tests crate")
        .to_path_buf()
}

/// Build (once) and return the path to the `bb` CLI binary.
pub fn cli_path() -> Result<PathBuf> {
    CLI_PATH.get_or_try_init(build_cli).cloned()
}

fn build_cli() -> Result<PathBuf> {
    let root = workspace_root();
    let status = StdCommand::new("cargo")
        .args(["build", "-p", "bb-cli", "--bin", "bb"])
        .current_dir(&root)
        .status()
        .context("failed to start cargo build for bb-cli")?;

    if !status.success() {
        return Err(anyhow!("cargo build for bb-cli failed with {status:?}"));
    }

    let mut path = root.join("target/debug/bb");
    if cfg!(windows) {
        path.set_extension("exe");
    }
    Ok(path)
}
