use std::path::PathBuf;

use anyhow::{Context, Result};
use bb_hash::HashFamily;
use bb_storage::{LocalCas, StorageConfig};
use serde_json::{json, Value};

pub struct GcArgs {
    pub local_build_root: PathBuf,
    pub generations: usize,
    pub hash_family: HashFamily,
}

/// Opens the local build root and rotates its generations once (§4.8).
pub fn run(args: GcArgs) -> Result<Value> {
    let cas = LocalCas::open(StorageConfig::new(args.local_build_root.clone(), args.hash_family, args.generations))
        .context("failed to open local build root")?;
    cas.trigger_garbage_collection()
        .context("garbage collection failed")?;
    Ok(json!({
        "local_build_root": args.local_build_root,
        "generations": args.generations,
    }))
}
