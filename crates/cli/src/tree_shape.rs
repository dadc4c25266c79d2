use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use bb_hash::{ArtifactDigest, HashFamily};
use bb_storage::{compute_tree_shape, LocalCas, StorageConfig, TreeStructureCache};
use serde_json::{json, Value};

pub struct TreeShapeArgs {
    pub local_build_root: PathBuf,
    pub hash_family: HashFamily,
    /// `<hex-hash>/<size>`, matching `ArtifactDigest`'s own `Display`.
    pub tree: String,
}

/// Parses `hash/size`, the format `bb build`'s own JSON output uses for a
/// digest (§4.10). Trees are always GitSha1, so `hash_family` only affects
/// which CAS layout is opened, not how the digest itself is validated.
fn parse_tree_digest(family: HashFamily, raw: &str) -> Result<ArtifactDigest> {
    let Some((hash, size)) = raw.split_once('/') else {
        bail!("expected a tree digest of the form <hash>/<size>, got {raw:?}");
    };
    let size: u64 = size
        .parse()
        .with_context(|| format!("invalid size in tree digest {raw:?}"))?;
    Ok(ArtifactDigest::from_hex(family, hash.to_string(), size, true)?)
}

/// Looks up (computing and coupling it on a miss) the shape projection of
/// `args.tree` in the tree-structure cache (§4.10).
pub fn run(args: TreeShapeArgs) -> Result<Value> {
    let cas = std::sync::Arc::new(
        LocalCas::open(StorageConfig::new(args.local_build_root.clone(), args.hash_family, 1))
            .context("failed to open local build root")?,
    );
    let tree_digest = parse_tree_digest(args.hash_family, &args.tree)?;
    let cache = TreeStructureCache::new(std::sync::Arc::clone(&cas));

    let shape = match cache.get(&tree_digest)? {
        Some(shape) => shape,
        None => {
            let shape = compute_tree_shape(&cas, &tree_digest)?;
            cache.set(&tree_digest, &shape)?;
            shape
        }
    };

    Ok(json!({
        "tree": format!("{tree_digest}"),
        "shape": format!("{shape}"),
    }))
}
