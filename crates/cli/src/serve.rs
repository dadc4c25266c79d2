use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use bb_hash::HashFamily;
use bb_storage::{LocalCas, StorageConfig};
use tracing::info;

pub struct ServeArgs {
    pub local_build_root: PathBuf,
    pub hash_family: HashFamily,
    pub port: u16,
}

/// Opens the local build root and serves it over the trimmed REAPI subset
/// (§6.1) until interrupted, so another process can diff CAS/ByteStream
/// behaviour against this workspace's CAS without a real remote endpoint.
pub async fn run(args: ServeArgs) -> Result<()> {
    let cas = Arc::new(
        LocalCas::open(StorageConfig::new(args.local_build_root.clone(), args.hash_family, 1))
            .context("failed to open local build root")?,
    );
    let addr: SocketAddr = ([127, 0, 0, 1], args.port).into();
    info!(%addr, local_build_root = %args.local_build_root.display(), "serving local CAS");
    bb_execapi::serve(cas, args.hash_family, addr)
        .await
        .context("local REAPI server failed")
}
