use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use bb_execapi::{BazelApi, ExecutionApi, LocalApi};
use bb_graph::{Executor, GraphError};
use bb_storage::{LocalCas, StorageConfig};
use bb_task::TaskSystem;
use serde_json::{json, Value};

use crate::repo_config;
use crate::target_ref;
use crate::wiring;

pub struct BuildArgs {
    pub workspace: PathBuf,
    pub target: String,
    pub config: Vec<String>,
    pub remote: Option<String>,
    pub jobs: Option<usize>,
    pub local_build_root: Option<PathBuf>,
}

/// Analyzes `args.target`, then runs the dependency graph to completion
/// against either a remote RE endpoint (`--remote`) or a local CAS rooted at
/// `--local-build-root` (default `<workspace>/.bb-cache`), printing every
/// top-level artifact's resolved digest. A detected cycle surfaces as
/// [`GraphError::Cycle`] so the caller can set a distinct exit code (§7).
pub async fn run(args: BuildArgs) -> Result<Value> {
    let config_path = args.workspace.join("repository-config.json");
    let loaded = repo_config::load(&config_path, &args.workspace)?;
    let config = Arc::new(loaded.repositories);
    let jobs = args.jobs.unwrap_or_else(num_cpus::get);

    let entity = {
        let mapping: std::collections::HashMap<String, String> = config
            .name_mapping(&loaded.root_repository)
            .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();
        target_ref::parse(&args.target, &loaded.root_repository, &mapping)?
    };
    let configuration = crate::config_delta::parse_deltas(&args.config)?;

    let pipeline = wiring::build(Arc::clone(&config), loaded.hash_family, jobs);
    let ts = Arc::new(TaskSystem::with_threads(jobs));
    let target = wiring::resolve_target(&pipeline.target_map, &ts, entity, configuration)?;

    let api: Arc<dyn ExecutionApi> = match &args.remote {
        Some(endpoint) => Arc::new(
            BazelApi::connect(endpoint.clone(), "bb-cli", loaded.hash_family)
                .await
                .with_context(|| format!("failed to connect to remote execution endpoint {endpoint}"))?,
        ),
        None => {
            let root = args
                .local_build_root
                .clone()
                .unwrap_or_else(|| args.workspace.join(".bb-cache"));
            let cas = LocalCas::open(StorageConfig::new(root, loaded.hash_family, 1))
                .context("failed to open local build root")?;
            Arc::new(LocalApi::new(Arc::new(cas)))
        }
    };

    // §4.7 step 3: eagerly connect to every distinct endpoint named in the
    // dispatch list so a matching action can be routed there instead of the
    // default backend chosen above.
    let mut backends: std::collections::BTreeMap<String, Arc<dyn ExecutionApi>> = std::collections::BTreeMap::new();
    for endpoint in loaded.dispatch.endpoints() {
        if !backends.contains_key(endpoint) {
            let connected = BazelApi::connect(endpoint.to_string(), "bb-cli", loaded.hash_family)
                .await
                .with_context(|| format!("failed to connect to dispatch endpoint {endpoint}"))?;
            backends.insert(endpoint.to_string(), Arc::new(connected));
        }
    }

    let executor = Executor::new(
        config,
        Arc::new(pipeline.results.all()),
        api,
        tokio::runtime::Handle::current(),
        loaded.hash_family,
        jobs,
        Arc::new(loaded.dispatch),
        Arc::new(backends),
    );

    let mut outputs = serde_json::Map::new();
    for (name, artifact) in &target.artifacts {
        let info = executor
            .resolve(&ts, artifact.clone())
            .ok_or_else(|| anyhow::anyhow!("failed to build artifact {name:?}"))?;
        outputs.insert(
            name.clone(),
            json!({
                "digest": info.digest().hash(),
                "size": info.digest().size(),
                "object_type": format!("{:?}", info.object_type()),
                "failed": info.failed(),
            }),
        );
    }

    if let Some(cycle) = executor.detect_cycle() {
        return Err(GraphError::Cycle(cycle).into());
    }

    let stats = executor.stats();
    Ok(json!({
        "outputs": outputs,
        "stats": {
            "queued": stats.queued(),
            "cached": stats.cached(),
            "executed": stats.executed(),
            "flaky": stats.flaky(),
        },
    }))
}
