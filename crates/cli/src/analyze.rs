use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use bb_execapi::{ExecutionApi, LocalApi};
use bb_graph::Executor;
use bb_model::{AnalysedTarget, ArtifactId};
use bb_storage::{LocalCas, StorageConfig};
use bb_task::TaskSystem;
use serde_json::{json, Value};

use crate::repo_config;
use crate::target_ref;
use crate::wiring;

pub struct AnalyzeArgs {
    pub workspace: PathBuf,
    pub target: String,
    pub config: Vec<String>,
}

/// Resolves one `(entity, configuration)` and returns its analysed target
/// plus the JSON rendering `analyze` prints. Source artifacts (`Local`,
/// `Known`, `Tree`) are hashed eagerly against a scratch CAS; `Action`
/// artifacts are reported by id only, since resolving them would require
/// running the action, which is `build`'s job, not `analyze`'s.
pub async fn run(args: AnalyzeArgs) -> Result<(AnalysedTarget, Value)> {
    let config_path = args.workspace.join("repository-config.json");
    let loaded = repo_config::load(&config_path, &args.workspace)?;
    let config = Arc::new(loaded.repositories);

    let entity = {
        let mapping: std::collections::HashMap<String, String> = config
            .name_mapping(&loaded.root_repository)
            .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();
        target_ref::parse(&args.target, &loaded.root_repository, &mapping)?
    };
    let configuration = crate::config_delta::parse_deltas(&args.config)?;

    let pipeline = wiring::build(Arc::clone(&config), loaded.hash_family, num_cpus::get());
    let ts = Arc::new(TaskSystem::with_threads(num_cpus::get()));
    let target = wiring::resolve_target(&pipeline.target_map, &ts, entity, configuration)?;

    let scratch = tempfile::tempdir().context("failed to create scratch CAS for analysis")?;
    let cas = Arc::new(
        LocalCas::open(StorageConfig::new(scratch.path(), loaded.hash_family, 1))
            .context("failed to open scratch CAS")?,
    );
    let api: Arc<dyn ExecutionApi> = Arc::new(LocalApi::new(cas));
    let executor = Executor::new(
        config,
        Arc::new(pipeline.results.all()),
        api,
        tokio::runtime::Handle::current(),
        loaded.hash_family,
        num_cpus::get(),
        Arc::new(bb_execapi::DispatchList::default()),
        Arc::new(std::collections::BTreeMap::new()),
    );

    let mut artifacts = serde_json::Map::new();
    for (name, artifact) in &target.artifacts {
        artifacts.insert(name.clone(), render_artifact(&executor, &ts, artifact));
    }
    let rendered = json!({ "artifacts": artifacts });
    Ok((target, rendered))
}

fn render_artifact(executor: &Arc<Executor>, ts: &Arc<TaskSystem>, artifact: &ArtifactId) -> Value {
    if let ArtifactId::Action { action_id, output_path } = artifact {
        return json!({
            "pending_action": action_id,
            "output_path": output_path,
        });
    }
    match executor.resolve(ts, artifact.clone()) {
        Some(info) => json!({
            "digest": info.digest().hash(),
            "size": info.digest().size(),
            "object_type": format!("{:?}", info.object_type()),
        }),
        None => json!({ "error": "failed to resolve artifact" }),
    }
}
