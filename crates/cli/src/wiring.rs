//! Assembles the chain of async maps behind `analyze`/`build` (§4.4-§4.6):
//! directory entries -> targets/rules/expressions file maps -> source-target
//! map -> target map, all sharing one `ResultTargetMap` action registry.

use std::sync::Arc;

use anyhow::Result;
use bb_asyncmap::AsyncMapConsumer;
use bb_hash::HashFamily;
use bb_model::{AnalysedTarget, Configuration, EntityName};
use bb_repo::RepositoryConfig;
use bb_targets::{source_target_map, target_map, ResultTargetMap, TargetKey};
use bb_task::TaskSystem;
use parking_lot::Mutex;

pub struct Pipeline {
    pub target_map: Arc<AsyncMapConsumer<TargetKey, AnalysedTarget>>,
    pub results: Arc<ResultTargetMap>,
}

pub fn build(config: Arc<RepositoryConfig>, hash_family: HashFamily, jobs: usize) -> Pipeline {
    let targets_files = bb_repo::targets_file_map(Arc::clone(&config), jobs);
    let dir_entries = bb_repo::directory_entries_map(Arc::clone(&config), jobs);
    let sources: Arc<AsyncMapConsumer<EntityName, AnalysedTarget>> =
        source_target_map(Arc::clone(&config), dir_entries, jobs);
    let results = Arc::new(ResultTargetMap::new(hash_family));
    let map = target_map(config, targets_files, sources, Arc::clone(&results), hash_family, jobs);
    Pipeline { target_map: map, results }
}

/// Drives `target_map` to completion for one `(entity, configuration)` pair
/// and returns its `AnalysedTarget`, or every fatal diagnostic it raised.
pub fn resolve_target(
    map: &Arc<AsyncMapConsumer<TargetKey, AnalysedTarget>>,
    ts: &Arc<TaskSystem>,
    entity: EntityName,
    configuration: Configuration,
) -> Result<AnalysedTarget> {
    let result = Arc::new(Mutex::new(None));
    let result2 = Arc::clone(&result);
    let errors = Arc::new(Mutex::new(Vec::new()));
    let errors2 = Arc::clone(&errors);

    map.consume_after_keys_ready(
        ts,
        vec![(entity, configuration)],
        Box::new(move |values| {
            *result2.lock() = Some((*values[0]).clone());
        }),
        Arc::new(move |msg: &str, fatal: bool| {
            if fatal {
                errors2.lock().push(msg.to_string());
            }
        }),
        None,
    );
    ts.finish();

    match result.lock().take() {
        Some(target) => Ok(target),
        None => {
            let messages = errors.lock().clone();
            anyhow::bail!("analysis failed: {}", messages.join("; "))
        }
    }
}
