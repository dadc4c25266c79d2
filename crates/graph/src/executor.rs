use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use bb_execapi::{DispatchList, ExecutionApi};
use bb_hash::HashFamily;
use bb_model::{Action, ArtifactId, ObjectInfo};
use bb_repo::RepositoryConfig;
use bb_task::TaskSystem;
use tokio::runtime::Handle;

use crate::action_map::{self, ActionMap, ActionOutputs};
use crate::artifact_map::{self, ArtifactMap};
use crate::stats::ExecutionStats;

/// The dependency graph's two cross-referencing maps (§2 C8, §4.7): action
/// nodes request their inputs from the artifact map, and artifact nodes for
/// `Action`-sourced artifacts request the producing action from the action
/// map. Neither map can be built before the other exists, so both are
/// constructed against a shared, initially-empty cell and the cell is
/// populated once construction finishes.
pub struct Executor {
    artifact_map: Arc<ArtifactMap>,
    action_map: Arc<ActionMap>,
    stats: Arc<ExecutionStats>,
}

impl Executor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        repo: Arc<RepositoryConfig>,
        actions: Arc<BTreeMap<String, Action>>,
        api: Arc<dyn ExecutionApi>,
        runtime: Handle,
        hash_family: HashFamily,
        jobs: usize,
        dispatch: Arc<DispatchList>,
        backends: Arc<BTreeMap<String, Arc<dyn ExecutionApi>>>,
    ) -> Arc<Self> {
        let stats = Arc::new(ExecutionStats::default());
        let artifact_cell: Arc<OnceLock<Arc<ArtifactMap>>> = Arc::new(OnceLock::new());
        let action_cell: Arc<OnceLock<Arc<ActionMap>>> = Arc::new(OnceLock::new());

        let artifact_vc = artifact_map::make_value_creator(Arc::clone(&repo), Arc::clone(&api), runtime.clone(), hash_family, Arc::clone(&action_cell));
        let artifact_map = ArtifactMap::new(artifact_vc, jobs);
        artifact_cell.set(Arc::clone(&artifact_map)).unwrap_or_else(|_| unreachable!("cell set exactly once"));

        let action_vc = action_map::make_value_creator(actions, Arc::clone(&artifact_cell), api, runtime, Arc::clone(&stats), hash_family, dispatch, backends);
        let action_map = ActionMap::new(action_vc, jobs);
        action_cell.set(Arc::clone(&action_map)).unwrap_or_else(|_| unreachable!("cell set exactly once"));

        Arc::new(Self { artifact_map, action_map, stats })
    }

    /// Runs `action_id` (and transitively everything it needs) to
    /// completion, blocking until the task system drains, and returns its
    /// declared outputs.
    pub fn build(self: &Arc<Self>, ts: &Arc<TaskSystem>, action_id: &str) -> Option<ActionOutputs> {
        let result = Arc::new(parking_lot::Mutex::new(None));
        let result2 = Arc::clone(&result);
        self.action_map.consume_after_keys_ready(
            ts,
            vec![action_id.to_string()],
            Box::new(move |values| {
                *result2.lock() = Some((*values[0]).clone());
            }),
            Arc::new(|msg: &str, fatal: bool| {
                if fatal {
                    tracing::error!(%msg, "action failed");
                } else {
                    tracing::warn!(%msg, "action reported an issue");
                }
            }),
            None,
        );
        ts.finish();
        result.lock().clone()
    }

    /// Resolves a single artifact (e.g. a target's top-level output) without
    /// going through an action id.
    pub fn resolve(self: &Arc<Self>, ts: &Arc<TaskSystem>, artifact: ArtifactId) -> Option<ObjectInfo> {
        let result = Arc::new(parking_lot::Mutex::new(None));
        let result2 = Arc::clone(&result);
        self.artifact_map.consume_after_keys_ready(
            ts,
            vec![artifact],
            Box::new(move |values| {
                *result2.lock() = Some((*values[0]).clone());
            }),
            Arc::new(|msg: &str, fatal: bool| {
                if fatal {
                    tracing::error!(%msg, "artifact resolution failed");
                }
            }),
            None,
        );
        ts.finish();
        result.lock().clone()
    }

    pub fn stats(&self) -> &ExecutionStats {
        &self.stats
    }

    /// Surfaces a dependency cycle detected in either map, if one occurred
    /// during the last run (§4.3, §8 scenario B).
    pub fn detect_cycle(&self) -> Option<Vec<String>> {
        self.action_map.detect_cycle()
    }
}
