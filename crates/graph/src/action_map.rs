use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use bb_asyncmap::{AsyncMapConsumer, Logger, Setter, SubCaller, ValueCreator};
use bb_execapi::{CacheMode, DispatchList, ExecutionAction, ExecutionApi};
use bb_hash::{ArtifactDigest, HashFamily};
use bb_model::{Action, ArtifactId, ObjectInfo, ObjectType};
use bb_task::TaskSystem;
use tokio::runtime::Handle;

use crate::artifact_map::ArtifactMap;
use crate::assemble::assemble_root_tree;
use crate::stats::ExecutionStats;

/// Result of running one action node (§3 "Action (graph node)", §4.7 steps
/// 4-6): the declared outputs, and — for a regular (non-tree) action — the
/// assembled `ExecutionAction` that produced them, kept around so a
/// [`crate::Rebuilder`] can resubmit the exact same inputs without
/// re-resolving them.
#[derive(Debug, Clone)]
pub struct ActionOutputs {
    pub outputs: BTreeMap<String, ObjectInfo>,
    pub assembled: Option<ExecutionAction>,
    pub from_cache: bool,
}

pub type ActionMap = AsyncMapConsumer<String, ActionOutputs>;

#[allow(clippy::too_many_arguments)]
pub fn make_value_creator(
    actions: Arc<BTreeMap<String, Action>>,
    artifact_cell: Arc<OnceLock<Arc<ArtifactMap>>>,
    api: Arc<dyn ExecutionApi>,
    runtime: Handle,
    stats: Arc<ExecutionStats>,
    hash_family: HashFamily,
    dispatch: Arc<DispatchList>,
    backends: Arc<BTreeMap<String, Arc<dyn ExecutionApi>>>,
) -> ValueCreator<String, ActionOutputs> {
    Arc::new(move |ts: Arc<TaskSystem>, setter: Setter<ActionOutputs>, logger: Logger, _sub_caller: SubCaller<String, ActionOutputs>, action_id: String| {
        let Some(action) = actions.get(&action_id).cloned() else {
            logger(&format!("unknown action id {action_id:?}"), true);
            return;
        };

        let artifact_map = Arc::clone(artifact_cell.get().expect("artifact map initialised before actions are requested"));
        let keys: Vec<ArtifactId> = action.inputs.values().cloned().collect();
        let paths: Vec<String> = action.inputs.keys().cloned().collect();

        let api2 = Arc::clone(&api);
        let dispatch2 = Arc::clone(&dispatch);
        let backends2 = Arc::clone(&backends);
        let runtime2 = runtime.clone();
        let stats2 = Arc::clone(&stats);
        let logger2 = Arc::clone(&logger);
        let fail_logger = Arc::clone(&logger);

        artifact_map.consume_after_keys_ready(
            &ts,
            keys,
            Box::new(move |values| {
                let staged: BTreeMap<String, ObjectInfo> = paths.into_iter().zip(values.into_iter().map(|v| (*v).clone())).collect();
                let selected = select_backend(&dispatch2, &backends2, &action.execution_properties, &api2);
                let result = runtime2.block_on(run_action(selected, hash_family, &action, staged, &stats2));
                match result {
                    Ok(outputs) => setter(outputs),
                    Err(message) => logger2(&message, true),
                }
            }),
            Arc::clone(&fail_logger),
            Some(Arc::new(move || fail_logger("input artifact failed", true))),
        );
    })
}

/// §4.7 step 3: route to the first dispatch-list entry whose declared
/// properties all match the action's merged execution properties; fall back
/// to the default endpoint when nothing matches or the matched endpoint has
/// no registered backend.
fn select_backend<'a>(
    dispatch: &DispatchList,
    backends: &'a BTreeMap<String, Arc<dyn ExecutionApi>>,
    execution_properties: &BTreeMap<String, String>,
    default: &'a Arc<dyn ExecutionApi>,
) -> &'a dyn ExecutionApi {
    dispatch
        .select(execution_properties)
        .and_then(|endpoint| backends.get(endpoint))
        .map(|api| api.as_ref())
        .unwrap_or(default.as_ref())
}

async fn run_action(api: &dyn ExecutionApi, hash_family: HashFamily, action: &Action, staged: BTreeMap<String, ObjectInfo>, stats: &ExecutionStats) -> Result<ActionOutputs, String> {
    let root_digest = assemble_root_tree(api, &staged).await.map_err(|e| e.to_string())?;

    if action.is_tree_action() {
        let mut outputs = BTreeMap::new();
        outputs.insert(".".to_string(), ObjectInfo::new(root_digest, ObjectType::Tree));
        return Ok(ActionOutputs { outputs, assembled: None, from_cache: false });
    }

    let exec_action = ExecutionAction {
        command: action.command.clone(),
        env: action.env.clone(),
        input_root_digest: root_digest,
        output_files: action.output_files.clone(),
        output_dirs: action.output_dirs.clone(),
        timeout_scale: action.timeout_scale,
        execution_properties: action.execution_properties.clone(),
        cache_mode: if action.no_cache { CacheMode::DoNotCacheOutput } else { CacheMode::CacheOutput },
    };

    stats.record_queued();
    let result = api.execute(exec_action.clone()).await.map_err(|e| e.to_string())?;
    stats.record_outcome(result.from_cache);

    let Some(exit_code) = result.exit_code else {
        return Err(format!("action {} got no execution response", action.id));
    };

    if exit_code == 0 {
        for path in action.output_files.iter().chain(action.output_dirs.iter()) {
            if !result.outputs.contains_key(path) {
                return Err(format!("action {} did not produce declared output {path:?}", action.id));
            }
        }
        return Ok(ActionOutputs {
            outputs: result.outputs,
            assembled: Some(exec_action),
            from_cache: result.from_cache,
        });
    }

    if !action.may_fail {
        return Err(format!("action {} exited with code {exit_code}", action.id));
    }

    // §7 `may_fail`: a non-zero exit becomes a soft failure. Every declared
    // output is still produced in the graph, marked failed, so downstream
    // consumers can keep analysing instead of aborting the whole build.
    let mut outputs = BTreeMap::new();
    for path in action.output_files.iter().chain(action.output_dirs.iter()) {
        let digest = result
            .outputs
            .get(path)
            .map(|info| info.digest().clone())
            .unwrap_or_else(|| ArtifactDigest::hash_data_as(hash_family, format!("{}:{path}:failed", action.id).as_bytes(), false));
        let object_type = result.outputs.get(path).map(|info| info.object_type()).unwrap_or(ObjectType::File);
        outputs.insert(path.clone(), ObjectInfo::with_failed(digest, object_type, true));
    }
    Ok(ActionOutputs { outputs, assembled: Some(exec_action), from_cache: result.from_cache })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bb_execapi::{ExecutionApiResult, ExecutionResult};
    use bb_execapi::BackendDescription;
    use bb_model::ArtifactBlob;
    use bb_storage::TreeEntry;

    /// Never actually called in these tests; `select_backend` only needs to
    /// return the right `Arc`, which is checked by pointer identity below.
    struct UnusedApi;

    #[async_trait]
    impl ExecutionApi for UnusedApi {
        async fn is_available(&self, _digest: &ArtifactDigest) -> ExecutionApiResult<bool> {
            unreachable!("not exercised by these tests")
        }
        async fn upload_blob(&self, _blob: &ArtifactBlob) -> ExecutionApiResult<ArtifactDigest> {
            unreachable!("not exercised by these tests")
        }
        async fn retrieve_blob(&self, _digest: &ArtifactDigest) -> ExecutionApiResult<Vec<u8>> {
            unreachable!("not exercised by these tests")
        }
        async fn upload_tree(&self, _entries: &[TreeEntry]) -> ExecutionApiResult<ArtifactDigest> {
            unreachable!("not exercised by these tests")
        }
        async fn execute(&self, _action: ExecutionAction) -> ExecutionApiResult<ExecutionResult> {
            unreachable!("not exercised by these tests")
        }
    }

    fn backend() -> Arc<dyn ExecutionApi> {
        Arc::new(UnusedApi)
    }

    #[test]
    fn matching_dispatch_entry_routes_to_its_backend() {
        let default = backend();
        let linux_pool = backend();
        let dispatch = DispatchList::new(vec![BackendDescription {
            properties: BTreeMap::from([("os".to_string(), "linux".to_string())]),
            endpoint: "linux-pool".to_string(),
        }]);
        let mut backends: BTreeMap<String, Arc<dyn ExecutionApi>> = BTreeMap::new();
        backends.insert("linux-pool".to_string(), Arc::clone(&linux_pool));

        let properties = BTreeMap::from([("os".to_string(), "linux".to_string())]);
        let selected = select_backend(&dispatch, &backends, &properties, &default);
        assert!(std::ptr::eq(selected, linux_pool.as_ref()));
    }

    #[test]
    fn no_match_falls_back_to_the_default_backend() {
        let default = backend();
        let dispatch = DispatchList::new(vec![BackendDescription {
            properties: BTreeMap::from([("os".to_string(), "macos".to_string())]),
            endpoint: "mac-pool".to_string(),
        }]);
        let backends: BTreeMap<String, Arc<dyn ExecutionApi>> = BTreeMap::new();

        let properties = BTreeMap::from([("os".to_string(), "linux".to_string())]);
        let selected = select_backend(&dispatch, &backends, &properties, &default);
        assert!(std::ptr::eq(selected, default.as_ref()));
    }

    #[test]
    fn matched_endpoint_with_no_registered_backend_falls_back_to_default() {
        let default = backend();
        let dispatch = DispatchList::new(vec![BackendDescription {
            properties: BTreeMap::new(),
            endpoint: "unregistered-pool".to_string(),
        }]);
        let backends: BTreeMap<String, Arc<dyn ExecutionApi>> = BTreeMap::new();

        let selected = select_backend(&dispatch, &backends, &BTreeMap::new(), &default);
        assert!(std::ptr::eq(selected, default.as_ref()));
    }
}
