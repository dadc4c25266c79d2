use std::collections::BTreeMap;
use std::sync::Mutex;

use bb_hash::{HashFamily, HashInfo};
use bb_model::Action;
use serde_json::json;

/// §4.6 step 5: actions are addressed by the digest of their description, so
/// identical action descriptions coalesce into a single dependency-graph
/// node no matter how many configured-target analyses produce them
/// (scenario C, §8).
pub struct ResultTargetMap {
    hash_family: HashFamily,
    actions: Mutex<BTreeMap<String, Action>>,
}

impl ResultTargetMap {
    pub fn new(hash_family: HashFamily) -> Self {
        Self {
            hash_family,
            actions: Mutex::new(BTreeMap::new()),
        }
    }

    /// Computes `action`'s digest over everything but its `id`, assigns that
    /// digest as the id, and registers it if not already present. Returns
    /// the (possibly pre-existing) id.
    pub fn register(&self, mut action: Action) -> String {
        let canonical = json!({
            "command": action.command,
            "env": action.env,
            "inputs": action.inputs.iter().map(|(p, a)| (p.clone(), a.to_json())).collect::<BTreeMap<_, _>>(),
            "output_files": action.output_files,
            "output_dirs": action.output_dirs,
            "may_fail": action.may_fail,
            "no_cache": action.no_cache,
            "timeout_scale": action.timeout_scale,
            "execution_properties": action.execution_properties,
        });
        let bytes = serde_json::to_vec(&canonical).expect("action description always serializes");
        let id = HashInfo::hash_data(self.hash_family, &bytes, false).hash().to_string();
        action.id = id.clone();
        self.actions.lock().unwrap().entry(id.clone()).or_insert(action);
        id
    }

    pub fn action_count(&self) -> usize {
        self.actions.lock().unwrap().len()
    }

    pub fn get(&self, id: &str) -> Option<Action> {
        self.actions.lock().unwrap().get(id).cloned()
    }

    /// Every action registered so far, keyed by id. Used to seed the
    /// executor's dependency graph (C8) after analysis finishes.
    pub fn all(&self) -> BTreeMap<String, Action> {
        self.actions.lock().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap as Map;

    fn action(cmd: &str) -> Action {
        Action {
            id: String::new(),
            command: vec![cmd.to_string()],
            env: Map::new(),
            inputs: Map::new(),
            output_files: vec!["out".to_string()],
            output_dirs: vec![],
            may_fail: false,
            no_cache: false,
            timeout_scale: 1.0,
            execution_properties: Map::new(),
        }
    }

    #[test]
    fn identical_actions_coalesce() {
        let registry = ResultTargetMap::new(HashFamily::PlainSha256);
        let id1 = registry.register(action("echo hi"));
        let id2 = registry.register(action("echo hi"));
        assert_eq!(id1, id2);
        assert_eq!(registry.action_count(), 1);
    }

    #[test]
    fn differing_actions_do_not_coalesce() {
        let registry = ResultTargetMap::new(HashFamily::PlainSha256);
        registry.register(action("echo hi"));
        registry.register(action("echo bye"));
        assert_eq!(registry.action_count(), 2);
    }
}
