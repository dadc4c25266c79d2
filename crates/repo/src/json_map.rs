use std::sync::Arc;

use bb_asyncmap::{AsyncMapConsumer, ValueCreator};
use bb_fileroot::FileRoot;
use bb_model::ModuleName;
use serde_json::Value;

use crate::config::RepositoryConfig;
use crate::paths::{module_escapes, module_path};

/// §4.4 `JsonFileMap` template: key=`ModuleName` -> value=JSON object, read
/// from the file named `file_name_selector(repo)` under
/// `root_selector(repo)`. `mandatory=false` maps a missing file to an empty
/// object instead of failing.
pub fn json_file_map<R, F>(
    config: Arc<RepositoryConfig>,
    root_selector: R,
    file_name_selector: F,
    mandatory: bool,
    jobs: usize,
) -> Arc<AsyncMapConsumer<ModuleName, Value>>
where
    R: Fn(&RepositoryConfig, &str) -> Option<FileRoot> + Send + Sync + 'static,
    F: Fn(&RepositoryConfig, &str) -> Option<String> + Send + Sync + 'static,
{
    let value_creator: ValueCreator<ModuleName, Value> =
        Arc::new(move |_ts, setter, logger, _sub_caller, key| {
            if config.get(&key.repository).is_none() {
                logger(&format!("unknown repository {:?}", key.repository), true);
                return;
            }
            if module_escapes(&key.module) {
                logger(&format!("module {:?} escapes its repository", key.module), true);
                return;
            }
            let Some(root) = root_selector(&config, &key.repository) else {
                logger(&format!("unknown repository {:?}", key.repository), true);
                return;
            };
            let Some(file_name) = file_name_selector(&config, &key.repository) else {
                logger(&format!("unknown repository {:?}", key.repository), true);
                return;
            };
            let path = module_path(&key.module).join(&file_name);

            if !root.is_file(&path) {
                if mandatory {
                    logger(&format!("missing mandatory file {}", path.display()), true);
                } else {
                    setter(Value::Object(Default::default()));
                }
                return;
            }

            let Some(bytes) = root.read_file(&path) else {
                logger(&format!("failed to read {}", path.display()), true);
                return;
            };
            match serde_json::from_slice::<Value>(&bytes) {
                Ok(Value::Object(map)) => setter(Value::Object(map)),
                Ok(_) => logger(&format!("{} does not contain a JSON object", path.display()), true),
                Err(err) => logger(&format!("invalid JSON in {}: {err}", path.display()), true),
            }
        });
    AsyncMapConsumer::new(value_creator, jobs)
}

/// §4.4 `ExpressionFileMap`: mandatory, rooted at `expression_root`, named
/// by `expression_file_name`.
pub fn expression_file_map(config: Arc<RepositoryConfig>, jobs: usize) -> Arc<AsyncMapConsumer<ModuleName, Value>> {
    json_file_map(
        config,
        |c, repo| c.expression_root(repo).cloned(),
        |c, repo| c.get(repo).map(|r| r.expression_file_name.clone()),
        true,
        jobs,
    )
}

/// §4.4 `RuleFileMap`: mandatory, rooted at `rule_root`, named by
/// `rule_file_name`.
pub fn rule_file_map(config: Arc<RepositoryConfig>, jobs: usize) -> Arc<AsyncMapConsumer<ModuleName, Value>> {
    json_file_map(
        config,
        |c, repo| c.rule_root(repo).cloned(),
        |c, repo| c.get(repo).map(|r| r.rule_file_name.clone()),
        true,
        jobs,
    )
}

/// §4.4 `TargetsFileMap`: mandatory, rooted at `target_root`, named by
/// `target_file_name`.
pub fn targets_file_map(config: Arc<RepositoryConfig>, jobs: usize) -> Arc<AsyncMapConsumer<ModuleName, Value>> {
    json_file_map(
        config,
        |c, repo| c.target_root(repo).cloned(),
        |c, repo| c.get(repo).map(|r| r.target_file_name.clone()),
        true,
        jobs,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RepositoryInfo;
    use bb_task::TaskSystem;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    fn config_with_fs_repo(root: &std::path::Path) -> Arc<RepositoryConfig> {
        let mut config = RepositoryConfig::new();
        config.insert(
            "main",
            RepositoryInfo::new(
                FileRoot::from_directory(root),
                FileRoot::from_directory(root),
                FileRoot::from_directory(root),
                FileRoot::from_directory(root),
                BTreeMap::new(),
                "TARGETS",
                "RULES",
                "EXPRESSIONS",
            ),
        );
        Arc::new(config)
    }

    #[test]
    fn reads_and_parses_a_present_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("TARGETS"), br#"{"foo": {"type": "generic"}}"#).unwrap();
        let config = config_with_fs_repo(dir.path());
        let map = targets_file_map(config, 2);
        let ts = Arc::new(TaskSystem::with_threads(2));
        let result = Arc::new(Mutex::new(None));
        let result2 = Arc::clone(&result);

        map.consume_after_keys_ready(
            &ts,
            vec![ModuleName::new("main", ".")],
            Box::new(move |values| *result2.lock().unwrap() = Some((*values[0]).clone())),
            Arc::new(|_msg: &str, _fatal: bool| {}),
            None,
        );
        ts.finish();

        let value = result.lock().unwrap().take().unwrap();
        assert!(value.get("foo").is_some());
    }

    #[test]
    fn missing_non_mandatory_file_is_an_empty_object() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_with_fs_repo(dir.path());
        // `expression_file_map`/`rule_file_map`/`targets_file_map` are all
        // hard-coded `mandatory=true` (§4.4); exercise the `mandatory=false`
        // branch directly through the shared template instead.
        let map = json_file_map(
            config,
            |c, repo| c.expression_root(repo).cloned(),
            |c, repo| c.get(repo).map(|r| r.expression_file_name.clone()),
            false,
            2,
        );
        let ts = Arc::new(TaskSystem::with_threads(2));
        let result = Arc::new(Mutex::new(None));
        let result2 = Arc::clone(&result);

        map.consume_after_keys_ready(
            &ts,
            vec![ModuleName::new("main", ".")],
            Box::new(move |values| *result2.lock().unwrap() = Some((*values[0]).clone())),
            Arc::new(|_msg: &str, _fatal: bool| {}),
            None,
        );
        ts.finish();
        assert_eq!(result.lock().unwrap().take(), Some(Value::Object(Default::default())));
    }

    #[test]
    fn missing_mandatory_file_fails_fatally() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_with_fs_repo(dir.path());
        let map = targets_file_map(config, 2);
        let ts = Arc::new(TaskSystem::with_threads(2));
        let failed = Arc::new(Mutex::new(false));
        let failed2 = Arc::clone(&failed);

        map.consume_after_keys_ready(
            &ts,
            vec![ModuleName::new("main", ".")],
            Box::new(|_values| panic!("consumer must not run")),
            Arc::new(|_msg: &str, _fatal: bool| {}),
            Some(Arc::new(move || *failed2.lock().unwrap() = true)),
        );
        ts.finish();
        assert!(*failed.lock().unwrap());
    }
}
