use std::sync::Arc;

use bb_asyncmap::{AsyncMapConsumer, ValueCreator};
use bb_fileroot::DirectoryEntries;
use bb_model::ModuleName;

use crate::config::RepositoryConfig;
use crate::paths::module_path;

/// §4.4 `DirectoryEntriesMap`: key=`ModuleName` -> value=`DirectoryEntries`.
/// An absent workspace root fails fatally (a caller must bind a real root
/// before analysis can proceed); a missing directory resolves to an empty
/// listing (that's `FileRoot::read_directory`'s own contract).
pub fn directory_entries_map(
    config: Arc<RepositoryConfig>,
    jobs: usize,
) -> Arc<AsyncMapConsumer<ModuleName, DirectoryEntries>> {
    let value_creator: ValueCreator<ModuleName, DirectoryEntries> =
        Arc::new(move |_ts, setter, logger, _sub_caller, key| {
            let Some(root) = config.workspace_root(&key.repository) else {
                logger(&format!("unknown repository {:?}", key.repository), true);
                return;
            };
            if root.is_absent() {
                logger(
                    &format!("repository {:?} has no available workspace root", key.repository),
                    true,
                );
                return;
            }
            let path = module_path(&key.module);
            setter(root.read_directory(&path));
        });
    AsyncMapConsumer::new(value_creator, jobs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bb_fileroot::FileRoot;
    use bb_task::TaskSystem;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    fn config_with_fs_repo(root: &std::path::Path) -> Arc<RepositoryConfig> {
        let mut config = RepositoryConfig::new();
        config.insert(
            "main",
            crate::config::RepositoryInfo::new(
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
    fn reads_directory_entries_for_a_known_module() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"hi").unwrap();
        let config = config_with_fs_repo(dir.path());
        let map = directory_entries_map(config, 2);
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

        let entries = result.lock().unwrap().take().unwrap();
        assert!(entries.contains_file("a.txt"));
    }

    #[test]
    fn unknown_repository_fails_fatally() {
        let config = Arc::new(RepositoryConfig::new());
        let map = directory_entries_map(config, 2);
        let ts = Arc::new(TaskSystem::with_threads(2));
        let failed = Arc::new(Mutex::new(false));
        let failed2 = Arc::clone(&failed);

        map.consume_after_keys_ready(
            &ts,
            vec![ModuleName::new("ghost", ".")],
            Box::new(|_values| panic!("consumer must not run")),
            Arc::new(|_msg: &str, _fatal: bool| {}),
            Some(Arc::new(move || *failed2.lock().unwrap() = true)),
        );
        ts.finish();
        assert!(*failed.lock().unwrap());
    }
}
