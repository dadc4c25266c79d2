use std::path::Path;
use std::sync::Arc;

use bb_asyncmap::{AsyncMapConsumer, ValueCreator};
use bb_fileroot::{lookup_entry_by_path, DirectoryEntries, FileRoot};
use bb_hash::{ArtifactDigest, HashFamily};
use bb_model::{AnalysedTarget, ArtifactDescription, EntityName, ModuleName, ObjectType};

use bb_repo::RepositoryConfig;

fn entity_path(key: &EntityName) -> String {
    if key.module == "." {
        key.name.clone()
    } else {
        format!("{}/{}", key.module, key.name)
    }
}

/// §4.5 source-target map: key=`EntityName` -> value=`AnalysedTarget`. An
/// entity that names an existing file/symlink/tree entry in its module
/// becomes a single-artifact target; a non-existent entry is fatal.
pub fn source_target_map(
    config: Arc<RepositoryConfig>,
    dir_entries: Arc<AsyncMapConsumer<ModuleName, DirectoryEntries>>,
    jobs: usize,
) -> Arc<AsyncMapConsumer<EntityName, AnalysedTarget>> {
    let value_creator: ValueCreator<EntityName, AnalysedTarget> =
        Arc::new(move |ts, setter, logger, _sub_caller, key| {
            let Some(root) = config.workspace_root(&key.repository).cloned() else {
                logger(&format!("unknown repository {:?}", key.repository), true);
                return;
            };
            let module_key = key.module_name();
            let key2 = key.clone();
            let setter2 = Arc::clone(&setter);
            let logger2 = Arc::clone(&logger);
            let logger_for_dep = Arc::clone(&logger);
            dir_entries.consume_after_keys_ready(
                &ts,
                vec![module_key],
                Box::new(move |values| {
                    let entries = &*values[0];
                    let Some(object_type) = entries.get(&key2.name) else {
                        logger2(
                            &format!("no entry named {:?} in module {:?} of repository {:?}", key2.name, key2.module, key2.repository),
                            true,
                        );
                        return;
                    };

                    let path = entity_path(&key2);
                    let artifact = match &root {
                        FileRoot::Fs(_) => ArtifactDescription::Local {
                            repository: key2.repository.clone(),
                            path,
                        },
                        FileRoot::Absent { .. } => {
                            logger2(&format!("repository {:?} has no available workspace root", key2.repository), true);
                            return;
                        }
                        FileRoot::Git { store, tree } => {
                            if object_type == ObjectType::Tree {
                                match lookup_entry_by_path(store.as_ref(), tree, &path) {
                                    Some((ObjectType::Tree, tree_id)) => ArtifactDescription::Tree { tree_id },
                                    _ => {
                                        logger2(&format!("{path:?} is no longer a tree in its git root"), true);
                                        return;
                                    }
                                }
                            } else {
                                let Some(bytes) = root.read_file(Path::new(&path)) else {
                                    logger2(&format!("failed to read {path:?} from its git root"), true);
                                    return;
                                };
                                let digest = ArtifactDigest::hash_data_as(HashFamily::GitSha1, &bytes, false);
                                ArtifactDescription::Known { digest, object_type }
                            }
                        }
                    };

                    let mut target = AnalysedTarget::new();
                    target.artifacts.insert(key2.name.clone(), artifact);
                    setter2(target);
                }),
                logger_for_dep,
                None,
            );
        });
    AsyncMapConsumer::new(value_creator, jobs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bb_model::ReferenceType;
    use bb_repo::{directory_entries_map, RepositoryInfo};
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

    fn name(n: &str) -> EntityName {
        EntityName {
            repository: "main".into(),
            module: ".".into(),
            name: n.into(),
            reference_type: ReferenceType::File,
        }
    }

    #[test]
    fn existing_file_becomes_a_local_artifact() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"hi").unwrap();
        let config = config_with_fs_repo(dir.path());
        let entries = directory_entries_map(Arc::clone(&config), 2);
        let map = source_target_map(config, entries, 2);
        let ts = Arc::new(TaskSystem::with_threads(2));
        let result = Arc::new(Mutex::new(None));
        let result2 = Arc::clone(&result);

        map.consume_after_keys_ready(
            &ts,
            vec![name("a.txt")],
            Box::new(move |values| *result2.lock().unwrap() = Some((*values[0]).clone())),
            Arc::new(|_msg: &str, _fatal: bool| {}),
            None,
        );
        ts.finish();

        let target = result.lock().unwrap().take().unwrap();
        assert_eq!(
            target.artifacts.get("a.txt"),
            Some(&ArtifactDescription::Local {
                repository: "main".into(),
                path: "a.txt".into()
            })
        );
    }

    #[test]
    fn missing_entry_fails_fatally() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_with_fs_repo(dir.path());
        let entries = directory_entries_map(Arc::clone(&config), 2);
        let map = source_target_map(config, entries, 2);
        let ts = Arc::new(TaskSystem::with_threads(2));
        let failed = Arc::new(Mutex::new(false));
        let failed2 = Arc::clone(&failed);

        map.consume_after_keys_ready(
            &ts,
            vec![name("missing.txt")],
            Box::new(|_values| panic!("consumer must not run")),
            Arc::new(|_msg: &str, _fatal: bool| {}),
            Some(Arc::new(move || *failed2.lock().unwrap() = true)),
        );
        ts.finish();
        assert!(*failed.lock().unwrap());
    }
}
