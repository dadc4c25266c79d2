//! Parses `repository-config.json` into a [`bb_repo::RepositoryConfig`].
//!
//! Discovering *which* file to read is this crate's job (§12); the shape
//! mirrors `RepositoryConfig` itself: a map of repository name to its four
//! roots, name bindings, and file-name conventions. A root is either a
//! plain filesystem directory or a content-fixed "absent" root known only
//! by its tree id — a Git-backed root additionally needs a concrete
//! `GitObjectStore`, which is a named collaborator seam (SPEC_FULL.md §14)
//! with no implementation in this workspace, so it is not accepted here.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use bb_execapi::{BackendDescription, DispatchList};
use bb_fileroot::FileRoot;
use bb_hash::HashFamily;
use bb_repo::{RepositoryConfig, RepositoryInfo};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct ConfigFile {
    repositories: BTreeMap<String, RepositoryEntry>,
    #[serde(default)]
    hash_family: Option<String>,
    #[serde(default = "default_root_repository")]
    root_repository: String,
    #[serde(default)]
    dispatch: Vec<DispatchEntry>,
}

#[derive(Debug, Deserialize)]
struct DispatchEntry {
    #[serde(default)]
    properties: BTreeMap<String, String>,
    endpoint: String,
}

fn default_root_repository() -> String {
    "main".to_string()
}

#[derive(Debug, Deserialize)]
struct RepositoryEntry {
    workspace_root: RootSpec,
    #[serde(default)]
    target_root: Option<RootSpec>,
    #[serde(default)]
    rule_root: Option<RootSpec>,
    #[serde(default)]
    expression_root: Option<RootSpec>,
    #[serde(default)]
    bindings: BTreeMap<String, String>,
    #[serde(default = "default_target_file_name")]
    target_file_name: String,
    #[serde(default = "default_rule_file_name")]
    rule_file_name: String,
    #[serde(default = "default_expression_file_name")]
    expression_file_name: String,
}

fn default_target_file_name() -> String {
    "TARGETS".to_string()
}

fn default_rule_file_name() -> String {
    "RULES".to_string()
}

fn default_expression_file_name() -> String {
    "EXPRESSIONS".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RootSpec {
    Fs { path: String },
    Absent { tree_id: String },
}

impl RootSpec {
    fn resolve(&self, workspace: &Path) -> FileRoot {
        match self {
            RootSpec::Fs { path } => FileRoot::from_directory(workspace.join(path)),
            RootSpec::Absent { tree_id } => FileRoot::absent(tree_id.clone()),
        }
    }
}

/// The parsed repository configuration plus the two values the rest of the
/// CLI needs alongside it: the hash family in effect and which repository
/// an unqualified `--target` resolves against.
pub struct LoadedConfig {
    pub repositories: RepositoryConfig,
    pub hash_family: HashFamily,
    pub root_repository: String,
    pub dispatch: DispatchList,
}

/// Reads and parses `path`, resolving any `fs` root relative to `workspace`.
pub fn load(path: &Path, workspace: &Path) -> Result<LoadedConfig> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read repository config {}", path.display()))?;
    let parsed: ConfigFile = serde_json::from_slice(&bytes)
        .with_context(|| format!("invalid repository config JSON in {}", path.display()))?;

    let hash_family = match parsed.hash_family.as_deref() {
        None | Some("git-sha1") => HashFamily::GitSha1,
        Some("plain-sha256") => HashFamily::PlainSha256,
        Some(other) => bail!("unknown hash_family {other:?} in {}", path.display()),
    };

    let mut config = RepositoryConfig::new();
    for (name, entry) in parsed.repositories {
        let workspace_root = entry.workspace_root.resolve(workspace);
        let target_root = entry.target_root.as_ref().map(|r| r.resolve(workspace)).unwrap_or_else(|| entry.workspace_root.resolve(workspace));
        let rule_root = entry.rule_root.as_ref().map(|r| r.resolve(workspace)).unwrap_or_else(|| entry.workspace_root.resolve(workspace));
        let expression_root = entry.expression_root.as_ref().map(|r| r.resolve(workspace)).unwrap_or_else(|| entry.workspace_root.resolve(workspace));
        config.insert(
            name,
            RepositoryInfo::new(
                workspace_root,
                target_root,
                rule_root,
                expression_root,
                entry.bindings,
                entry.target_file_name,
                entry.rule_file_name,
                entry.expression_file_name,
            ),
        );
    }
    let dispatch = DispatchList::new(
        parsed
            .dispatch
            .into_iter()
            .map(|entry| BackendDescription { properties: entry.properties, endpoint: entry.endpoint })
            .collect(),
    );

    Ok(LoadedConfig {
        repositories: config,
        hash_family,
        root_repository: parsed.root_repository,
        dispatch,
    })
}
