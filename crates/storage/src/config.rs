use std::path::{Path, PathBuf};

use bb_hash::HashFamily;

/// Which of the three sharded trees an object belongs to (§4.8). Matches
/// the directory names `cas_f`/`cas_x`/`cas_t`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CasKind {
    File,
    Executable,
    Tree,
}

impl CasKind {
    fn dir_name(self) -> &'static str {
        match self {
            CasKind::File => "cas_f",
            CasKind::Executable => "cas_x",
            CasKind::Tree => "cas_t",
        }
    }
}

/// Layout and generation count for a local build root (§4.8, §6.4). `root`
/// holds `gen-0 .. gen-{generations-1}` subdirectories, a `tree-structure`
/// sub-cache, and a `git-odb` directory for content-fixed repository roots.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    root: PathBuf,
    hash_family: HashFamily,
    generations: usize,
}

impl StorageConfig {
    pub fn new(root: impl Into<PathBuf>, hash_family: HashFamily, generations: usize) -> Self {
        assert!(generations >= 1, "a storage config needs at least one generation");
        Self {
            root: root.into(),
            hash_family,
            generations,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn hash_family(&self) -> HashFamily {
        self.hash_family
    }

    pub fn generations(&self) -> usize {
        self.generations
    }

    pub fn generation_dir(&self, physical_index: usize) -> PathBuf {
        self.root.join(format!("gen-{physical_index}"))
    }

    pub fn tree_structure_dir(&self) -> PathBuf {
        self.root.join("tree-structure")
    }

    pub fn git_odb_dir(&self) -> PathBuf {
        self.root.join("git-odb")
    }

    /// Shard directory + file name for `hex_hash` within a given generation
    /// and kind: `gen-N/cas_f/<hash[0:2]>/<hash[2:]>`.
    pub fn object_path(&self, physical_index: usize, kind: CasKind, hex_hash: &str) -> PathBuf {
        let (prefix, rest) = hex_hash.split_at(2.min(hex_hash.len()));
        self.generation_dir(physical_index)
            .join(kind.dir_name())
            .join(prefix)
            .join(rest)
    }
}
