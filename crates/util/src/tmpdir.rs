use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// A scratch directory that is removed on drop, used by the executor when
/// assembling action input roots and by the CLI's `build`/`analyze`
/// commands for staging areas (§2 C12).
pub struct TmpDir {
    handle: TempDir,
}

impl TmpDir {
    pub fn new() -> std::io::Result<Self> {
        Ok(Self {
            handle: TempDir::new()?,
        })
    }

    pub fn new_in(parent: impl AsRef<Path>) -> std::io::Result<Self> {
        Ok(Self {
            handle: TempDir::new_in(parent)?,
        })
    }

    pub fn path(&self) -> &Path {
        self.handle.path()
    }

    /// Leaks the directory so it survives past this `TmpDir`'s drop,
    /// returning its path. Used when a caller hands the staged root off to
    /// a long-lived process (e.g. a `serve-local` execution API backend).
    pub fn keep(self) -> PathBuf {
        self.handle.into_path()
    }
}
