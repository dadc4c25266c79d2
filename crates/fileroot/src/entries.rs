use std::collections::BTreeMap;

use bb_model::ObjectType;

/// An opaque directory listing, stably ordered by name (§3 "File Root").
/// Enumerable as files-only or directories-only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryEntries {
    entries: BTreeMap<String, ObjectType>,
}

impl DirectoryEntries {
    pub fn new(entries: BTreeMap<String, ObjectType>) -> Self {
        Self { entries }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_file(&self, name: &str) -> bool {
        matches!(
            self.entries.get(name),
            Some(ObjectType::File) | Some(ObjectType::Executable)
        )
    }

    pub fn get(&self, name: &str) -> Option<ObjectType> {
        self.entries.get(name).copied()
    }

    pub fn files(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(|(_, t)| matches!(t, ObjectType::File | ObjectType::Executable))
            .map(|(name, _)| name.as_str())
    }

    pub fn directories(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(|(_, t)| matches!(t, ObjectType::Tree))
            .map(|(name, _)| name.as_str())
    }

    /// Every entry regardless of kind, in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, ObjectType)> {
        self.entries.iter().map(|(name, t)| (name.as_str(), *t))
    }
}
