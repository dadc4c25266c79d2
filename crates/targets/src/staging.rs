use std::collections::BTreeMap;

use bb_model::ArtifactId;

/// §4.6 step 4: staging into a tree path that also appears as a tree output
/// is a fatal conflict (scenario D, §8) — e.g. staging `foo/bar` while a
/// sibling stages `foo` itself. A conflicting ancestor need not be a
/// lexicographic neighbour of its descendant (`"foo.txt"` sorts between
/// `"foo"` and `"foo/bar"` since `.` < `/`), so every proper path-component
/// ancestor of each staged path is looked up directly instead of only
/// comparing sorted neighbours.
pub fn detect_stage_conflict(staged: &BTreeMap<String, ArtifactId>) -> Option<String> {
    for path in staged.keys() {
        for (i, b) in path.bytes().enumerate() {
            if b == b'/' {
                let ancestor = &path[..i];
                if staged.contains_key(ancestor) {
                    return Some(ancestor.to_string());
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use bb_model::ArtifactDescription;

    fn local(path: &str) -> ArtifactId {
        ArtifactDescription::Local {
            repository: "main".into(),
            path: path.into(),
        }
    }

    #[test]
    fn nested_and_top_level_stage_at_the_same_path_conflicts() {
        let mut staged = BTreeMap::new();
        staged.insert("foo".to_string(), local("a"));
        staged.insert("foo/bar".to_string(), local("b"));
        assert_eq!(detect_stage_conflict(&staged), Some("foo".to_string()));
    }

    #[test]
    fn disjoint_paths_do_not_conflict() {
        let mut staged = BTreeMap::new();
        staged.insert("foo".to_string(), local("a"));
        staged.insert("foobar".to_string(), local("b"));
        assert_eq!(detect_stage_conflict(&staged), None);
    }

    #[test]
    fn conflict_hidden_behind_a_lexicographic_neighbour_is_still_found() {
        // Sorted order is ["foo", "foo.txt", "foo/bar"] since '.' (0x2e) <
        // '/' (0x2f), so the conflicting pair ("foo", "foo/bar") is not
        // adjacent in a `BTreeMap` iteration.
        let mut staged = BTreeMap::new();
        staged.insert("foo".to_string(), local("a"));
        staged.insert("foo.txt".to_string(), local("b"));
        staged.insert("foo/bar".to_string(), local("c"));
        assert_eq!(detect_stage_conflict(&staged), Some("foo".to_string()));
    }
}
