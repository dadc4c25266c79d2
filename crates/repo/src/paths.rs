use std::path::PathBuf;

/// Workspace-relative module path; `.` denotes the repository root.
pub fn module_path(module: &str) -> PathBuf {
    if module == "." {
        PathBuf::new()
    } else {
        PathBuf::from(module)
    }
}

/// A module name escapes its repository if absolute or if it climbs above
/// the root (§4.4 `JsonFileMap`: "Rejects modules escaping the repo
/// (absolute path, or starts with `..`)").
pub fn module_escapes(module: &str) -> bool {
    module.starts_with('/') || module == ".." || module.starts_with("../") || module.contains("/../")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_module_is_the_empty_path() {
        assert_eq!(module_path("."), PathBuf::new());
    }

    #[test]
    fn absolute_and_upward_modules_are_rejected() {
        assert!(module_escapes("/etc"));
        assert!(module_escapes(".."));
        assert!(module_escapes("../sibling"));
        assert!(module_escapes("a/../../b"));
        assert!(!module_escapes("a/b"));
        assert!(!module_escapes("."));
    }
}
