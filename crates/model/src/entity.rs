use std::collections::HashMap;

use serde_json::Value;

/// §3 "Entity Name": a reference-type tag on top of (repository, module,
/// name). `NamedTarget` is the default produced by the bare-string and
/// `[mod, name]`/`["./", ...]`/`["@", ...]` forms; the rest come from the
/// `FILE`/`TREE`/`GLOB`/`SYMLINK` filesystem-reference forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceType {
    NamedTarget,
    File,
    Tree,
    Glob,
    Symlink,
}

/// (repository, module); hashable key for file-level maps (§3).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModuleName {
    pub repository: String,
    pub module: String,
}

impl ModuleName {
    pub fn new(repository: impl Into<String>, module: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            module: module.into(),
        }
    }
}

/// (repository, module, name, reference-type); §3 "Entity Name". Module is a
/// workspace-relative directory; `.` denotes root.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityName {
    pub repository: String,
    pub module: String,
    pub name: String,
    pub reference_type: ReferenceType,
}

impl EntityName {
    pub fn module_name(&self) -> ModuleName {
        ModuleName::new(self.repository.clone(), self.module.clone())
    }
}

/// Ambient state the entity-name grammar (§6.2) is parsed against.
pub struct ParseContext<'a> {
    pub current_repository: &'a str,
    pub current_module: &'a str,
    /// Local binding name -> global repository name, used by the `["@", ...]` form.
    pub name_mapping: &'a HashMap<String, String>,
}

/// Joins `current_module` with `submodule`, rejecting paths that would climb
/// above the workspace root. `.` denotes root; `submodule` may itself be a
/// multi-segment relative path but must not contain `..` segments that
/// escape above `.`.
fn join_module(current_module: &str, submodule: &str) -> Option<String> {
    let mut segments: Vec<&str> = if current_module == "." {
        Vec::new()
    } else {
        current_module.split('/').collect()
    };
    for seg in submodule.split('/') {
        match seg {
            "" | "." => continue,
            ".." => {
                if segments.pop().is_none() {
                    return None;
                }
            }
            other => segments.push(other),
        }
    }
    Some(if segments.is_empty() {
        ".".to_string()
    } else {
        segments.join("/")
    })
}

fn str_at(arr: &[Value], idx: usize) -> Option<&str> {
    arr.get(idx).and_then(Value::as_str)
}

/// Implements the §6.2 entity-name grammar. Returns `None` on any structural
/// deviation; the caller is expected to log a diagnostic in that case.
pub fn parse_entity_name(value: &Value, ctx: &ParseContext<'_>) -> Option<EntityName> {
    if let Some(name) = value.as_str() {
        return Some(EntityName {
            repository: ctx.current_repository.to_string(),
            module: ctx.current_module.to_string(),
            name: name.to_string(),
            reference_type: ReferenceType::NamedTarget,
        });
    }

    let arr = value.as_array()?;
    let tag = str_at(arr, 0)?;

    match tag {
        "./" => {
            if arr.len() != 3 {
                return None;
            }
            let submodule = str_at(arr, 1)?;
            let name = str_at(arr, 2)?;
            let module = join_module(ctx.current_module, submodule)?;
            Some(EntityName {
                repository: ctx.current_repository.to_string(),
                module,
                name: name.to_string(),
                reference_type: ReferenceType::NamedTarget,
            })
        }
        "@" => {
            if arr.len() != 4 {
                return None;
            }
            let local_repo = str_at(arr, 1)?;
            let module = str_at(arr, 2)?;
            let name = str_at(arr, 3)?;
            let global_repo = ctx.name_mapping.get(local_repo)?;
            Some(EntityName {
                repository: global_repo.clone(),
                module: module.to_string(),
                name: name.to_string(),
                reference_type: ReferenceType::NamedTarget,
            })
        }
        "FILE" | "TREE" | "GLOB" | "SYMLINK" => {
            if arr.len() != 3 {
                return None;
            }
            let module = match arr.get(1)? {
                Value::Null => ctx.current_module.to_string(),
                Value::String(s) if s == "." || s == ctx.current_module => s.clone(),
                _ => return None,
            };
            let name = str_at(arr, 2)?;
            let reference_type = match tag {
                "FILE" => ReferenceType::File,
                "TREE" => ReferenceType::Tree,
                "GLOB" => ReferenceType::Glob,
                "SYMLINK" => ReferenceType::Symlink,
                _ => unreachable!(),
            };
            Some(EntityName {
                repository: ctx.current_repository.to_string(),
                module,
                name: name.to_string(),
                reference_type,
            })
        }
        _ => {
            if arr.len() == 2 {
                let module = str_at(arr, 0)?;
                let name = str_at(arr, 1)?;
                Some(EntityName {
                    repository: ctx.current_repository.to_string(),
                    module: module.to_string(),
                    name: name.to_string(),
                    reference_type: ReferenceType::NamedTarget,
                })
            } else {
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx<'a>(mapping: &'a HashMap<String, String>) -> ParseContext<'a> {
        ParseContext {
            current_repository: "main",
            current_module: "src/lib",
            name_mapping: mapping,
        }
    }

    #[test]
    fn bare_string_is_current_module() {
        let mapping = HashMap::new();
        let entity = parse_entity_name(&json!("foo"), &ctx(&mapping)).unwrap();
        assert_eq!(entity.repository, "main");
        assert_eq!(entity.module, "src/lib");
        assert_eq!(entity.name, "foo");
        assert_eq!(entity.reference_type, ReferenceType::NamedTarget);
    }

    #[test]
    fn sibling_module_pair() {
        let mapping = HashMap::new();
        let entity = parse_entity_name(&json!(["other/mod", "foo"]), &ctx(&mapping)).unwrap();
        assert_eq!(entity.module, "other/mod");
        assert_eq!(entity.name, "foo");
    }

    #[test]
    fn relative_submodule_joins() {
        let mapping = HashMap::new();
        let entity = parse_entity_name(&json!(["./", "sub", "foo"]), &ctx(&mapping)).unwrap();
        assert_eq!(entity.module, "src/lib/sub");
    }

    #[test]
    fn relative_submodule_escaping_workspace_is_rejected() {
        let mapping = HashMap::new();
        assert!(parse_entity_name(&json!(["./", "../../../etc", "foo"]), &ctx(&mapping)).is_none());
    }

    #[test]
    fn repo_binding_resolves_through_name_mapping() {
        let mut mapping = HashMap::new();
        mapping.insert("dep".to_string(), "global-dep".to_string());
        let entity = parse_entity_name(&json!(["@", "dep", "some/mod", "foo"]), &ctx(&mapping)).unwrap();
        assert_eq!(entity.repository, "global-dep");
        assert_eq!(entity.module, "some/mod");
    }

    #[test]
    fn unbound_repo_binding_fails() {
        let mapping = HashMap::new();
        assert!(parse_entity_name(&json!(["@", "dep", "some/mod", "foo"]), &ctx(&mapping)).is_none());
    }

    #[test]
    fn file_reference_in_current_module() {
        let mapping = HashMap::new();
        let entity = parse_entity_name(&json!(["FILE", ".", "foo.txt"]), &ctx(&mapping)).unwrap();
        assert_eq!(entity.reference_type, ReferenceType::File);
        assert_eq!(entity.module, ".");
    }

    #[test]
    fn file_reference_with_mismatched_module_is_rejected() {
        let mapping = HashMap::new();
        assert!(parse_entity_name(&json!(["FILE", "other/mod", "foo.txt"]), &ctx(&mapping)).is_none());
    }

    #[test]
    fn tree_glob_symlink_reference_types() {
        let mapping = HashMap::new();
        assert_eq!(
            parse_entity_name(&json!(["TREE", null, "x"]), &ctx(&mapping)).unwrap().reference_type,
            ReferenceType::Tree
        );
        assert_eq!(
            parse_entity_name(&json!(["GLOB", null, "*.c"]), &ctx(&mapping)).unwrap().reference_type,
            ReferenceType::Glob
        );
        assert_eq!(
            parse_entity_name(&json!(["SYMLINK", null, "x"]), &ctx(&mapping)).unwrap().reference_type,
            ReferenceType::Symlink
        );
    }

    #[test]
    fn structurally_invalid_input_returns_none() {
        let mapping = HashMap::new();
        assert!(parse_entity_name(&json!(42), &ctx(&mapping)).is_none());
        assert!(parse_entity_name(&json!(["only-one"]), &ctx(&mapping)).is_none());
        assert!(parse_entity_name(&json!(["UNKNOWN", "a", "b"]), &ctx(&mapping)).is_none());
    }
}
