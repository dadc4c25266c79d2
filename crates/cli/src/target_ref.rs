//! Parses a `--target` flag value into an [`bb_model::EntityName`] (§6.2).
//!
//! Three forms, chosen to read like a familiar build-tool label while
//! reusing `bb_model::parse_entity_name`'s own grammar underneath:
//!   - `name`              -> current repository, current module (`.`)
//!   - `module:name`       -> current repository, explicit module
//!   - `@repo//module:name` -> explicit local repository binding

use std::collections::HashMap;

use anyhow::{anyhow, Result};
use bb_model::{parse_entity_name, EntityName, ParseContext};
use serde_json::json;

pub fn parse(raw: &str, current_repository: &str, name_mapping: &HashMap<String, String>) -> Result<EntityName> {
    let ctx = ParseContext {
        current_repository,
        current_module: ".",
        name_mapping,
    };

    let value = if let Some(rest) = raw.strip_prefix('@') {
        let (repo, tail) = rest
            .split_once("//")
            .ok_or_else(|| anyhow!("malformed target {raw:?}: expected @repo//module:name"))?;
        let (module, name) = tail
            .split_once(':')
            .ok_or_else(|| anyhow!("malformed target {raw:?}: expected @repo//module:name"))?;
        json!(["@", repo, module, name])
    } else if let Some((module, name)) = raw.split_once(':') {
        json!([module, name])
    } else {
        json!(raw)
    };

    parse_entity_name(&value, &ctx).ok_or_else(|| anyhow!("could not parse target {raw:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_name_resolves_to_the_workspace_root_module() {
        let mapping = HashMap::new();
        let entity = parse("foo", "main", &mapping).unwrap();
        assert_eq!(entity.repository, "main");
        assert_eq!(entity.module, ".");
        assert_eq!(entity.name, "foo");
    }

    #[test]
    fn module_and_name_split_on_colon() {
        let mapping = HashMap::new();
        let entity = parse("src/lib:foo", "main", &mapping).unwrap();
        assert_eq!(entity.module, "src/lib");
        assert_eq!(entity.name, "foo");
    }

    #[test]
    fn cross_repository_label_resolves_through_bindings() {
        let mut mapping = HashMap::new();
        mapping.insert("dep".to_string(), "other".to_string());
        let entity = parse("@dep//src:foo", "main", &mapping).unwrap();
        assert_eq!(entity.repository, "other");
        assert_eq!(entity.module, "src");
        assert_eq!(entity.name, "foo");
    }

    #[test]
    fn unbound_repository_binding_is_rejected() {
        let mapping = HashMap::new();
        assert!(parse("@dep//src:foo", "main", &mapping).is_err());
    }
}
