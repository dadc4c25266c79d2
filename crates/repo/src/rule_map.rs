use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use bb_asyncmap::{AsyncMapConsumer, ValueCreator};
use bb_model::{parse_entity_name, parse_expression, EntityName, ParseContext, UserRule};
use serde_json::Value;

use crate::config::RepositoryConfig;

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

/// §4.6 `RuleMap`: key=`EntityName` -> value=`UserRule`. Reads the rule
/// description for `name` out of its module's rule file and parses its
/// fields and expressions; dependency-target resolution (the rule's own
/// recursive self-call for `§4.6`'s target-map evaluation) is `bb-targets`'
/// concern, not this map's — this map only produces the rule's static shape.
pub fn rule_map(
    config: Arc<RepositoryConfig>,
    rule_file_map: Arc<AsyncMapConsumer<bb_model::ModuleName, Value>>,
    jobs: usize,
) -> Arc<AsyncMapConsumer<EntityName, UserRule>> {
    let value_creator: ValueCreator<EntityName, UserRule> =
        Arc::new(move |ts, setter, logger, _sub_caller, key| {
            let Some(mapping) = config.name_mapping(&key.repository) else {
                logger(&format!("unknown repository {:?}", key.repository), true);
                return;
            };
            let mapping: HashMap<String, String> = mapping.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
            let module_key = key.module_name();

            let key_for_lookup = key.clone();
            let setter2 = Arc::clone(&setter);
            let logger2 = Arc::clone(&logger);
            let logger_for_dep = Arc::clone(&logger);
            rule_file_map.consume_after_keys_ready(
                &ts,
                vec![module_key],
                Box::new(move |values| {
                    let file = &*values[0];
                    let Some(raw) = file.get(&key_for_lookup.name) else {
                        logger2(&format!("no rule named {:?} in its module", key_for_lookup.name), true);
                        return;
                    };
                    let Some(obj) = raw.as_object() else {
                        logger2(&format!("rule {:?} is not a JSON object", key_for_lookup.name), true);
                        return;
                    };

                    let ctx = ParseContext {
                        current_repository: &key_for_lookup.repository,
                        current_module: &key_for_lookup.module,
                        name_mapping: &mapping,
                    };

                    let string_fields = string_list(obj.get("string_fields"));
                    let target_fields = string_list(obj.get("target_fields"));
                    let config_fields = string_list(obj.get("config_fields"));
                    let config_vars = string_list(obj.get("config_vars"));

                    let mut implicit_fields: BTreeMap<String, Vec<EntityName>> = BTreeMap::new();
                    if let Some(Value::Object(implicit)) = obj.get("implicit_fields") {
                        for (field, deps) in implicit {
                            let Some(deps) = deps.as_array() else {
                                logger2(&format!("implicit field {field:?} is not a list"), true);
                                return;
                            };
                            let mut resolved = Vec::with_capacity(deps.len());
                            for dep in deps {
                                match parse_entity_name(dep, &ctx) {
                                    Some(name) => resolved.push(name),
                                    None => {
                                        logger2(&format!("malformed entity name in implicit field {field:?}"), true);
                                        return;
                                    }
                                }
                            }
                            implicit_fields.insert(field.clone(), resolved);
                        }
                    }

                    let mut config_transitions = BTreeMap::new();
                    if let Some(Value::Object(transitions)) = obj.get("config_transitions") {
                        for (field, expr) in transitions {
                            match parse_expression(expr, &ctx) {
                                Some(parsed) => {
                                    config_transitions.insert(field.clone(), parsed);
                                }
                                None => {
                                    logger2(&format!("malformed config_transitions expression for {field:?}"), true);
                                    return;
                                }
                            }
                        }
                    }

                    let mut anonymous_declarations = BTreeMap::new();
                    if let Some(Value::Object(anon)) = obj.get("anonymous_declarations") {
                        for (name, expr) in anon {
                            match parse_expression(expr, &ctx) {
                                Some(parsed) => {
                                    anonymous_declarations.insert(name.clone(), parsed);
                                }
                                None => {
                                    logger2(&format!("malformed anonymous declaration {name:?}"), true);
                                    return;
                                }
                            }
                        }
                    }

                    let Some(expression_json) = obj.get("expression") else {
                        logger2(&format!("rule {:?} has no expression body", key_for_lookup.name), true);
                        return;
                    };
                    let Some(expression) = parse_expression(expression_json, &ctx) else {
                        logger2(&format!("malformed expression body for rule {:?}", key_for_lookup.name), true);
                        return;
                    };

                    let rule = UserRule {
                        string_fields,
                        target_fields,
                        config_fields,
                        implicit_fields,
                        config_vars,
                        config_transitions,
                        expression,
                        anonymous_declarations,
                    };
                    match rule.validate() {
                        Ok(()) => setter2(rule),
                        Err(err) => logger2(&format!("rule {:?} failed validation: {err}", key_for_lookup.name), true),
                    }
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
    use crate::json_map::rule_file_map;
    use bb_fileroot::FileRoot;
    use bb_model::ReferenceType;
    use bb_task::TaskSystem;
    use std::sync::Mutex;

    fn config_with_fs_repo(root: &std::path::Path) -> Arc<RepositoryConfig> {
        let mut config = RepositoryConfig::new();
        config.insert(
            "main",
            crate::config::RepositoryInfo::new(
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
            reference_type: ReferenceType::NamedTarget,
        }
    }

    #[test]
    fn parses_and_validates_a_rule_description() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("RULES"),
            br#"{
                "generic": {
                    "string_fields": ["name"],
                    "target_fields": ["deps"],
                    "config_fields": [],
                    "config_vars": [],
                    "config_transitions": {},
                    "expression": true
                }
            }"#,
        )
        .unwrap();
        let config = config_with_fs_repo(dir.path());
        let rule_files = rule_file_map(Arc::clone(&config), 2);
        let map = rule_map(config, rule_files, 2);
        let ts = Arc::new(TaskSystem::with_threads(2));
        let result = Arc::new(Mutex::new(None));
        let result2 = Arc::clone(&result);

        map.consume_after_keys_ready(
            &ts,
            vec![name("generic")],
            Box::new(move |values| *result2.lock().unwrap() = Some((*values[0]).clone())),
            Arc::new(|_msg: &str, _fatal: bool| {}),
            None,
        );
        ts.finish();

        let rule = result.lock().unwrap().take().unwrap();
        assert_eq!(rule.string_fields, vec!["name".to_string()]);
        assert_eq!(rule.target_fields, vec!["deps".to_string()]);
    }

    #[test]
    fn invalid_config_transition_field_fails_fatally() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("RULES"),
            br#"{
                "broken": {
                    "string_fields": ["name"],
                    "target_fields": [],
                    "config_fields": [],
                    "config_transitions": {"nonexistent": true},
                    "expression": true
                }
            }"#,
        )
        .unwrap();
        let config = config_with_fs_repo(dir.path());
        let rule_files = rule_file_map(Arc::clone(&config), 2);
        let map = rule_map(config, rule_files, 2);
        let ts = Arc::new(TaskSystem::with_threads(2));
        let failed = Arc::new(Mutex::new(false));
        let failed2 = Arc::clone(&failed);

        map.consume_after_keys_ready(
            &ts,
            vec![name("broken")],
            Box::new(|_values| panic!("consumer must not run")),
            Arc::new(|_msg: &str, _fatal: bool| {}),
            Some(Arc::new(move || *failed2.lock().unwrap() = true)),
        );
        ts.finish();
        assert!(*failed.lock().unwrap());
    }

    #[test]
    fn missing_rule_name_fails_fatally() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("RULES"), br#"{}"#).unwrap();
        let config = config_with_fs_repo(dir.path());
        let rule_files = rule_file_map(Arc::clone(&config), 2);
        let map = rule_map(config, rule_files, 2);
        let ts = Arc::new(TaskSystem::with_threads(2));
        let failed = Arc::new(Mutex::new(false));
        let failed2 = Arc::clone(&failed);

        map.consume_after_keys_ready(
            &ts,
            vec![name("missing")],
            Box::new(|_values| panic!("consumer must not run")),
            Arc::new(|_msg: &str, _fatal: bool| {}),
            Some(Arc::new(move || *failed2.lock().unwrap() = true)),
        );
        ts.finish();
        assert!(*failed.lock().unwrap());
    }
}
