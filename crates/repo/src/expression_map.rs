use std::collections::HashMap;
use std::sync::Arc;

use bb_asyncmap::{AsyncMapConsumer, Logger, ValueCreator};
use bb_model::{parse_expression, Configuration, EntityName, Expression, ExpressionEnv, ParseContext};
use serde_json::Value;

use crate::config::RepositoryConfig;

/// §4.4 `ExpressionFunctionMap`: key=`EntityName` -> value=`ExpressionFunction`.
/// Reads the expression file for the key's module, looks up `name`, and
/// resolves mutual recursion across functions by sub-calling back into this
/// same map for every `Name` reference the raw body contains before
/// evaluating it.
pub fn expression_function_map(
    config: Arc<RepositoryConfig>,
    expr_file_map: Arc<AsyncMapConsumer<bb_model::ModuleName, Value>>,
    jobs: usize,
) -> Arc<AsyncMapConsumer<EntityName, Expression>> {
    let value_creator: ValueCreator<EntityName, Expression> =
        Arc::new(move |ts, setter, logger, sub_caller, key| {
            let Some(mapping) = config.name_mapping(&key.repository) else {
                logger(&format!("unknown repository {:?}", key.repository), true);
                return;
            };
            let mapping: HashMap<String, String> = mapping.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
            let module_key = key.module_name();

            let forward_logger: Logger = {
                let logger = Arc::clone(&logger);
                Arc::new(move |msg: &str, _fatal: bool| logger(msg, true))
            };

            let key_for_lookup = key.clone();
            let setter2 = Arc::clone(&setter);
            let logger2 = Arc::clone(&logger);
            let sub_caller2 = Arc::clone(&sub_caller);
            expr_file_map.consume_after_keys_ready(
                &ts,
                vec![module_key],
                Box::new(move |values| {
                    let file = &*values[0];
                    let Some(raw) = file.get(&key_for_lookup.name) else {
                        logger2(&format!("no expression named {:?} in its module", key_for_lookup.name), true);
                        return;
                    };
                    let ctx = ParseContext {
                        current_repository: &key_for_lookup.repository,
                        current_module: &key_for_lookup.module,
                        name_mapping: &mapping,
                    };
                    let Some(body) = parse_expression(raw, &ctx) else {
                        logger2(&format!("malformed expression body for {:?}", key_for_lookup.name), true);
                        return;
                    };

                    let mut referenced = Vec::new();
                    collect_referenced_names(&body, &mut referenced);
                    referenced.sort_by(|a, b| format!("{a:?}").cmp(&format!("{b:?}")));
                    referenced.dedup();

                    let body_for_eval = body.clone();
                    let referenced_for_eval = referenced.clone();
                    sub_caller2(
                        referenced,
                        Box::new(move |values| {
                            let mut env = ExpressionEnv::new();
                            for (name, value) in referenced_for_eval.into_iter().zip(values.into_iter()) {
                                env = env.with_function(name, (*value).clone());
                            }
                            match body_for_eval.evaluate(&Configuration::new(), &env) {
                                Some(result) => setter2(result),
                                None => logger2("expression evaluated to undefined", true),
                            }
                        }),
                        logger2,
                    );
                }),
                forward_logger,
                None,
            );
        });
    AsyncMapConsumer::new(value_creator, jobs)
}

/// Walks an expression tree collecting every `Name` it references, without
/// recursing into the referenced function's own (not-yet-fetched) body.
fn collect_referenced_names(expr: &Expression, out: &mut Vec<EntityName>) {
    match expr {
        Expression::Name(name) => out.push(name.clone()),
        Expression::List(items) => items.iter().for_each(|e| collect_referenced_names(e, out)),
        Expression::Map(entries) => entries.values().for_each(|e| collect_referenced_names(e, out)),
        Expression::Result(inner) => collect_referenced_names(inner, out),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::json_map::expression_file_map;
    use bb_fileroot::FileRoot;
    use bb_model::ModuleName;
    use bb_task::TaskSystem;
    use std::collections::BTreeMap;
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

    #[test]
    fn mutually_recursive_functions_resolve_through_sub_caller() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("EXPRESSIONS"),
            br#"{"is_even": ["CALL", "is_even_base"], "is_even_base": true}"#,
        )
        .unwrap();
        let config = config_with_fs_repo(dir.path());
        let expr_files = expression_file_map(Arc::clone(&config), 2);
        let map = expression_function_map(config, expr_files, 2);
        let ts = Arc::new(TaskSystem::with_threads(2));
        let result = Arc::new(Mutex::new(None));
        let result2 = Arc::clone(&result);

        let name = EntityName {
            repository: "main".into(),
            module: ".".into(),
            name: "is_even".into(),
            reference_type: bb_model::ReferenceType::NamedTarget,
        };
        map.consume_after_keys_ready(
            &ts,
            vec![name],
            Box::new(move |values| *result2.lock().unwrap() = Some((*values[0]).clone())),
            Arc::new(|_msg: &str, _fatal: bool| {}),
            None,
        );
        ts.finish();

        assert_eq!(result.lock().unwrap().take(), Some(Expression::Bool(true)));
    }

    #[test]
    fn missing_function_name_fails_fatally() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("EXPRESSIONS"), br#"{}"#).unwrap();
        let config = config_with_fs_repo(dir.path());
        let expr_files = expression_file_map(Arc::clone(&config), 2);
        let map = expression_function_map(config, expr_files, 2);
        let ts = Arc::new(TaskSystem::with_threads(2));
        let failed = Arc::new(Mutex::new(false));
        let failed2 = Arc::clone(&failed);

        let name = EntityName {
            repository: "main".into(),
            module: ".".into(),
            name: "missing".into(),
            reference_type: bb_model::ReferenceType::NamedTarget,
        };
        map.consume_after_keys_ready(
            &ts,
            vec![name],
            Box::new(|_values| panic!("consumer must not run")),
            Arc::new(|_msg: &str, _fatal: bool| {}),
            Some(Arc::new(move || *failed2.lock().unwrap() = true)),
        );
        ts.finish();
        assert!(*failed.lock().unwrap());
    }

    #[test]
    fn unused_module_name_import_is_not_a_compile_error() {
        let _ = ModuleName::new("main", ".");
    }
}
