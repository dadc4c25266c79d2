use std::collections::HashMap;
use std::sync::Arc;

use bb_asyncmap::{AsyncMapConsumer, Logger, ValueCreator};
use bb_hash::HashFamily;
use bb_model::{AnalysedTarget, Configuration, EntityName, ModuleName, ParseContext};
use serde_json::Value;

use bb_repo::RepositoryConfig;

use crate::builtins;
use crate::error::TargetsError;
use crate::result_map::ResultTargetMap;

/// A target is analysed once per `(entity, configuration)` pair (§4.6):
/// the same entity can be visited through different configuration
/// transitions and must be re-evaluated, and re-cached, for each one.
pub type TargetKey = (EntityName, Configuration);

/// §4.6 `TargetMap`: the core analysis map. An entity absent from its
/// module's targets file falls back to the source-target map (§4.5);
/// present entries are dispatched to a built-in rule by `"type"`, which
/// recurses back into this same map (via `sub_caller`) to resolve its own
/// target-valued fields under whatever configuration its `config_transitions`
/// (here, each built-in's own fixed transition) produce.
pub fn target_map(
    config: Arc<RepositoryConfig>,
    targets_file_map: Arc<AsyncMapConsumer<ModuleName, Value>>,
    source_targets: Arc<AsyncMapConsumer<EntityName, AnalysedTarget>>,
    results: Arc<ResultTargetMap>,
    hash_family: HashFamily,
    jobs: usize,
) -> Arc<AsyncMapConsumer<TargetKey, AnalysedTarget>> {
    let value_creator: ValueCreator<TargetKey, AnalysedTarget> =
        Arc::new(move |ts, setter, logger, sub_caller, key| {
            let (entity, own_config) = key;
            let Some(mapping) = config.name_mapping(&entity.repository) else {
                logger(&format!("unknown repository {:?}", entity.repository), true);
                return;
            };
            let mapping: HashMap<String, String> = mapping.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
            let module_key = entity.module_name();

            let entity_for_lookup = entity.clone();
            let own_config_for_dispatch = own_config.clone();
            let setter2 = Arc::clone(&setter);
            let logger2 = Arc::clone(&logger);
            let logger_for_dep = Arc::clone(&logger);
            let sub_caller2 = Arc::clone(&sub_caller);
            let results2 = Arc::clone(&results);
            let source_targets = Arc::clone(&source_targets);
            let ts2 = Arc::clone(&ts);

            targets_file_map.consume_after_keys_ready(
                &ts,
                vec![module_key],
                Box::new(move |values| {
                    let file = &*values[0];
                    let Some(raw) = file.get(&entity_for_lookup.name) else {
                        fall_back_to_source_target(
                            &source_targets,
                            &ts2,
                            entity_for_lookup,
                            setter2,
                            logger2,
                        );
                        return;
                    };
                    let Some(entry) = raw.as_object() else {
                        logger2(&TargetsError::MalformedEntry(entity_for_lookup.name.clone()).to_string(), true);
                        return;
                    };
                    let Some(rule_type) = entry.get("type").and_then(Value::as_str) else {
                        logger2(&TargetsError::MissingType(entity_for_lookup.name.clone()).to_string(), true);
                        return;
                    };

                    let ctx = ParseContext {
                        current_repository: &entity_for_lookup.repository,
                        current_module: &entity_for_lookup.module,
                        name_mapping: &mapping,
                    };
                    builtins::dispatch(
                        rule_type,
                        entry,
                        &entity_for_lookup,
                        &own_config_for_dispatch,
                        &ctx,
                        sub_caller2,
                        setter2,
                        logger2,
                        results2,
                        hash_family,
                    );
                }),
                logger_for_dep,
                None,
            );
        });
    AsyncMapConsumer::new(value_creator, jobs)
}

fn fall_back_to_source_target(
    source_targets: &Arc<AsyncMapConsumer<EntityName, AnalysedTarget>>,
    ts: &Arc<bb_task::TaskSystem>,
    entity: EntityName,
    setter: Arc<dyn Fn(AnalysedTarget) + Send + Sync>,
    logger: Logger,
) {
    source_targets.consume_after_keys_ready(
        ts,
        vec![entity],
        Box::new(move |values| setter((*values[0]).clone())),
        logger,
        None,
    );
}
