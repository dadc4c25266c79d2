use std::collections::BTreeMap;
use std::sync::Arc;

use bb_asyncmap::{Consumer, Logger, Setter, SubCaller};
use bb_hash::{ArtifactDigest, HashFamily};
use bb_model::{
    parse_entity_name, parse_expression, validate_staged_symlink, Action, AnalysedTarget,
    ArtifactDescription, Configuration, EntityName, ExpressionEnv, ObjectType, ParseContext,
};
use serde_json::{Map, Value};

use crate::result_map::ResultTargetMap;
use crate::staging::detect_stage_conflict;
use crate::target_map::TargetKey;

fn string_field<'a>(entry: &'a Map<String, Value>, field: &str) -> Option<&'a str> {
    entry.get(field).and_then(Value::as_str)
}

fn string_list_field(entry: &Map<String, Value>, field: &str) -> Option<Vec<String>> {
    match entry.get(field) {
        None => Some(Vec::new()),
        Some(Value::Array(arr)) => arr.iter().map(|v| v.as_str().map(str::to_string)).collect(),
        Some(_) => None,
    }
}

fn entity_list_field(entry: &Map<String, Value>, field: &str, ctx: &ParseContext) -> Option<Vec<EntityName>> {
    match entry.get(field) {
        None => Some(Vec::new()),
        Some(Value::Array(arr)) => arr.iter().map(|v| parse_entity_name(v, ctx)).collect(),
        Some(_) => None,
    }
}

fn string_map_field(entry: &Map<String, Value>, field: &str) -> Option<BTreeMap<String, String>> {
    match entry.get(field) {
        None => Some(BTreeMap::new()),
        Some(Value::Object(map)) => map
            .iter()
            .map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
            .collect(),
        Some(_) => None,
    }
}

fn flatten_staged(deps: &[Arc<AnalysedTarget>]) -> BTreeMap<String, ArtifactDescription> {
    let mut staged = BTreeMap::new();
    for dep in deps {
        for (name, artifact) in &dep.artifacts {
            staged.insert(name.clone(), artifact.clone());
        }
    }
    staged
}

#[allow(clippy::too_many_arguments)]
pub fn dispatch(
    rule_type: &str,
    entry: &Map<String, Value>,
    entity: &EntityName,
    own_config: &Configuration,
    ctx: &ParseContext,
    sub_caller: SubCaller<TargetKey, AnalysedTarget>,
    setter: Setter<AnalysedTarget>,
    logger: Logger,
    results: Arc<ResultTargetMap>,
    hash_family: HashFamily,
) {
    match rule_type {
        "generic" => generic(entry, entity, own_config, ctx, sub_caller, setter, logger, results),
        "install" => install(entry, entity, own_config, ctx, sub_caller, setter, logger, results),
        "file_gen" => file_gen(entry, entity, setter, logger, hash_family),
        "symlink" => symlink(entry, entity, setter, logger, hash_family),
        "configure" => configure(entry, entity, own_config, ctx, sub_caller, setter, logger),
        other => logger(
            &format!("target {:?} uses unknown rule {other:?}", entity.name),
            true,
        ),
    }
}

/// A command run over its dependencies' staged artifacts, producing one or
/// more declared output files (§4.6 step 3 ACTION node).
#[allow(clippy::too_many_arguments)]
fn generic(
    entry: &Map<String, Value>,
    entity: &EntityName,
    own_config: &Configuration,
    ctx: &ParseContext,
    sub_caller: SubCaller<TargetKey, AnalysedTarget>,
    setter: Setter<AnalysedTarget>,
    logger: Logger,
    results: Arc<ResultTargetMap>,
) {
    let Some(name) = string_field(entry, "name") else {
        logger(&format!("generic target {:?} has no \"name\" field", entity.name), true);
        return;
    };
    let Some(cmd) = string_list_field(entry, "cmd") else {
        logger(&format!("generic target {:?}: \"cmd\" is not a list of strings", entity.name), true);
        return;
    };
    let outs = match string_list_field(entry, "outs") {
        Some(v) if !v.is_empty() => v,
        Some(_) => vec![name.to_string()],
        None => {
            logger(&format!("generic target {:?}: \"outs\" is not a list of strings", entity.name), true);
            return;
        }
    };
    let Some(deps) = entity_list_field(entry, "deps", ctx) else {
        logger(&format!("generic target {:?}: \"deps\" is not a list of entity references", entity.name), true);
        return;
    };
    let Some(env) = string_map_field(entry, "env") else {
        logger(&format!("generic target {:?}: \"env\" is not a map of strings", entity.name), true);
        return;
    };
    let may_fail = entry.get("may_fail").and_then(Value::as_bool).unwrap_or(false);
    let no_cache = entry.get("no_cache").and_then(Value::as_bool).unwrap_or(false);
    let timeout_scale = entry.get("timeout_scale").and_then(Value::as_f64).unwrap_or(1.0);

    let keys: Vec<TargetKey> = deps.into_iter().map(|d| (d, own_config.clone())).collect();
    let logger2 = Arc::clone(&logger);
    let consumer: Consumer<AnalysedTarget> = Box::new(move |values| {
        let staged = flatten_staged(&values);
        if let Some(conflict) = detect_stage_conflict(&staged) {
            logger2(&format!("staging conflict at {conflict:?}"), true);
            return;
        }
        let action = Action {
            id: String::new(),
            command: cmd.clone(),
            env: env.clone(),
            inputs: staged,
            output_files: outs.clone(),
            output_dirs: vec![],
            may_fail,
            no_cache,
            timeout_scale,
            execution_properties: BTreeMap::new(),
        };
        let id = results.register(action);
        let registered = results.get(&id).expect("action was just registered");

        let mut target = AnalysedTarget::new();
        for out in &outs {
            target
                .artifacts
                .insert(out.clone(), ArtifactDescription::Action { action_id: id.clone(), output_path: out.clone() });
        }
        target.actions.push(registered);
        setter(target);
    });
    sub_caller(keys, consumer, logger);
}

/// Stages dependencies' artifacts together into a single tree, without
/// running a command (§4.6 step 3 TREE node).
fn install(
    entry: &Map<String, Value>,
    entity: &EntityName,
    own_config: &Configuration,
    ctx: &ParseContext,
    sub_caller: SubCaller<TargetKey, AnalysedTarget>,
    setter: Setter<AnalysedTarget>,
    logger: Logger,
    results: Arc<ResultTargetMap>,
) {
    let Some(name) = string_field(entry, "name") else {
        logger(&format!("install target {:?} has no \"name\" field", entity.name), true);
        return;
    };
    let name = name.to_string();
    let Some(deps) = entity_list_field(entry, "deps", ctx) else {
        logger(&format!("install target {:?}: \"deps\" is not a list of entity references", entity.name), true);
        return;
    };

    let keys: Vec<TargetKey> = deps.into_iter().map(|d| (d, own_config.clone())).collect();
    let logger2 = Arc::clone(&logger);
    let consumer: Consumer<AnalysedTarget> = Box::new(move |values| {
        let staged = flatten_staged(&values);
        if let Some(conflict) = detect_stage_conflict(&staged) {
            logger2(&format!("staging conflict at {conflict:?}"), true);
            return;
        }
        let action = Action {
            id: String::new(),
            command: vec![],
            env: BTreeMap::new(),
            inputs: staged,
            output_files: vec![],
            output_dirs: vec![".".to_string()],
            may_fail: false,
            no_cache: false,
            timeout_scale: 1.0,
            execution_properties: BTreeMap::new(),
        };
        let id = results.register(action);
        let registered = results.get(&id).expect("action was just registered");

        let mut target = AnalysedTarget::new();
        target
            .artifacts
            .insert(name.clone(), ArtifactDescription::Action { action_id: id, output_path: ".".to_string() });
        target.actions.push(registered);
        setter(target);
    });
    sub_caller(keys, consumer, logger);
}

/// An inline blob known by its own content, never dispatched as an action
/// (§4.6 step 3 FILE_GEN node).
fn file_gen(entry: &Map<String, Value>, entity: &EntityName, setter: Setter<AnalysedTarget>, logger: Logger, hash_family: HashFamily) {
    let Some(name) = string_field(entry, "name") else {
        logger(&format!("file_gen target {:?} has no \"name\" field", entity.name), true);
        return;
    };
    let Some(data) = string_field(entry, "data") else {
        logger(&format!("file_gen target {:?} has no \"data\" field", entity.name), true);
        return;
    };

    let digest = ArtifactDigest::hash_data_as(hash_family, data.as_bytes(), false);
    let mut target = AnalysedTarget::new();
    target
        .artifacts
        .insert(name.to_string(), ArtifactDescription::Known { digest, object_type: ObjectType::File });
    target.blobs.push(data.to_string());
    setter(target);
}

/// A symlink staged by its target text, validated against the workspace
/// escape rule (§4.6 step 4, scenario E).
fn symlink(entry: &Map<String, Value>, entity: &EntityName, setter: Setter<AnalysedTarget>, logger: Logger, hash_family: HashFamily) {
    let Some(name) = string_field(entry, "name") else {
        logger(&format!("symlink target {:?} has no \"name\" field", entity.name), true);
        return;
    };
    let Some(link_target) = string_field(entry, "target") else {
        logger(&format!("symlink target {:?} has no \"target\" field", entity.name), true);
        return;
    };
    if let Err(err) = validate_staged_symlink(link_target) {
        logger(&format!("symlink target {:?}: {err}", entity.name), true);
        return;
    }

    let digest = ArtifactDigest::hash_data_as(hash_family, link_target.as_bytes(), false);
    let mut target = AnalysedTarget::new();
    target
        .artifacts
        .insert(name.to_string(), ArtifactDescription::Known { digest, object_type: ObjectType::Symlink });
    setter(target);
}

/// Forwards a single dependency's analysis unchanged, evaluated under a
/// configuration obtained by overlaying `config` deltas on the caller's own
/// (§4.6 step 2 config transitions, generalised to its own rule).
fn configure(
    entry: &Map<String, Value>,
    entity: &EntityName,
    own_config: &Configuration,
    ctx: &ParseContext,
    sub_caller: SubCaller<TargetKey, AnalysedTarget>,
    setter: Setter<AnalysedTarget>,
    logger: Logger,
) {
    let Some(target_json) = entry.get("target") else {
        logger(&format!("configure target {:?} has no \"target\" field", entity.name), true);
        return;
    };
    let Some(target_entity) = parse_entity_name(target_json, ctx) else {
        logger(&format!("configure target {:?}: malformed \"target\" entity reference", entity.name), true);
        return;
    };

    let mut new_config = own_config.clone();
    if let Some(Value::Object(deltas)) = entry.get("config") {
        let env = ExpressionEnv::new();
        for (key, raw) in deltas {
            let Some(parsed) = parse_expression(raw, ctx) else {
                logger(&format!("configure target {:?}: malformed config delta for {key:?}", entity.name), true);
                return;
            };
            let Some(value) = parsed.evaluate(own_config, &env) else {
                logger(&format!("configure target {:?}: config delta for {key:?} is undefined", entity.name), true);
                return;
            };
            new_config = new_config.update(key.clone(), value);
        }
    } else if entry.get("config").is_some() {
        logger(&format!("configure target {:?}: \"config\" is not a map", entity.name), true);
        return;
    }

    let logger2 = Arc::clone(&logger);
    let consumer: Consumer<AnalysedTarget> = Box::new(move |mut values| {
        if values.len() != 1 {
            logger2("configure expected exactly one resolved dependency", true);
            return;
        }
        setter((*values.remove(0)).clone());
    });
    sub_caller(vec![(target_entity, new_config)], consumer, logger);
}
