use std::collections::BTreeMap;

use serde_json::Value;

use crate::entity::{parse_entity_name, ParseContext};
use crate::expression::Expression;

/// Parses the JSON encoding of an [`Expression`] used by expression/rule/
/// target description files (§4.4, §4.6). Tagged forms are JSON arrays
/// whose first element is a reserved string tag, following the same
/// convention as the entity-name grammar (§6.2); anything else is parsed
/// structurally (`null`/bool/number/string literally, array as `List`,
/// object as `Map`).
pub fn parse_expression(value: &Value, ctx: &ParseContext<'_>) -> Option<Expression> {
    match value {
        Value::Null => Some(Expression::None),
        Value::Bool(b) => Some(Expression::Bool(*b)),
        Value::Number(n) => Some(Expression::Number(n.as_f64()?)),
        Value::String(s) => Some(Expression::String(s.clone())),
        Value::Array(arr) => parse_array(arr, ctx),
        Value::Object(map) => {
            let mut entries = BTreeMap::new();
            for (k, v) in map {
                entries.insert(k.clone(), parse_expression(v, ctx)?);
            }
            Some(Expression::Map(entries))
        }
    }
}

fn parse_array(arr: &[Value], ctx: &ParseContext<'_>) -> Option<Expression> {
    if let Some(tag) = arr.first().and_then(Value::as_str) {
        match tag {
            "VAR" if arr.len() == 2 => return Some(Expression::Var(field_name(&arr[1])?)),
            "FIELD" if arr.len() == 2 => return Some(Expression::Field(field_name(&arr[1])?)),
            "DEP_ARTIFACTS" if arr.len() == 2 => {
                return Some(Expression::DepArtifacts(field_name(&arr[1])?))
            }
            "DEP_RUNFILES" if arr.len() == 2 => {
                return Some(Expression::DepRunfiles(field_name(&arr[1])?))
            }
            "DEP_PROVIDES" if arr.len() == 2 => {
                return Some(Expression::DepProvides(field_name(&arr[1])?))
            }
            "DEP_ARTIFACT_NAMES" if arr.len() == 2 => {
                return Some(Expression::DepArtifactNames(field_name(&arr[1])?))
            }
            "DEP_RUNFILE_NAMES" if arr.len() == 2 => {
                return Some(Expression::DepRunfileNames(field_name(&arr[1])?))
            }
            "CALL" if arr.len() == 2 => {
                let entity = parse_entity_name(&arr[1], ctx)?;
                return Some(Expression::Name(entity));
            }
            "RESULT" if arr.len() == 2 => {
                return Some(Expression::Result(Box::new(parse_expression(&arr[1], ctx)?)));
            }
            _ => {}
        }
    }
    let mut items = Vec::with_capacity(arr.len());
    for item in arr {
        items.push(parse_expression(item, ctx)?);
    }
    Some(Expression::List(items))
}

fn field_name(value: &Value) -> Option<String> {
    value.as_str().map(str::to_string)
}
