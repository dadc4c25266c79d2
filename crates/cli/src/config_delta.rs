//! Parses repeated `--config key=value` flags into a [`bb_model::Configuration`]
//! (§12), reusing `clap`'s `value_delimiter` the same way the teacher's CLI
//! parses its `--ignoredRuleHashingAttributes` comma lists.

use anyhow::{anyhow, Result};
use bb_model::{Configuration, Expression};

fn parse_value(raw: &str) -> Expression {
    match raw {
        "true" => Expression::Bool(true),
        "false" => Expression::Bool(false),
        "null" => Expression::None,
        _ => match raw.parse::<f64>() {
            Ok(n) => Expression::Number(n),
            Err(_) => Expression::String(raw.to_string()),
        },
    }
}

pub fn parse_deltas(entries: &[String]) -> Result<Configuration> {
    let mut config = Configuration::new();
    for entry in entries {
        let (key, value) = entry
            .split_once('=')
            .ok_or_else(|| anyhow!("malformed --config entry {entry:?}: expected key=value"))?;
        config = config.update(key.to_string(), parse_value(value));
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_boolean_and_string_values_parse_distinctly() {
        let config = parse_deltas(&["n=3".to_string(), "b=true".to_string(), "s=hello".to_string()]).unwrap();
        assert_eq!(config.get("n"), Some(&Expression::Number(3.0)));
        assert_eq!(config.get("b"), Some(&Expression::Bool(true)));
        assert_eq!(config.get("s"), Some(&Expression::String("hello".into())));
    }

    #[test]
    fn malformed_entry_is_rejected() {
        assert!(parse_deltas(&["noequals".to_string()]).is_err());
    }
}
