use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::description::ArtifactDescription;
use crate::entity::EntityName;

/// Immutable sum type for the target-description language (§3 "Expression").
/// `Number` is stored as `f64`; the grammar does not distinguish integers
/// from floats.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    None,
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<Expression>),
    Map(BTreeMap<String, Expression>),
    Name(EntityName),
    Result(Box<Expression>),
    Artifact(ArtifactDescription),
    /// Reads a configuration variable by name; undefined (`None`) if unbound.
    Var(String),
    /// §4.6 rule-expression built-ins. These only resolve inside a rule
    /// body's evaluation context (`bb-targets`' `RuleEvalContext`); plain
    /// `Expression::evaluate` treats them as undefined, since expression-file
    /// functions (§4.4 `ExpressionFunctionMap`) never see a field/dependency
    /// context to resolve them against.
    Field(String),
    DepArtifacts(String),
    DepRunfiles(String),
    DepProvides(String),
    DepArtifactNames(String),
    DepRunfileNames(String),
}

impl Eq for Expression {}

/// `Configuration` keys a memoised target-map entry (§4.6 `key=(EntityName,
/// Configuration)`), so `Expression` needs `Eq`/`Hash`. `Number` compares and
/// hashes by bit pattern rather than value; the expression language never
/// produces `NaN`, so reflexivity holds in practice.
impl std::hash::Hash for Expression {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Expression::None => {}
            Expression::Bool(b) => b.hash(state),
            Expression::Number(n) => n.to_bits().hash(state),
            Expression::String(s) => s.hash(state),
            Expression::List(items) => items.hash(state),
            Expression::Map(entries) => entries.hash(state),
            Expression::Name(name) => name.hash(state),
            Expression::Result(inner) => inner.hash(state),
            Expression::Artifact(a) => a.hash(state),
            Expression::Var(s)
            | Expression::Field(s)
            | Expression::DepArtifacts(s)
            | Expression::DepRunfiles(s)
            | Expression::DepProvides(s)
            | Expression::DepArtifactNames(s)
            | Expression::DepRunfileNames(s) => s.hash(state),
        }
    }
}

/// A named, not-yet-evaluated expression body, as produced by
/// `ExpressionFunctionMap` (§4.4). Evaluating a `Expression::Name` looks the
/// referenced entity up in the `fns` environment and evaluates its body.
pub type ExpressionFunction = Expression;

/// Lookup table handed to `Evaluate` as `fns`; keyed by the fully-resolved
/// entity name of each expression-file function.
#[derive(Debug, Clone, Default)]
pub struct ExpressionEnv {
    functions: HashMap<EntityName, Arc<ExpressionFunction>>,
}

impl ExpressionEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_function(mut self, name: EntityName, body: ExpressionFunction) -> Self {
        self.functions.insert(name, Arc::new(body));
        self
    }

    pub fn get(&self, name: &EntityName) -> Option<&ExpressionFunction> {
        self.functions.get(name).map(|f| f.as_ref())
    }
}

/// Immutable environment mapping string keys to expression values (§3
/// "Configuration"). `update` is non-mutating: it returns a new
/// configuration that differs only at `key`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Configuration {
    vars: BTreeMap<String, Expression>,
}

impl Configuration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Expression> {
        self.vars.get(key)
    }

    pub fn update(&self, key: impl Into<String>, value: Expression) -> Self {
        let mut vars = self.vars.clone();
        vars.insert(key.into(), value);
        Self { vars }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.vars.keys().map(String::as_str)
    }
}

impl Expression {
    /// Purely functional evaluation. Returns `None` (the Rust `Option`, not
    /// to be confused with `Expression::None`) to signal that the expression
    /// evaluated to "undefined" and the caller must treat this as failure of
    /// the surrounding computation.
    pub fn evaluate(&self, config: &Configuration, fns: &ExpressionEnv) -> Option<Expression> {
        match self {
            Expression::None
            | Expression::Bool(_)
            | Expression::Number(_)
            | Expression::String(_)
            | Expression::Artifact(_) => Some(self.clone()),
            Expression::List(items) => {
                let mut evaluated = Vec::with_capacity(items.len());
                for item in items {
                    evaluated.push(item.evaluate(config, fns)?);
                }
                Some(Expression::List(evaluated))
            }
            Expression::Map(entries) => {
                let mut evaluated = BTreeMap::new();
                for (k, v) in entries {
                    evaluated.insert(k.clone(), v.evaluate(config, fns)?);
                }
                Some(Expression::Map(evaluated))
            }
            Expression::Name(entity) => {
                let body = fns.get(entity)?;
                body.evaluate(config, fns)
            }
            Expression::Result(inner) => {
                let evaluated = inner.evaluate(config, fns)?;
                Some(Expression::Result(Box::new(evaluated)))
            }
            Expression::Var(key) => config.get(key).cloned(),
            Expression::Field(_)
            | Expression::DepArtifacts(_)
            | Expression::DepRunfiles(_)
            | Expression::DepProvides(_)
            | Expression::DepArtifactNames(_)
            | Expression::DepRunfileNames(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::ReferenceType;

    fn name(module: &str, n: &str) -> EntityName {
        EntityName {
            repository: "main".into(),
            module: module.into(),
            name: n.into(),
            reference_type: ReferenceType::NamedTarget,
        }
    }

    #[test]
    fn literals_evaluate_to_themselves() {
        let config = Configuration::new();
        let fns = ExpressionEnv::new();
        assert_eq!(Expression::Bool(true).evaluate(&config, &fns), Some(Expression::Bool(true)));
        assert_eq!(Expression::None.evaluate(&config, &fns), Some(Expression::None));
    }

    #[test]
    fn list_evaluation_propagates_undefined() {
        let config = Configuration::new();
        let fns = ExpressionEnv::new();
        let list = Expression::List(vec![Expression::Bool(true), Expression::Name(name(".", "missing"))]);
        assert_eq!(list.evaluate(&config, &fns), None);
    }

    #[test]
    fn name_resolves_through_fns() {
        let config = Configuration::new();
        let target = name(".", "double");
        let fns = ExpressionEnv::new().with_function(target.clone(), Expression::Number(2.0));
        assert_eq!(
            Expression::Name(target).evaluate(&config, &fns),
            Some(Expression::Number(2.0))
        );
    }

    #[test]
    fn var_reads_configuration_and_is_undefined_when_unbound() {
        let config = Configuration::new().update("arch", Expression::String("x86".into()));
        let fns = ExpressionEnv::new();
        assert_eq!(
            Expression::Var("arch".into()).evaluate(&config, &fns),
            Some(Expression::String("x86".into()))
        );
        assert_eq!(Expression::Var("missing".into()).evaluate(&config, &fns), None);
    }

    #[test]
    fn rule_builtins_are_undefined_under_plain_evaluation() {
        let config = Configuration::new();
        let fns = ExpressionEnv::new();
        assert_eq!(Expression::Field("name".into()).evaluate(&config, &fns), None);
        assert_eq!(Expression::DepArtifacts("deps".into()).evaluate(&config, &fns), None);
    }

    #[test]
    fn configuration_update_is_non_mutating() {
        let base = Configuration::new();
        let updated = base.update("debug", Expression::Bool(true));
        assert_eq!(base.get("debug"), None);
        assert_eq!(updated.get("debug"), Some(&Expression::Bool(true)));
    }

    #[test]
    fn configurations_with_equal_contents_hash_equal() {
        use std::collections::HashSet;
        let a = Configuration::new().update("arch", Expression::String("x86".into()));
        let b = Configuration::new().update("arch", Expression::String("x86".into()));
        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }
}
