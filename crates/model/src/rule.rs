use std::collections::{BTreeMap, BTreeSet};

use crate::entity::EntityName;
use crate::error::ModelError;
use crate::expression::Expression;

/// A parsed rule description (§3 "User Rule"). `config_transitions` maps a
/// target/implicit field name to the expression that computes the list of
/// configuration deltas applied to that field's dependencies.
#[derive(Debug, Clone, PartialEq)]
pub struct UserRule {
    pub string_fields: Vec<String>,
    pub target_fields: Vec<String>,
    pub config_fields: Vec<String>,
    pub implicit_fields: BTreeMap<String, Vec<EntityName>>,
    pub config_vars: Vec<String>,
    pub config_transitions: BTreeMap<String, Expression>,
    pub expression: Expression,
    pub anonymous_declarations: BTreeMap<String, Expression>,
}

impl UserRule {
    /// Field names across the four field kinds must be pairwise disjoint,
    /// and every `config_transitions` key must name a declared target or
    /// implicit field.
    pub fn validate(&self) -> Result<(), ModelError> {
        let mut seen = BTreeSet::new();
        for field in self
            .string_fields
            .iter()
            .chain(self.target_fields.iter())
            .chain(self.config_fields.iter())
            .chain(self.implicit_fields.keys())
        {
            if !seen.insert(field.clone()) {
                return Err(ModelError::DuplicateRuleField(field.clone()));
            }
        }

        let transitionable: BTreeSet<&str> = self
            .target_fields
            .iter()
            .map(String::as_str)
            .chain(self.implicit_fields.keys().map(String::as_str))
            .collect();
        for field in self.config_transitions.keys() {
            if !transitionable.contains(field.as_str()) {
                return Err(ModelError::UnknownConfigTransitionField(field.clone()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_rule() -> UserRule {
        UserRule {
            string_fields: vec!["name".into()],
            target_fields: vec!["deps".into()],
            config_fields: vec!["arch".into()],
            implicit_fields: BTreeMap::new(),
            config_vars: vec![],
            config_transitions: BTreeMap::new(),
            expression: Expression::None,
            anonymous_declarations: BTreeMap::new(),
        }
    }

    #[test]
    fn disjoint_fields_validate() {
        assert!(base_rule().validate().is_ok());
    }

    #[test]
    fn colliding_field_names_are_rejected() {
        let mut rule = base_rule();
        rule.config_fields.push("deps".into());
        assert!(matches!(rule.validate(), Err(ModelError::DuplicateRuleField(_))));
    }

    #[test]
    fn transition_on_undeclared_field_is_rejected() {
        let mut rule = base_rule();
        rule.config_transitions.insert("nonexistent".into(), Expression::None);
        assert!(matches!(
            rule.validate(),
            Err(ModelError::UnknownConfigTransitionField(_))
        ));
    }

    #[test]
    fn transition_on_implicit_field_is_allowed() {
        let mut rule = base_rule();
        rule.implicit_fields.insert("toolchain".into(), vec![]);
        rule.config_transitions.insert("toolchain".into(), Expression::None);
        assert!(rule.validate().is_ok());
    }
}
