use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("field name {0:?} is declared more than once across a rule's field kinds")]
    DuplicateRuleField(String),
    #[error("config_transitions refers to undeclared field {0:?}")]
    UnknownConfigTransitionField(String),
    #[error("symlink target {0:?} is absolute or escapes the workspace")]
    InvalidSymlinkTarget(String),
    #[error("staged path {0:?} conflicts with a tree output")]
    StageConflict(String),
}
