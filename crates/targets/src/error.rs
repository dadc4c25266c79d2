use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TargetsError {
    #[error("target entry for {0:?} is not a JSON object")]
    MalformedEntry(String),
    #[error("target entry for {0:?} has no \"type\" field")]
    MissingType(String),
    #[error("target {0:?} uses unknown rule {1:?} (no matching built-in and custom rules are not dispatched here)")]
    UnknownRule(String, String),
    #[error("target {0:?}: field {1:?} is malformed")]
    MalformedField(String, &'static str),
    #[error("target {0:?} is missing required field {1:?}")]
    MissingField(String, &'static str),
}
