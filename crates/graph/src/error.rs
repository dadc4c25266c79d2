use thiserror::Error;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("unknown action id {0:?}")]
    UnknownAction(String),
    #[error("execution API error: {0}")]
    Api(#[from] bb_execapi::ExecutionApiError),
    #[error("dependency cycle detected: {}", .0.join(" -> "))]
    Cycle(Vec<String>),
}
