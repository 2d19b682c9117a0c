use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Classification failed: {0}")]
    Classification(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Dispatch error: {0}")]
    Dispatch(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Unsupported script kind: {0}")]
    UnsupportedScriptKind(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, AgentError>;
