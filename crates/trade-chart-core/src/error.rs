use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChartError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Unknown granularity: {0}")]
    UnknownGranularity(String),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}
