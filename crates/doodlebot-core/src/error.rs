use thiserror::Error;

#[derive(Debug, Error)]
pub enum DoodleBotError {
    /// Bad or missing command arguments. The message is the usage text
    /// echoed back to the user verbatim.
    #[error("{0}")]
    Parse(String),

    #[error("Attach error: {0}")]
    Attach(String),

    #[error("Canvas error: {0}")]
    Surface(String),

    #[error("Capture error: {0}")]
    Capture(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, DoodleBotError>;
