use thiserror::Error;

/// Failures a balance update can run into. Recoverable conditions carry the
/// recognised lines where that helps the caller retry with a clearer image.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("no text detected in image")]
    NoTextDetected,

    #[error("no balance found in recognized text")]
    NoBalanceFound { lines: Vec<String> },

    #[error("unknown currency code: {0}")]
    UnknownCurrency(String),

    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl From<sqlx::Error> for TrackerError {
    fn from(err: sqlx::Error) -> Self {
        TrackerError::Persistence(err.to_string())
    }
}

impl From<std::io::Error> for TrackerError {
    fn from(err: std::io::Error) -> Self {
        TrackerError::Persistence(err.to_string())
    }
}

impl From<serde_json::Error> for TrackerError {
    fn from(err: serde_json::Error) -> Self {
        TrackerError::Persistence(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TrackerError>;
