//! Docspace error types

use thiserror::Error;

/// Docspace error type
#[derive(Error, Debug)]
pub enum Error {
    /// Unknown revision id (or missing baseline) for a module
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rejected input, e.g. an empty label or a malformed scope
    #[error("Validation error: {0}")]
    Validation(String),

    /// A generation is already in flight for the module
    #[error("Busy: generation already in progress for {0}")]
    Busy(String),

    /// Operation not valid in the current state (e.g. promote without a dirty draft)
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Transport failure talking to persistence or the generation backend
    #[error("Network error: {0}")]
    Network(String),

    /// The generation backend rejected or failed the request
    #[error("Generation error: {0}")]
    Generation(String),

    /// A generation result arrived after its request was superseded
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether retrying the same call later may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Busy(_))
    }
}

/// Result type alias for Docspace operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(Error::Network("reset".to_string()).is_retryable());
        assert!(Error::Busy("notes".to_string()).is_retryable());
        assert!(!Error::NotFound("rev-1".to_string()).is_retryable());
        assert!(!Error::Generation("quota exceeded".to_string()).is_retryable());
    }

    #[test]
    fn test_display_messages() {
        let err = Error::Validation("label must not be empty".to_string());
        assert_eq!(err.to_string(), "Validation error: label must not be empty");
        let err = Error::Busy("quiz".to_string());
        assert_eq!(err.to_string(), "Busy: generation already in progress for quiz");
    }
}
