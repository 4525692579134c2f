//! Error types for the LLM collaborator.

use thiserror::Error;

/// Errors that can occur when talking to the LLM service.
#[derive(Debug, Error)]
pub enum AssistError {
    /// The capability has no API key configured.
    #[error("{0} assistant is not configured")]
    Disabled(&'static str),

    /// The caller's input cannot be sent (empty message, non-image upload).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Malformed configuration value.
    #[error("invalid configuration for {key}: {reason}")]
    Config { key: &'static str, reason: String },

    /// Transport failure (connect, timeout, body read).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Rate limited by the service.
    #[error("rate limited by the LLM service")]
    RateLimited,

    /// The API key was refused.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The service answered with an error status.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The reply could not be understood.
    #[error("parse error: {0}")]
    Parse(String),
}

impl AssistError {
    /// True for failures worth another attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            AssistError::RateLimited => true,
            AssistError::Api { status, .. } => *status >= 500,
            AssistError::Http(err) => err.is_timeout() || err.is_connect() || err.is_request(),
            _ => false,
        }
    }
}

pub type AssistResult<T> = Result<T, AssistError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(AssistError::RateLimited.is_transient());
        assert!(AssistError::Api { status: 503, message: String::new() }.is_transient());
        assert!(!AssistError::Api { status: 400, message: String::new() }.is_transient());
        assert!(!AssistError::Unauthorized("bad key".to_string()).is_transient());
        assert!(!AssistError::Disabled("vision").is_transient());
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            AssistError::Disabled("chat").to_string(),
            "chat assistant is not configured"
        );
        assert_eq!(
            AssistError::Api { status: 500, message: "boom".to_string() }.to_string(),
            "API error (500): boom"
        );
    }
}
