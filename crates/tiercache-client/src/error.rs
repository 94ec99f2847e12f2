//! Client error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RequestError {
    /// 400; the message is the server's reason code
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// 403
    #[error("Unauthorized")]
    Unauthorized,

    /// 429
    #[error("Rate limited")]
    RateLimited,

    /// 500 or 504
    #[error("Internal server error ({status}): {message}")]
    InternalServerError { status: u16, message: String },

    /// Any other unexpected status
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Invalid ttl: must be a positive number of seconds")]
    InvalidTtl,

    #[error("Invalid key: {0:?}")]
    InvalidKey(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Core error: {0}")]
    Core(#[from] tiercache_core::CoreError),
}

impl RequestError {
    /// Whether retrying the same call may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RequestError::RateLimited
                | RequestError::InternalServerError { .. }
                | RequestError::Transport(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable() {
        assert!(RequestError::RateLimited.is_retryable());
        assert!(
            RequestError::InternalServerError {
                status: 504,
                message: String::new()
            }
            .is_retryable()
        );
        assert!(!RequestError::Unauthorized.is_retryable());
        assert!(!RequestError::BadRequest("no_ttl".to_string()).is_retryable());
        assert!(!RequestError::InvalidTtl.is_retryable());
        assert!(
            !RequestError::Api {
                status: 502,
                message: String::new()
            }
            .is_retryable()
        );
    }
}
