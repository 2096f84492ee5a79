//! ML client error types.

use thiserror::Error;

pub type MlResult<T> = Result<T, MlError>;

#[derive(Debug, Error)]
pub enum MlError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("ML service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Service returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timeout after {0} seconds")]
    Timeout(u64),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MlError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse(message.into())
    }

    /// Build from a non-success HTTP response.
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let message = body.into();
        match status {
            502..=504 => Self::ServiceUnavailable(format!("{status}: {message}")),
            _ => Self::Api { status, message },
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            MlError::ServiceUnavailable(_) | MlError::Timeout(_) => true,
            MlError::Api { status, .. } => *status == 429 || *status >= 500,
            MlError::Network(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_statuses() {
        assert!(MlError::from_status(429, "slow down").is_retryable());
        assert!(MlError::from_status(500, "oops").is_retryable());
        assert!(matches!(MlError::from_status(503, ""), MlError::ServiceUnavailable(_)));
        assert!(!MlError::from_status(400, "bad file").is_retryable());
        assert!(!MlError::config("missing key").is_retryable());
    }
}
