//! Error types for the source directory client.

use idsync_core::SyncError;
use thiserror::Error;

/// Result type alias using `DirectoryError`.
pub type DirectoryResult<T> = Result<T, DirectoryError>;

/// Errors that can occur when reading the source directory.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// Configuration validation error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Credentials rejected (401/403).
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Error response from the directory API.
    #[error("Directory API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// Resource not found.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Rate limited and out of retries.
    #[error("Rate limit exceeded after {attempts} attempt(s)")]
    RateLimited { attempts: u32 },

    /// HTTP request error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing error.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
}

impl DirectoryError {
    /// Whether the error is transient.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } => true,
            Self::Api { status, .. } => *status >= 500,
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }

    /// Convert into the engine's error type.
    pub fn into_sync_error(self, operation: &str) -> SyncError {
        if self.is_retryable() {
            return SyncError::Transient {
                operation: operation.to_string(),
                message: self.to_string(),
            };
        }
        match self {
            Self::Config(msg) => SyncError::Config(msg),
            Self::NotFound(key) => SyncError::NotFound {
                entity: "directory resource",
                key,
            },
            Self::Api { status, message } => SyncError::Protocol {
                operation: operation.to_string(),
                status: Some(status),
                message,
            },
            Self::Auth(msg) => SyncError::Protocol {
                operation: operation.to_string(),
                status: Some(401),
                message: msg,
            },
            other => SyncError::protocol(operation, other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use idsync_core::ErrorKind;

    #[test]
    fn test_server_errors_are_transient() {
        let err = DirectoryError::Api {
            status: 503,
            message: "backend unavailable".into(),
        };
        assert!(err.is_retryable());
        assert_eq!(err.into_sync_error("list_users").kind(), ErrorKind::Transient);
    }

    #[test]
    fn test_client_errors_are_protocol() {
        let err = DirectoryError::Api {
            status: 400,
            message: "Invalid query".into(),
        };
        assert!(!err.is_retryable());
        assert_eq!(err.into_sync_error("list_users").kind(), ErrorKind::Protocol);
    }

    #[test]
    fn test_config_error_kind() {
        let err = DirectoryError::Config("missing customer id".into());
        assert_eq!(err.into_sync_error("list_users").kind(), ErrorKind::Config);
    }
}
