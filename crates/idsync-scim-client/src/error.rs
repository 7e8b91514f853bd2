//! Error types for the target-directory HTTP clients.

use idsync_core::SyncError;
use thiserror::Error;

/// Result type alias using [`ScimClientError`].
pub type ScimClientResult<T> = Result<T, ScimClientError>;

/// Errors returned by [`ScimClient`](crate::client::ScimClient) and
/// [`IdentityStoreClient`](crate::identity_store::IdentityStoreClient).
#[derive(Debug, Error)]
pub enum ScimClientError {
    /// Transport-level failure from reqwest.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Target could not be reached.
    #[error("target unreachable: {0}")]
    Unreachable(String),

    /// Resource not found (404 or `ResourceNotFoundException`).
    #[error("resource not found: {0}")]
    NotFound(String),

    /// Resource already exists (409 or `ConflictException`).
    #[error("resource conflict: {0}")]
    Conflict(String),

    /// Rate limited (429 or `ThrottlingException`).
    #[error("rate limited (retry after {retry_after_secs:?}s)")]
    RateLimited { retry_after_secs: Option<u64> },

    /// Credentials rejected or access denied (401, 403 or `AccessDeniedException`).
    #[error("authentication failed (HTTP {status}): {detail}")]
    AuthError { status: u16, detail: String },

    /// Any other non-success response.
    #[error("target returned HTTP {status}: {detail}")]
    ScimError { status: u16, detail: String },

    /// Response body could not be parsed.
    #[error("parse error: {0}")]
    ParseError(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid client configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Retries exhausted on a transient failure.
    #[error("max retries exceeded after {attempts} attempt(s): {message}")]
    MaxRetriesExceeded { attempts: u32, message: String },
}

impl ScimClientError {
    /// Whether the failure is worth retrying (network, timeout, rate limit).
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::Unreachable(_) | Self::RateLimited { .. } => true,
            _ => false,
        }
    }

    /// Whether the target reported a 5xx.
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::ScimError { status, .. } if *status >= 500)
    }

    /// Convert into the engine's error type.
    ///
    /// `entity` and `key` name what was being operated on so that `NotFound`
    /// and `Conflict` carry something useful.
    pub fn into_sync_error(self, operation: &str, entity: &'static str, key: &str) -> SyncError {
        let transient = self.is_retryable() || self.is_server_error();
        match self {
            Self::NotFound(_) => SyncError::NotFound {
                entity,
                key: key.to_string(),
            },
            Self::Conflict(_) => SyncError::Conflict {
                entity,
                key: key.to_string(),
            },
            Self::InvalidConfig(msg) => SyncError::Config(msg),
            other @ Self::MaxRetriesExceeded { .. } => SyncError::Transient {
                operation: operation.to_string(),
                message: other.to_string(),
            },
            other if transient => SyncError::Transient {
                operation: operation.to_string(),
                message: other.to_string(),
            },
            Self::ScimError { status, detail } => SyncError::Protocol {
                operation: operation.to_string(),
                status: Some(status),
                message: detail,
            },
            Self::AuthError { status, detail } => SyncError::Protocol {
                operation: operation.to_string(),
                status: Some(status),
                message: detail,
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
    fn test_retry_classification() {
        assert!(ScimClientError::RateLimited {
            retry_after_secs: None
        }
        .is_retryable());
        assert!(ScimClientError::ScimError {
            status: 503,
            detail: String::new()
        }
        .is_server_error());
        assert!(!ScimClientError::ScimError {
            status: 400,
            detail: String::new()
        }
        .is_server_error());
        assert!(!ScimClientError::Conflict("x".into()).is_retryable());
    }

    #[test]
    fn test_into_sync_error_kinds() {
        let kind = |e: ScimClientError| e.into_sync_error("op", "user", "a@x.com").kind();

        assert_eq!(kind(ScimClientError::NotFound("gone".into())), ErrorKind::NotFound);
        assert_eq!(kind(ScimClientError::Conflict("dup".into())), ErrorKind::Conflict);
        assert_eq!(
            kind(ScimClientError::ScimError {
                status: 502,
                detail: "bad gateway".into()
            }),
            ErrorKind::Transient
        );
        assert_eq!(
            kind(ScimClientError::MaxRetriesExceeded {
                attempts: 3,
                message: "timeout".into()
            }),
            ErrorKind::Transient
        );
        assert_eq!(
            kind(ScimClientError::InvalidConfig("bad url".into())),
            ErrorKind::Config
        );
    }

    #[test]
    fn test_protocol_error_keeps_status() {
        let err = ScimClientError::ScimError {
            status: 400,
            detail: "invalid filter".into(),
        }
        .into_sync_error("find_user", "user", "a@x.com");

        match err {
            SyncError::Protocol { status, .. } => assert_eq!(status, Some(400)),
            other => panic!("Expected Protocol, got: {other:?}"),
        }
    }
}
