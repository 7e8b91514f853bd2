//! Sync error types with kind classification for propagation policy.

use thiserror::Error;

/// Result type alias using [`SyncError`].
pub type SyncResult<T> = Result<T, SyncError>;

/// Coarse error classification used by the orchestrator to decide whether a
/// failure is recoverable locally, skippable, or fatal for the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A lookup yielded zero matches or the remote returned 404.
    NotFound,
    /// A lookup yielded more than one match; correlation is broken.
    Ambiguous,
    /// The remote reported that the resource already exists.
    Conflict,
    /// Timeout, rate limit or server error (possibly after exhausted retries).
    Transient,
    /// Any other protocol-level failure (4xx, malformed payload).
    Protocol,
    /// Invalid local configuration.
    Config,
}

/// Errors surfaced by directory collaborators and the reconciliation layer.
#[derive(Debug, Error)]
pub enum SyncError {
    /// No entity matched the lookup.
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    /// More than one entity matched a lookup that must be unique.
    #[error("ambiguous {entity} lookup for '{key}': {matches} matches")]
    Ambiguous {
        entity: &'static str,
        key: String,
        matches: usize,
    },

    /// Create rejected because the entity already exists.
    #[error("{entity} already exists: {key}")]
    Conflict { entity: &'static str, key: String },

    /// Transient failure that survived transport-level retries.
    #[error("transient failure during {operation}: {message}")]
    Transient { operation: String, message: String },

    /// Non-retryable protocol failure.
    #[error("{operation} failed{}: {message}", status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Protocol {
        operation: String,
        status: Option<u16>,
        message: String,
    },

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl SyncError {
    /// Classification of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Ambiguous { .. } => ErrorKind::Ambiguous,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::Transient { .. } => ErrorKind::Transient,
            Self::Protocol { .. } => ErrorKind::Protocol,
            Self::Config(_) => ErrorKind::Config,
        }
    }

    /// Whether this error means the lookup target does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Whether this error reports a create conflict.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        self.kind() == ErrorKind::Conflict
    }

    /// Errors that abort the run regardless of the configured failure policy.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self.kind(), ErrorKind::Ambiguous | ErrorKind::Config)
    }

    /// Shorthand for a [`SyncError::Protocol`] without an HTTP status.
    pub fn protocol(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Protocol {
            operation: operation.into(),
            status: None,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        let not_found = SyncError::NotFound {
            entity: "user",
            key: "a@x.com".into(),
        };
        assert_eq!(not_found.kind(), ErrorKind::NotFound);
        assert!(not_found.is_not_found());
        assert!(!not_found.is_fatal());

        let ambiguous = SyncError::Ambiguous {
            entity: "group",
            key: "Eng".into(),
            matches: 2,
        };
        assert!(ambiguous.is_fatal());
        assert!(SyncError::Config("bad".into()).is_fatal());
    }

    #[test]
    fn test_protocol_display_includes_status() {
        let err = SyncError::Protocol {
            operation: "create_user".into(),
            status: Some(400),
            message: "invalid userName".into(),
        };
        assert_eq!(err.to_string(), "create_user failed (HTTP 400): invalid userName");

        let err = SyncError::protocol("list_users", "repeated page token");
        assert_eq!(err.to_string(), "list_users failed: repeated page token");
    }
}
