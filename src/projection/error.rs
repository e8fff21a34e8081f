//! Projection error taxonomy.
//!
//! Errors carry a structured [`ErrorKind`] that drives scheduling decisions and
//! a free-form diagnostic identifier that only ends up in logs.

use std::time::Duration;

use crate::storage::StorageError;

use super::registry::RegistryError;

/// Classification of a failure, deciding whether the scheduler retries,
/// defers or halts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed event payload. Fatal.
    Decode,
    /// A row the reduction relies on is missing. Fatal.
    NotFound,
    /// Unique constraint violated outside the natural key. Fatal.
    Conflict,
    /// Connectivity, timeout or busy store. Retried with backoff.
    TransientStore,
    /// Another instance owns the projection. Not an error, just a deferral.
    LockUnavailable,
}

impl ErrorKind {
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::TransientStore)
    }

    pub fn is_fatal(self) -> bool {
        matches!(
            self,
            ErrorKind::Decode | ErrorKind::NotFound | ErrorKind::Conflict
        )
    }
}

/// Error returned by a reducer.
#[derive(Debug, thiserror::Error)]
#[error("{kind:?} ({diagnostic}): {message}")]
pub struct ReduceError {
    kind: ErrorKind,
    diagnostic: &'static str,
    message: String,
}

impl ReduceError {
    pub fn new(kind: ErrorKind, diagnostic: &'static str, message: impl Into<String>) -> Self {
        Self {
            kind,
            diagnostic,
            message: message.into(),
        }
    }

    pub fn decode(diagnostic: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Decode, diagnostic, message)
    }

    pub fn not_found(diagnostic: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, diagnostic, message)
    }

    pub fn conflict(diagnostic: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, diagnostic, message)
    }

    pub fn transient(diagnostic: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TransientStore, diagnostic, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn diagnostic(&self) -> &'static str {
        self.diagnostic
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<StorageError> for ReduceError {
    fn from(e: StorageError) -> Self {
        Self::new(e.kind(), "STORE-reduce", e.to_string())
    }
}

/// Error surfaced by a projection worker.
#[derive(Debug, thiserror::Error)]
pub enum ProjectionError {
    #[error("reduce failed for {event_type} on {aggregate_type}/{aggregate_id} at sequence {sequence}: {source}")]
    Reduce {
        aggregate_type: String,
        aggregate_id: String,
        event_type: String,
        sequence: u64,
        #[source]
        source: ReduceError,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Store call exceeded {0:?}")]
    Timeout(Duration),

    #[error("Run lock for projection {0} was lost")]
    LockLost(String),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
}

impl ProjectionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProjectionError::Reduce { source, .. } => source.kind(),
            ProjectionError::Storage(e) => e.kind(),
            ProjectionError::Timeout(_) => ErrorKind::TransientStore,
            ProjectionError::LockLost(_) => ErrorKind::LockUnavailable,
            // Registry problems are configuration errors; nothing to retry.
            ProjectionError::Registry(_) => ErrorKind::Conflict,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    pub fn is_deferral(&self) -> bool {
        self.kind() == ErrorKind::LockUnavailable
    }

    /// Diagnostic identifier for logs.
    pub fn diagnostic(&self) -> &'static str {
        match self {
            ProjectionError::Reduce { source, .. } => source.diagnostic(),
            ProjectionError::Storage(StorageError::LeaseLost(_)) => "LOCK-lost",
            ProjectionError::Storage(_) => "STORE-exec",
            ProjectionError::Timeout(_) => "STORE-timeout",
            ProjectionError::LockLost(_) => "LOCK-lost",
            ProjectionError::Registry(_) => "REG-invalid",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        assert!(ErrorKind::TransientStore.is_retryable());
        assert!(!ErrorKind::LockUnavailable.is_retryable());
        assert!(ErrorKind::Decode.is_fatal());
        assert!(ErrorKind::NotFound.is_fatal());
        assert!(ErrorKind::Conflict.is_fatal());
        assert!(!ErrorKind::TransientStore.is_fatal());
    }

    #[test]
    fn test_reduce_error_display_includes_diagnostic() {
        let err = ReduceError::not_found("PROJE-1", "token t1 missing");
        let text = err.to_string();
        assert!(text.contains("NotFound"));
        assert!(text.contains("PROJE-1"));
        assert!(text.contains("token t1 missing"));
    }

    #[test]
    fn test_storage_error_maps_to_reduce_kind() {
        let err: ReduceError = StorageError::Unavailable("connection reset".into()).into();
        assert_eq!(err.kind(), ErrorKind::TransientStore);

        let err: ReduceError = StorageError::NotFound("row".into()).into();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_projection_error_kinds() {
        let timeout = ProjectionError::Timeout(Duration::from_secs(1));
        assert!(timeout.is_retryable());

        let lost = ProjectionError::LockLost("p".into());
        assert!(lost.is_deferral());
        assert!(!lost.is_retryable());

        let reduce = ProjectionError::Reduce {
            aggregate_type: "user".into(),
            aggregate_id: "u1".into(),
            event_type: "user.removed".into(),
            sequence: 1,
            source: ReduceError::decode("PROJE-2", "bad"),
        };
        assert_eq!(reduce.kind(), ErrorKind::Decode);
        assert_eq!(reduce.diagnostic(), "PROJE-2");
    }
}
