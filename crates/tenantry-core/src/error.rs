use std::io;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum TenantryError {
    /// Another writer appended to the stream first. Re-read the version and retry.
    #[error("Concurrent modification on stream {stream_id}: expected version {expected}, stream is at {actual}")]
    ConcurrentModification {
        stream_id: Uuid,
        expected: i64,
        actual: i64,
    },

    #[error("Validation error: {0}")]
    Validation(String),

    /// A projection handler rejected a fact. Recorded on the fact row, never
    /// returned from `append`.
    #[error("Handler failure: {0}")]
    HandlerFailure(String),

    #[error("Unknown stream type: {0}")]
    UnknownStreamType(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl TenantryError {
    /// Whether the caller can succeed by re-reading state and trying again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TenantryError::ConcurrentModification { .. })
    }
}

impl From<serde_json::Error> for TenantryError {
    fn from(err: serde_json::Error) -> Self {
        TenantryError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TenantryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_version_conflicts_are_retryable() {
        let conflict = TenantryError::ConcurrentModification {
            stream_id: Uuid::nil(),
            expected: 2,
            actual: 2,
        };
        assert!(conflict.is_retryable());
        assert!(!TenantryError::Validation("reason too short".into()).is_retryable());
        assert!(!TenantryError::HandlerFailure("boom".into()).is_retryable());
    }

    #[test]
    fn conflict_message_names_versions() {
        let err = TenantryError::ConcurrentModification {
            stream_id: Uuid::nil(),
            expected: 3,
            actual: 4,
        };
        let msg = err.to_string();
        assert!(msg.contains("expected version 3"));
        assert!(msg.contains("stream is at 4"));
    }
}
