//! Error types for the orchestrator.

use thiserror::Error;
use uuid::Uuid;

/// Result type for saga operations.
pub type Result<T> = std::result::Result<T, SagaError>;

/// Errors that can end or interrupt a provisioning run.
#[derive(Debug, Error)]
pub enum SagaError {
    /// Fact store error.
    #[error("Tenantry error: {0}")]
    Tenantry(#[from] tenantry_core::TenantryError),

    /// A live organization already owns the natural key. Nothing was created.
    #[error("Organization already exists: {key} (existing id {existing_id})")]
    AlreadyExists { key: String, existing_id: Uuid },

    /// Not enough resolvers returned the expected target.
    #[error("DNS quorum not reached: {agreeing}/{total} agreed, {required} required")]
    QuorumNotReached {
        agreeing: usize,
        required: usize,
        total: usize,
    },

    /// DNS provisioning never verified; the run was compensated.
    #[error("DNS verification failed after {attempts} attempts ({compensation_failures} compensation failures)")]
    RetriesExhausted {
        attempts: u32,
        compensation_failures: usize,
    },

    /// A step failed and at least one rollback action failed as well.
    #[error("Compensation incomplete after '{cause}': {}", .failures.join("; "))]
    CompensationPartialFailure { cause: String, failures: Vec<String> },

    /// A step failed; every rollback action succeeded.
    #[error("Provisioning failed at {stage} and was rolled back: {error}")]
    Compensated { stage: String, error: String },

    /// An operator cancelled the run; it was compensated.
    #[error("Provisioning cancelled for organization {0}")]
    Cancelled(Uuid),

    /// External DNS or email provider error.
    #[error("Provider error: {0}")]
    Provider(String),

    /// Run bookkeeping is inconsistent.
    #[error("Invalid saga state: {0}")]
    InvalidState(String),

    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SagaError {
    /// Failures that should be surfaced to the requester as terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SagaError::AlreadyExists { .. }
                | SagaError::RetriesExhausted { .. }
                | SagaError::CompensationPartialFailure { .. }
                | SagaError::Compensated { .. }
                | SagaError::Cancelled(_)
        )
    }
}
