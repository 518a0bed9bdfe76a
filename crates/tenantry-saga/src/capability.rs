//! External capabilities the orchestrator drives.
//!
//! Both traits are implemented by infrastructure adapters outside this crate;
//! [`crate::memory`] carries in-memory versions for tests and local runs.

use crate::error::{Result, SagaError};
use async_trait::async_trait;
use serde_json::Value;

/// Provider-assigned identifier of a DNS record
pub type RecordId = String;

/// Provider-assigned identifier of a sent message
pub type DeliveryId = String;

#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// Create `name` pointing at `target`.
    ///
    /// Must be idempotent: when a matching record already exists, return its
    /// id instead of failing.
    async fn create_record(&self, name: &str, target: &str) -> Result<RecordId>;

    /// Ask one resolver what `name` points at. `None` when absent.
    async fn query(&self, resolver: &str, name: &str) -> Result<Option<String>>;

    /// Remove a record created by [`create_record`](Self::create_record).
    ///
    /// Used when rolling back a failed bootstrap; removing a record that is
    /// already gone must succeed. Providers without deletion keep the default,
    /// and the record is reported for manual cleanup.
    async fn delete_record(&self, name: &str, record_id: &str) -> Result<()> {
        Err(SagaError::Provider(format!(
            "provider cannot delete record {} for {}",
            record_id, name
        )))
    }
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, to: &str, template: &str, data: &Value) -> Result<DeliveryId>;
}
