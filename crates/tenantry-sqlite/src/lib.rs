//! SQLite-backed fact log
//!
//! Appends a fact and applies it to the projection tables in one
//! transaction. Key features:
//! - Optimistic concurrency on `(stream_id, stream_version)`
//! - Handler failures recorded on the fact row instead of rolling back
//! - Cascading follow-up facts appended in the same transaction
//! - Retry of a single fact and full projection rebuild by replay
//! - Operator queries over failed facts

pub mod operator;
pub mod row;
pub mod schema;
pub mod store;

pub use operator::{FailedFactFilter, FailureStats, OperatorSurface};
pub use store::{RebuildReport, SqliteFactStore};

use tenantry_core::TenantryError;

pub(crate) fn storage(err: rusqlite::Error) -> TenantryError {
    TenantryError::Storage(err.to_string())
}
