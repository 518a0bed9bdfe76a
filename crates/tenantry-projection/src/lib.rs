//! Tenantry Projection: dispatch router and read models
//!
//! Every appended fact is routed by `(stream_type, fact_type)` to at most one
//! handler, which updates denormalized SQLite tables inside the append
//! transaction. Handlers are:
//! - Pure: derived only from current projection state and the fact itself
//! - Idempotent: existence-checked upserts, so a replayed fact changes nothing
//! - Local: cross-aggregate effects are returned as follow-up facts, never
//!   written directly
//!
//! Unregistered combinations are left unprocessed, which lets new fact types
//! ship before their handlers.

pub mod handler;
pub mod handlers;
pub mod payloads;
pub mod queries;
pub mod registry;
pub mod schema;

pub use handler::{Effects, FnHandler, ProjectionHandler};
pub use payloads::{Classification, LinkKind, OrganizationType, PartnerType};
pub use registry::HandlerRegistry;

use chrono::{DateTime, SecondsFormat, Utc};
use tenantry_core::TenantryError;

pub(crate) fn storage(err: rusqlite::Error) -> TenantryError {
    TenantryError::Storage(err.to_string())
}

/// Timestamps are stored as fixed-width RFC 3339 so they sort lexically.
pub fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}
