//! Tenantry Core: fact model and shared abstractions
//!
//! This crate defines the pieces every other tenantry crate agrees on:
//! - Facts: immutable, versioned records of state changes per stream
//! - Actor context: who is appending, for which organization, and why
//! - Error taxonomy shared by the event log, router and operator surface
//! - Configuration for the store, notification bridge and orchestrator
//! - Seams for publishing committed facts and authorizing operators
//!
//! Key invariants:
//! - `(stream_id, stream_version)` is unique; versions start at 1
//! - Payload and version are immutable once appended
//! - Every fact carries a human-readable reason of bounded length

pub mod config;
pub mod error;
pub mod observe;
pub mod traits;
pub mod types;
pub mod validation;

pub use config::bridge::BOOTSTRAP_INITIATED;
pub use config::{BridgeConfig, PlatformConfig, SagaConfig, StoreConfig, SynchronousMode};
pub use error::{Result, TenantryError};
pub use traits::{AccessPolicy, AllowAll, FactPublisher, PermissionPolicy};
pub use types::{
    ActorContext, Fact, FactDraft, FactId, FactMetadata, NewFact, StreamId, StreamType,
};
