//! Tenantry: event-sourced organization provisioning
//!
//! Tenantry provides:
//! - **Fact store**: append-only, per-stream versioned facts (SQLite)
//! - **Projections**: read models updated in the same transaction as the append
//! - **Notification bridge**: committed facts broadcast to in-process subscribers
//! - **Orchestrator**: a persisted saga that provisions organizations, verifies
//!   DNS by resolver quorum and compensates on failure
//! - **Operator surface**: failed-fact listing, retry and statistics
//!
//! # Quick Start
//!
//! ```no_run
//! use tenantry::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<()> {
//! let platform = Platform::open(
//!     PlatformConfig::new("./tenantry.db".into()),
//!     Arc::new(InMemoryDns::new()),
//!     Arc::new(InMemoryEmail::new()),
//! )?;
//!
//! let worker = platform.worker();
//! tokio::spawn({
//!     let worker = worker.clone();
//!     async move { worker.run().await }
//! });
//!
//! let ctx = ActorContext::new(Uuid::new_v4(), Uuid::new_v4());
//! let request = ProvisioningRequest::new(OrganizationSpec {
//!     name: "Acme Health".into(),
//!     display_name: None,
//!     classification: Classification::new(OrganizationType::Provider),
//!     subdomain: Some("acme".into()),
//!     timezone: "UTC".into(),
//! });
//! let organization_id = platform.submit(&ctx, request)?;
//! # Ok(())
//! # }
//! ```

pub mod platform;
pub mod prelude;

pub use tenantry_core::{
    AccessPolicy, ActorContext, AllowAll, BridgeConfig, Fact, FactDraft, FactId, FactMetadata,
    FactPublisher, NewFact, PermissionPolicy, PlatformConfig, SagaConfig, StoreConfig, StreamId,
    StreamType, SynchronousMode, TenantryError,
};

pub use tenantry_projection::{
    queries, Classification, Effects, FnHandler, HandlerRegistry, LinkKind, OrganizationType,
    PartnerType, ProjectionHandler,
};

pub use tenantry_sqlite::{
    FailedFactFilter, FailureStats, OperatorSurface, RebuildReport, SqliteFactStore,
};

pub use tenantry_bus::{FactFilter, Notification, NotificationBridge, RecvError, Subscription};

pub use tenantry_saga::{
    AddressSpec, ContactSpec, DnsProvider, EmailSender, InMemoryDns, InMemoryEmail,
    InvitationSpec, Orchestrator, OrchestratorWorker, OrganizationSpec, PhoneSpec,
    ProvisioningRequest, Result, SagaError, SagaOutcome, SagaRun, SagaRunStore, SagaStep,
};

pub use platform::Platform;
