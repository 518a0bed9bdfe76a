//! Tenantry Saga
//!
//! Provisions an organization end to end and undoes it when it cannot.
//!
//! # Overview
//!
//! - An explicit state machine ([`SagaStep`]) persisted after every step, so a
//!   restarted process resumes exactly where it stopped
//! - DNS provisioning retried with exponential backoff and accepted only on a
//!   2-of-3 resolver quorum
//! - Compensation in reverse creation order, each undo appended as a fact
//! - Operator cancellation that interrupts a waiting run
//!
//! # Architecture
//!
//! 1. **Submit**: [`Orchestrator::submit`] appends `organization.bootstrap.initiated`
//! 2. **Wake-up**: the notification bridge delivers the fact to the [`OrchestratorWorker`]
//! 3. **Run**: the worker prepares a [`SagaRun`] and drives it in its own task
//! 4. **Facts**: every step appends facts; projections follow through normal dispatch
//!
//! # Example
//!
//! ```ignore
//! use tenantry_saga::prelude::*;
//! use std::sync::Arc;
//!
//! let orchestrator = Arc::new(Orchestrator::new(
//!     store.clone(),
//!     Arc::new(SagaRunStore::open(&path)?),
//!     Arc::new(InMemoryDns::new()),
//!     Arc::new(InMemoryEmail::new()),
//!     SagaConfig::default(),
//! ));
//! let worker = OrchestratorWorker::new(orchestrator.clone(), bridge);
//! tokio::spawn({ let worker = worker.clone(); async move { worker.run().await } });
//!
//! let org_id = orchestrator.submit(&ctx, request)?;
//! ```

pub mod backoff;
pub mod capability;
pub mod error;
pub mod memory;
pub mod orchestrator;
pub mod quorum;
pub mod request;
pub mod run_store;
pub mod state;
pub mod worker;

pub mod prelude;

pub use backoff::Backoff;
pub use capability::{DeliveryId, DnsProvider, EmailSender, RecordId};
pub use error::{Result, SagaError};
pub use memory::{InMemoryDns, InMemoryEmail, ResolverBehavior, SentEmail};
pub use orchestrator::{Orchestrator, SagaOutcome, INVITATION_TEMPLATE};
pub use quorum::{QuorumReport, QuorumVerifier, ResolverAnswer};
pub use request::{
    AddressSpec, ContactSpec, InvitationSpec, OrganizationSpec, PhoneSpec, ProvisioningRequest,
};
pub use run_store::SagaRunStore;
pub use state::{ChildLedger, FailureCause, PlannedInvitation, SagaRun, SagaStep};
pub use worker::OrchestratorWorker;
