//! Convenience re-exports for common types.

pub use crate::capability::{DnsProvider, EmailSender};
pub use crate::error::{Result, SagaError};
pub use crate::memory::{InMemoryDns, InMemoryEmail};
pub use crate::orchestrator::{Orchestrator, SagaOutcome};
pub use crate::request::{
    AddressSpec, ContactSpec, InvitationSpec, OrganizationSpec, PhoneSpec, ProvisioningRequest,
};
pub use crate::run_store::SagaRunStore;
pub use crate::state::{SagaRun, SagaStep};
pub use crate::worker::OrchestratorWorker;
pub use tenantry_core::SagaConfig;
