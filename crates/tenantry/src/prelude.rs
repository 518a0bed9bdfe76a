//! Tenantry Prelude
//!
//! Import this to get all commonly used types and traits:
//!
//! ```
//! use tenantry::prelude::*;
//! ```

// Core types
pub use crate::{ActorContext, Fact, FactDraft, FactId, Result, SagaError, StreamType, TenantryError};

// Configs
pub use crate::{BridgeConfig, PlatformConfig, SagaConfig, StoreConfig};

// Traits
pub use crate::{AccessPolicy, DnsProvider, EmailSender, FactPublisher, ProjectionHandler};

// Implementations
pub use crate::{
    InMemoryDns, InMemoryEmail, NotificationBridge, Orchestrator, OrchestratorWorker, Platform,
    SqliteFactStore,
};

// Provisioning requests
pub use crate::{
    AddressSpec, Classification, ContactSpec, InvitationSpec, OrganizationSpec, OrganizationType,
    PartnerType, PhoneSpec, ProvisioningRequest,
};

pub use uuid::Uuid;
