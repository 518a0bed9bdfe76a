//! One handle over store, bridge, orchestrator and operator surface

use std::sync::Arc;
use tenantry_bus::NotificationBridge;
use tenantry_core::{AccessPolicy, ActorContext, PermissionPolicy, PlatformConfig, SagaConfig};
use tenantry_projection::queries::{self, BootstrapStatus, OrganizationRow};
use tenantry_projection::HandlerRegistry;
use tenantry_saga::{
    DnsProvider, EmailSender, Orchestrator, OrchestratorWorker, ProvisioningRequest, Result,
    SagaRunStore,
};
use tenantry_sqlite::{OperatorSurface, SqliteFactStore};
use uuid::Uuid;

/// Bundles the fact store, notification bridge, orchestrator and operator
/// surface wired the standard way.
///
/// - Facts and saga runs share one SQLite database file
/// - The bridge is installed as the store's publisher
/// - The operator surface requires `platform.admin` unless another policy is given
pub struct Platform {
    store: Arc<SqliteFactStore>,
    bridge: Arc<NotificationBridge>,
    orchestrator: Arc<Orchestrator>,
    operator: OperatorSurface,
    config: PlatformConfig,
}

impl Platform {
    /// Open the platform database described by `config`
    pub fn open(
        config: PlatformConfig,
        dns: Arc<dyn DnsProvider>,
        email: Arc<dyn EmailSender>,
    ) -> Result<Self> {
        Self::open_with_policy(config, dns, email, Arc::new(PermissionPolicy::default()))
    }

    /// Open with a custom operator access policy
    pub fn open_with_policy(
        config: PlatformConfig,
        dns: Arc<dyn DnsProvider>,
        email: Arc<dyn EmailSender>,
        policy: Arc<dyn AccessPolicy>,
    ) -> Result<Self> {
        config.validate()?;
        let bridge = Arc::new(NotificationBridge::new(&config.bridge));
        let store = Arc::new(
            SqliteFactStore::open(config.store.clone(), HandlerRegistry::standard())?
                .with_publisher(bridge.clone()),
        );
        let runs = Arc::new(SagaRunStore::open(&config.store.path)?);

        tracing::info!(path = %config.store.path.display(), "Platform opened");
        Ok(Self::assemble(store, runs, bridge, dns, email, policy, config))
    }

    /// Volatile platform for tests and demos. Nothing survives the process.
    pub fn open_in_memory(
        saga: SagaConfig,
        dns: Arc<dyn DnsProvider>,
        email: Arc<dyn EmailSender>,
    ) -> Result<Self> {
        let mut config = PlatformConfig::new(":memory:".into());
        config.saga = saga;
        config.validate()?;

        let bridge = Arc::new(NotificationBridge::new(&config.bridge));
        let store = Arc::new(
            SqliteFactStore::open_in_memory(HandlerRegistry::standard())?
                .with_publisher(bridge.clone()),
        );
        let runs = Arc::new(SagaRunStore::open_in_memory()?);
        let policy: Arc<dyn AccessPolicy> = Arc::new(PermissionPolicy::default());
        Ok(Self::assemble(store, runs, bridge, dns, email, policy, config))
    }

    fn assemble(
        store: Arc<SqliteFactStore>,
        runs: Arc<SagaRunStore>,
        bridge: Arc<NotificationBridge>,
        dns: Arc<dyn DnsProvider>,
        email: Arc<dyn EmailSender>,
        policy: Arc<dyn AccessPolicy>,
        config: PlatformConfig,
    ) -> Self {
        let orchestrator = Arc::new(Orchestrator::new(
            store.clone(),
            runs,
            dns,
            email,
            config.saga.clone(),
        ));
        let operator = OperatorSurface::new(store.clone(), policy);
        Self {
            store,
            bridge,
            orchestrator,
            operator,
            config,
        }
    }

    pub fn store(&self) -> &Arc<SqliteFactStore> {
        &self.store
    }

    pub fn bridge(&self) -> &Arc<NotificationBridge> {
        &self.bridge
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    pub fn operator(&self) -> &OperatorSurface {
        &self.operator
    }

    pub fn config(&self) -> &PlatformConfig {
        &self.config
    }

    /// A worker bound to this platform's bridge and orchestrator.
    ///
    /// Spawn `worker.run()` on a tokio runtime; keep a clone to call
    /// `shutdown()`.
    pub fn worker(&self) -> OrchestratorWorker {
        OrchestratorWorker::new(self.orchestrator.clone(), self.bridge.clone())
    }

    /// Record a provisioning request; a running worker carries it out.
    pub fn submit(&self, ctx: &ActorContext, request: ProvisioningRequest) -> Result<Uuid> {
        self.orchestrator.submit(ctx, request)
    }

    pub fn organization(&self, organization_id: Uuid) -> Result<Option<OrganizationRow>> {
        Ok(self
            .store
            .read(|conn| queries::get_organization(conn, organization_id))?)
    }

    pub fn bootstrap_status(&self, organization_id: Uuid) -> Result<Option<BootstrapStatus>> {
        Ok(self
            .store
            .read(|conn| queries::bootstrap_status(conn, organization_id))?)
    }
}
