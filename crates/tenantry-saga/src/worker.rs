//! Long-lived loop that turns bootstrap notifications into orchestrator runs.

use crate::error::Result;
use crate::orchestrator::{initiating_context, Orchestrator};
use crate::request::ProvisioningRequest;
use crate::state::SagaRun;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tenantry_bus::{Notification, NotificationBridge, RecvError};
use tenantry_core::BOOTSTRAP_INITIATED;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

/// Subscribes to the notification bridge and runs one saga per
/// `organization.bootstrap.initiated` fact.
///
/// At start-up every persisted run is resumed, and bootstraps still marked
/// `initiated` without a run are started from their initiating fact. The
/// same sweep runs whenever the subscription reports lost notifications.
/// Runs execute in separate tokio tasks, at most `max_concurrent_runs` at a
/// time. Duplicate wake-ups for an organization that is running, persisted or
/// finished are dropped.
pub struct OrchestratorWorker {
    orchestrator: Arc<Orchestrator>,
    bridge: Arc<NotificationBridge>,
    max_concurrent_runs: usize,
    shutdown: Arc<AtomicBool>,
    wake: Arc<Notify>,
    concurrent_runs: Arc<AtomicUsize>,
}

impl OrchestratorWorker {
    pub fn new(orchestrator: Arc<Orchestrator>, bridge: Arc<NotificationBridge>) -> Self {
        let max_concurrent_runs = orchestrator.config().max_concurrent_runs.max(1);
        Self {
            orchestrator,
            bridge,
            max_concurrent_runs,
            shutdown: Arc::new(AtomicBool::new(false)),
            wake: Arc::new(Notify::new()),
            concurrent_runs: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Run until [`shutdown`](Self::shutdown) is called, then wait for
    /// in-flight runs to finish.
    pub async fn run(&self) -> Result<()> {
        info!("Orchestrator worker starting");
        // Subscribe before resuming so wake-ups during resumption are kept.
        let mut subscription = self.bridge.subscribe();

        let pending = self.orchestrator.pending_runs()?;
        if !pending.is_empty() {
            info!(runs = pending.len(), "Resuming persisted provisioning runs");
        }
        for run in pending {
            self.wait_for_slot().await;
            self.spawn(run);
        }
        self.recover_unstarted().await;

        while !self.shutdown.load(Ordering::SeqCst) {
            tokio::select! {
                _ = self.wake.notified() => continue,
                received = subscription.recv() => match received {
                    Ok(notification) => self.handle(notification).await,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Wake-ups lost, rescanning initiated bootstraps");
                        self.recover_unstarted().await;
                    }
                    Err(RecvError::Closed) => {
                        warn!("Notification bridge closed");
                        break;
                    }
                },
            }
        }

        info!("Orchestrator worker shutting down, waiting for runs to complete");
        while self.concurrent_runs.load(Ordering::SeqCst) > 0 {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        info!("Orchestrator worker stopped");
        Ok(())
    }

    /// Signal graceful shutdown.
    pub fn shutdown(&self) {
        info!("Shutdown signal received");
        self.shutdown.store(true, Ordering::SeqCst);
        self.wake.notify_one();
    }

    /// Number of runs currently executing
    pub fn concurrent_runs(&self) -> usize {
        self.concurrent_runs.load(Ordering::SeqCst)
    }

    async fn handle(&self, notification: Notification) {
        if notification.fact_type != BOOTSTRAP_INITIATED {
            return;
        }
        let organization_id = notification.stream_id;

        match self.orchestrator.should_start(organization_id) {
            Ok(true) => {}
            Ok(false) => {
                debug!(organization_id = %organization_id, fact_id = %notification.fact_id, "Duplicate wake-up ignored");
                return;
            }
            Err(e) => {
                error!(organization_id = %organization_id, error = %e, "Failed to check run state");
                return;
            }
        }

        let request: ProvisioningRequest = match serde_json::from_value(notification.payload) {
            Ok(request) => request,
            Err(e) => {
                error!(
                    organization_id = %organization_id,
                    fact_id = %notification.fact_id,
                    error = %e,
                    "Unreadable provisioning request"
                );
                return;
            }
        };
        let ctx = initiating_context(&notification.metadata);

        match self.orchestrator.prepare(&ctx, organization_id, request) {
            Ok(run) => {
                self.wait_for_slot().await;
                self.spawn(run);
            }
            Err(e) => error!(organization_id = %organization_id, error = %e, "Failed to start provisioning run"),
        }
    }

    async fn recover_unstarted(&self) {
        let runs = match self.orchestrator.recover_unstarted() {
            Ok(runs) => runs,
            Err(e) => {
                error!(error = %e, "Failed to scan for unstarted bootstraps");
                return;
            }
        };
        if !runs.is_empty() {
            info!(runs = runs.len(), "Starting bootstraps that missed their wake-up");
        }
        for run in runs {
            self.wait_for_slot().await;
            self.spawn(run);
        }
    }

    async fn wait_for_slot(&self) {
        while self.concurrent_runs.load(Ordering::SeqCst) >= self.max_concurrent_runs {
            debug!("At concurrency limit, waiting");
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    fn spawn(&self, run: SagaRun) {
        let orchestrator = self.orchestrator.clone();
        let concurrent_runs = self.concurrent_runs.clone();
        let organization_id = run.organization_id;

        concurrent_runs.fetch_add(1, Ordering::SeqCst);

        tokio::spawn(async move {
            let result = orchestrator.resume(run).await;
            concurrent_runs.fetch_sub(1, Ordering::SeqCst);

            match result {
                Ok(outcome) => debug!(organization_id = %outcome.organization_id, "Run finished"),
                Err(e) if e.is_terminal() => {
                    warn!(organization_id = %organization_id, error = %e, "Provisioning ended without activation")
                }
                Err(e) => error!(organization_id = %organization_id, error = %e, "Provisioning run failed"),
            }
        });
    }
}

impl Clone for OrchestratorWorker {
    fn clone(&self) -> Self {
        Self {
            orchestrator: self.orchestrator.clone(),
            bridge: self.bridge.clone(),
            max_concurrent_runs: self.max_concurrent_runs,
            shutdown: self.shutdown.clone(),
            wake: self.wake.clone(),
            concurrent_runs: self.concurrent_runs.clone(),
        }
    }
}
