//! Organization provisioning state machine.
//!
//! A run moves through
//! `Init → CreatingAggregate → ProvisioningExternalRecord → VerifyingExternalRecord
//! → GeneratingInvitations → SendingNotifications → Activated`, persisting itself
//! after every transition. Any failure switches it onto
//! `CompensatingChildren → CompensatingAggregate → Failed`, which appends
//! deletion facts in reverse creation order.
//!
//! Every state change goes through the fact store; the orchestrator never
//! writes projection rows itself.

use crate::backoff::Backoff;
use crate::capability::{DnsProvider, EmailSender};
use crate::error::{Result, SagaError};
use crate::quorum::{QuorumReport, QuorumVerifier};
use crate::request::ProvisioningRequest;
use crate::run_store::SagaRunStore;
use crate::state::{FailureCause, PlannedInvitation, SagaRun, SagaStep};
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tenantry_core::{
    observe, ActorContext, Fact, FactDraft, FactMetadata, SagaConfig, StreamType, TenantryError,
    BOOTSTRAP_INITIATED,
};
use tenantry_projection::payloads::{
    AddressCreated, BootstrapOutcome, ContactCreated, InvitationCreated, InvitationEmailFailed,
    InvitationEmailSent, LinkChanged, OrganizationCreated, PhoneCreated, SubdomainDnsCreated,
    SubdomainVerificationFailed, SubdomainVerified,
};
use tenantry_projection::{queries, LinkKind};
use tenantry_sqlite::SqliteFactStore;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Email template used for invitation notifications
pub const INVITATION_TEMPLATE: &str = "organization_invitation";

/// Summary of a successfully activated organization
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SagaOutcome {
    pub organization_id: Uuid,
    pub dns_skipped: bool,
    pub dns_attempts: u32,
    pub invitations_sent: usize,
    pub invitations_failed: usize,
}

enum DnsOutcome {
    Verified,
    Exhausted(String),
    Cancelled,
}

/// Drives provisioning runs against the fact store and external capabilities.
///
/// Runs for different organizations proceed in parallel; a single
/// organization has at most one active run in this process.
pub struct Orchestrator {
    store: Arc<SqliteFactStore>,
    runs: Arc<SagaRunStore>,
    dns: Arc<dyn DnsProvider>,
    email: Arc<dyn EmailSender>,
    verifier: QuorumVerifier,
    backoff: Backoff,
    config: SagaConfig,
    active: DashMap<Uuid, watch::Sender<bool>>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<SqliteFactStore>,
        runs: Arc<SagaRunStore>,
        dns: Arc<dyn DnsProvider>,
        email: Arc<dyn EmailSender>,
        config: SagaConfig,
    ) -> Self {
        Self {
            verifier: QuorumVerifier::from_config(dns.clone(), &config),
            backoff: Backoff::new(config.initial_backoff(), config.max_backoff()),
            store,
            runs,
            dns,
            email,
            config,
            active: DashMap::new(),
        }
    }

    pub fn config(&self) -> &SagaConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<SqliteFactStore> {
        &self.store
    }

    /// Validate a request and record the intent to provision it.
    ///
    /// Appends `organization.bootstrap.initiated` on a fresh organization
    /// stream; the worker picks the run up from the notification bridge.
    pub fn submit(&self, ctx: &ActorContext, request: ProvisioningRequest) -> Result<Uuid> {
        request.validate()?;
        self.ensure_unclaimed(&request, None)?;

        let organization_id = Uuid::new_v4();
        let ctx = ctx.for_organization(organization_id);
        self.store.append_next(
            &ctx,
            FactDraft::new(
                StreamType::Organization,
                organization_id,
                BOOTSTRAP_INITIATED,
                serde_json::to_value(&request)?,
                format!("Provisioning requested for {}", request.organization.name),
            ),
        )?;

        info!(
            organization_id = %organization_id,
            correlation_id = %ctx.correlation_id,
            "Provisioning submitted"
        );
        Ok(organization_id)
    }

    /// Run provisioning for `organization_id` to completion.
    ///
    /// Picks up the persisted run when one exists, so calling this again
    /// after a crash continues where the previous process stopped.
    pub async fn execute(
        &self,
        ctx: &ActorContext,
        organization_id: Uuid,
        request: ProvisioningRequest,
    ) -> Result<SagaOutcome> {
        let run = self.prepare(ctx, organization_id, request)?;
        self.drive(run).await
    }

    /// Load the persisted run for `organization_id`, or validate the request
    /// and persist a new one at `Init`.
    pub fn prepare(
        &self,
        ctx: &ActorContext,
        organization_id: Uuid,
        request: ProvisioningRequest,
    ) -> Result<SagaRun> {
        if let Some(run) = self.runs.load(organization_id)? {
            return Ok(run);
        }
        request.validate()?;
        let mut run = SagaRun::new(organization_id, ctx.for_organization(organization_id), request);
        self.runs.save(&mut run)?;
        Ok(run)
    }

    /// Drive a prepared or persisted run to a terminal state
    pub async fn resume(&self, run: SagaRun) -> Result<SagaOutcome> {
        self.drive(run).await
    }

    /// Runs left over from a previous process
    pub fn pending_runs(&self) -> Result<Vec<SagaRun>> {
        self.runs.list()
    }

    /// Prepare runs for bootstraps still `initiated` that have no run yet.
    ///
    /// These are submissions whose wake-up never reached a worker: nobody was
    /// subscribed, the process stopped before the run was persisted, or the
    /// subscriber lagged. The request is rebuilt from the initiating fact.
    pub fn recover_unstarted(&self) -> Result<Vec<SagaRun>> {
        let initiated = self
            .store
            .read(|conn| queries::list_bootstraps_with_status(conn, "initiated"))?;

        let mut recovered = Vec::new();
        for organization_id in initiated {
            if !self.should_start(organization_id)? {
                continue;
            }
            let initiating = self
                .store
                .stream(organization_id)?
                .into_iter()
                .find(|fact| fact.fact_type == BOOTSTRAP_INITIATED);
            let Some(fact) = initiating else {
                warn!(organization_id = %organization_id, "Bootstrap marked initiated without an initiating fact");
                continue;
            };

            let request: ProvisioningRequest = match serde_json::from_value(fact.payload) {
                Ok(request) => request,
                Err(e) => {
                    error!(
                        organization_id = %organization_id,
                        fact_id = %fact.id,
                        error = %e,
                        "Unreadable provisioning request"
                    );
                    continue;
                }
            };
            match self.prepare(&initiating_context(&fact.metadata), organization_id, request) {
                Ok(run) => recovered.push(run),
                Err(e) => {
                    error!(organization_id = %organization_id, error = %e, "Failed to recover provisioning run")
                }
            }
        }
        Ok(recovered)
    }

    pub fn is_active(&self, organization_id: Uuid) -> bool {
        self.active.contains_key(&organization_id)
    }

    pub fn active_runs(&self) -> usize {
        self.active.len()
    }

    /// Whether a wake-up for `organization_id` should start a new run.
    ///
    /// False when a run is already active here, is persisted for resumption,
    /// or the bootstrap already reached a terminal status.
    pub fn should_start(&self, organization_id: Uuid) -> Result<bool> {
        if self.is_active(organization_id) || self.runs.contains(organization_id)? {
            return Ok(false);
        }
        let status = self
            .store
            .read(|conn| queries::bootstrap_status(conn, organization_id))?;
        Ok(match status {
            Some(status) => status.status == "initiated",
            None => true,
        })
    }

    /// Ask a run to stop and compensate.
    ///
    /// An active run is interrupted at its next suspension point, including a
    /// backoff sleep or a pending provider call. A persisted but idle run is
    /// flagged and compensates as soon as it resumes. Returns false when no
    /// such run exists.
    pub fn cancel(&self, organization_id: Uuid) -> Result<bool> {
        // The registry entry stays locked until the flag is stored, so a run
        // starting concurrently either receives the signal or reads the flag.
        match self.active.entry(organization_id) {
            Entry::Occupied(active) => {
                active.get().send_replace(true);
                info!(organization_id = %organization_id, "Cancellation requested for active run");
                Ok(true)
            }
            Entry::Vacant(_idle) => {
                let flagged = self.runs.request_cancel(organization_id)?;
                if flagged {
                    info!(organization_id = %organization_id, "Cancellation recorded for idle run");
                }
                Ok(flagged)
            }
        }
    }

    async fn drive(&self, mut run: SagaRun) -> Result<SagaOutcome> {
        let organization_id = run.organization_id;
        let (sender, mut cancel) = watch::channel(run.cancel_requested);
        match self.active.entry(organization_id) {
            Entry::Occupied(_) => {
                return Err(SagaError::InvalidState(format!(
                    "provisioning run for {} is already active",
                    organization_id
                )))
            }
            Entry::Vacant(slot) => {
                slot.insert(sender);
            }
        }
        let _guard = ActiveRun {
            active: &self.active,
            organization_id,
        };
        // The caller's copy may predate a cancel recorded while idle.
        if !run.cancel_requested && self.runs.cancel_requested(organization_id)? {
            run.cancel_requested = true;
        }

        self.step_loop(&mut run, &mut cancel).await
    }

    async fn step_loop(
        &self,
        run: &mut SagaRun,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<SagaOutcome> {
        loop {
            let cancel_seen = *cancel.borrow() || run.cancel_requested;
            if cancel_seen && !run.step.is_compensating() && !run.step.is_terminal() {
                run.cancel_requested = true;
                run.fail(FailureCause::Cancelled);
            }

            info!(
                organization_id = %run.organization_id,
                step = %run.step,
                "Provisioning step"
            );

            let next = match run.step {
                SagaStep::Init => {
                    self.plan(run);
                    Ok(SagaStep::CreatingAggregate)
                }
                SagaStep::CreatingAggregate => match self.create_aggregate(run) {
                    Err(e @ SagaError::AlreadyExists { .. }) => {
                        warn!(organization_id = %run.organization_id, error = %e, "Natural key taken");
                        self.runs.delete(run.organization_id)?;
                        return Err(e);
                    }
                    Err(e) => Err(e),
                    Ok(()) if run.skip_dns => Ok(SagaStep::GeneratingInvitations),
                    Ok(()) => Ok(SagaStep::ProvisioningExternalRecord),
                },
                SagaStep::ProvisioningExternalRecord | SagaStep::VerifyingExternalRecord => {
                    match self.provision_dns(run, cancel).await {
                        Ok(DnsOutcome::Verified) => Ok(SagaStep::GeneratingInvitations),
                        Ok(DnsOutcome::Exhausted(last_error)) => {
                            let attempts = run.dns_attempts;
                            run.fail(FailureCause::DnsExhausted {
                                attempts,
                                last_error,
                            });
                            Ok(run.step)
                        }
                        Ok(DnsOutcome::Cancelled) => {
                            run.cancel_requested = true;
                            run.fail(FailureCause::Cancelled);
                            Ok(run.step)
                        }
                        Err(e) => Err(e),
                    }
                }
                SagaStep::GeneratingInvitations => {
                    self.generate_invitations(run).map(|_| SagaStep::SendingNotifications)
                }
                SagaStep::SendingNotifications => match self.send_notifications(run, cancel).await {
                    Ok(()) => self.activate(run).map(|_| SagaStep::Activated),
                    Err(SagaError::Cancelled(_)) => {
                        run.cancel_requested = true;
                        run.fail(FailureCause::Cancelled);
                        Ok(run.step)
                    }
                    Err(e) => Err(e),
                },
                SagaStep::Activated => return self.finish(run),
                SagaStep::CompensatingChildren
                | SagaStep::CompensatingAggregate
                | SagaStep::Failed => return self.compensate(run).await,
            };

            match next {
                Ok(step) => run.step = step,
                Err(e) => {
                    error!(
                        organization_id = %run.organization_id,
                        step = %run.step,
                        error = %e,
                        "Provisioning step failed"
                    );
                    let step = run.step;
                    run.fail(FailureCause::StepFailed {
                        step,
                        error: e.to_string(),
                    });
                }
            }
            self.runs.save(run)?;
        }
    }

    /// Allocate every id the run will use so a resumed run appends to the
    /// same streams.
    fn plan(&self, run: &mut SagaRun) {
        if run.ledger.contact_ids.is_empty() {
            run.ledger.contact_ids = fresh_ids(run.request.contacts.len());
            run.ledger.address_ids = fresh_ids(run.request.addresses.len());
            run.ledger.phone_ids = fresh_ids(run.request.phones.len());
        }
        if run.ledger.invitations.is_empty() {
            let expires_at = Utc::now() + chrono::Duration::seconds(self.config.invitation_ttl_secs as i64);
            run.ledger.invitations = run
                .request
                .invitations
                .iter()
                .map(|_| PlannedInvitation {
                    id: Uuid::new_v4(),
                    token: Uuid::new_v4().simple().to_string(),
                    expires_at,
                    created: false,
                    notified: false,
                    delivered: false,
                })
                .collect();
        }
    }

    /// Fail with `AlreadyExists` when another live organization owns the
    /// request's natural key: its subdomain, or its name when it has none.
    fn ensure_unclaimed(&self, request: &ProvisioningRequest, own_id: Option<Uuid>) -> Result<()> {
        let spec = &request.organization;
        let (key, existing) = self.store.read(|conn| match &spec.subdomain {
            Some(subdomain) => Ok((
                format!("subdomain '{}'", subdomain),
                queries::find_live_organization_by_subdomain(conn, subdomain)?,
            )),
            None => Ok((
                format!("name '{}'", spec.name),
                queries::find_live_organization_by_name_without_subdomain(conn, &spec.name)?,
            )),
        })?;

        match existing {
            Some(row) if Some(row.id) != own_id => Err(SagaError::AlreadyExists {
                key,
                existing_id: row.id,
            }),
            _ => Ok(()),
        }
    }

    fn create_aggregate(&self, run: &mut SagaRun) -> Result<()> {
        self.ensure_unclaimed(&run.request, Some(run.organization_id))?;
        let org_id = run.organization_id;
        let spec = run.request.organization.clone();

        self.append_once(
            run,
            StreamType::Organization,
            org_id,
            "organization.created",
            &OrganizationCreated {
                name: spec.name.clone(),
                display_name: spec.display_name.clone(),
                classification: spec.classification,
                subdomain: spec.subdomain.clone(),
                timezone: spec.timezone.clone(),
            },
            format!("Creating organization {}", spec.name),
        )?;
        run.ledger.organization_created = true;
        self.runs.save(run)?;

        for (index, contact) in run.request.contacts.clone().into_iter().enumerate() {
            let id = run.ledger.contact_ids[index];
            self.append_once(
                run,
                StreamType::Contact,
                id,
                "contact.created",
                &ContactCreated {
                    organization_id: Some(org_id),
                    first_name: contact.first_name,
                    last_name: contact.last_name,
                    email: contact.email,
                    title: contact.title,
                    label: contact.label,
                    is_primary: contact.is_primary,
                },
                "Contact created during organization bootstrap",
            )?;
            run.ledger.contacts_created = index + 1;
            self.runs.save(run)?;
        }

        for (index, address) in run.request.addresses.clone().into_iter().enumerate() {
            let id = run.ledger.address_ids[index];
            self.append_once(
                run,
                StreamType::Address,
                id,
                "address.created",
                &AddressCreated {
                    organization_id: Some(org_id),
                    label: address.label,
                    street1: address.street1,
                    street2: address.street2,
                    city: address.city,
                    state: address.state,
                    postal_code: address.postal_code,
                    country: address.country,
                    is_primary: address.is_primary,
                },
                "Address created during organization bootstrap",
            )?;
            run.ledger.addresses_created = index + 1;
            self.runs.save(run)?;
        }

        for (index, phone) in run.request.phones.clone().into_iter().enumerate() {
            let id = run.ledger.phone_ids[index];
            self.append_once(
                run,
                StreamType::Phone,
                id,
                "phone.created",
                &PhoneCreated {
                    organization_id: Some(org_id),
                    user_id: None,
                    label: phone.label,
                    number: phone.number,
                    extension: phone.extension,
                    is_primary: phone.is_primary,
                },
                "Phone created during organization bootstrap",
            )?;
            run.ledger.phones_created = index + 1;
            self.runs.save(run)?;
        }

        let links: Vec<(LinkKind, Uuid)> = run
            .ledger
            .contact_ids
            .iter()
            .map(|id| (LinkKind::OrganizationContact, *id))
            .chain(run.ledger.address_ids.iter().map(|id| (LinkKind::OrganizationAddress, *id)))
            .chain(run.ledger.phone_ids.iter().map(|id| (LinkKind::OrganizationPhone, *id)))
            .collect();
        for (kind, child_id) in links {
            self.append_once(
                run,
                StreamType::Junction,
                kind.stream_id(org_id, child_id),
                "link.created",
                &LinkChanged {
                    kind,
                    left_id: org_id,
                    right_id: child_id,
                },
                format!("Linking {} during organization bootstrap", kind.as_str()),
            )?;
            run.ledger.links_created += 1;
        }

        debug!(
            organization_id = %org_id,
            contacts = run.ledger.contacts_created,
            addresses = run.ledger.addresses_created,
            phones = run.ledger.phones_created,
            links = run.ledger.links_created,
            "Aggregate created"
        );
        Ok(())
    }

    /// Provision and verify the subdomain record, retrying the pair with
    /// exponential backoff until it verifies or attempts run out.
    async fn provision_dns(
        &self,
        run: &mut SagaRun,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<DnsOutcome> {
        let fqdn = run.fqdn(&self.config.base_domain).ok_or_else(|| {
            SagaError::InvalidState("DNS step reached without a subdomain".into())
        })?;
        let mut last_error = String::from("no attempt made");

        while !run.dns_verified {
            if run.dns_attempts >= self.config.max_dns_attempts {
                warn!(
                    organization_id = %run.organization_id,
                    fqdn = %fqdn,
                    attempts = run.dns_attempts,
                    "DNS verification exhausted"
                );
                self.append(
                    run,
                    StreamType::Organization,
                    run.organization_id,
                    "organization.subdomain.verification_failed",
                    &SubdomainVerificationFailed {
                        fqdn: fqdn.clone(),
                        attempts: run.dns_attempts,
                        last_error: last_error.clone(),
                    },
                    format!("Subdomain {} never verified", fqdn),
                )?;
                return Ok(DnsOutcome::Exhausted(last_error));
            }

            run.dns_attempts += 1;
            run.step = SagaStep::ProvisioningExternalRecord;
            self.runs.save(run)?;
            let attempt = run.dns_attempts;
            let organization_id = run.organization_id;

            let result = tokio::select! {
                result = self.dns_attempt(run, &fqdn) => result,
                _ = cancelled(cancel) => {
                    info!(organization_id = %organization_id, attempt, "DNS attempt interrupted by cancellation");
                    return Ok(DnsOutcome::Cancelled);
                }
            };
            match result {
                Ok(report) => {
                    observe::record_dns_attempt(true);
                    run.dns_verified = true;
                    info!(
                        organization_id = %run.organization_id,
                        fqdn = %fqdn,
                        attempt,
                        agreeing = report.agreeing,
                        "Subdomain verified"
                    );
                    self.append(
                        run,
                        StreamType::Organization,
                        run.organization_id,
                        "organization.subdomain.verified",
                        &SubdomainVerified {
                            fqdn: fqdn.clone(),
                            agreeing: report.agreeing,
                            total: report.total,
                            attempt,
                        },
                        format!("Subdomain {} verified by resolver quorum", fqdn),
                    )?;
                    self.runs.save(run)?;
                }
                Err(e) => {
                    observe::record_dns_attempt(false);
                    last_error = e.to_string();
                    if attempt >= self.config.max_dns_attempts {
                        continue;
                    }
                    let delay = self.backoff.delay(attempt);
                    warn!(
                        organization_id = %run.organization_id,
                        fqdn = %fqdn,
                        attempt,
                        delay_secs = delay.as_secs(),
                        error = %e,
                        "DNS attempt failed, backing off"
                    );
                    if pause(delay, cancel).await {
                        return Ok(DnsOutcome::Cancelled);
                    }
                }
            }
        }

        Ok(DnsOutcome::Verified)
    }

    async fn dns_attempt(&self, run: &mut SagaRun, fqdn: &str) -> Result<QuorumReport> {
        let target = self.config.dns_target.clone();
        let limit = self.config.provider_timeout();
        let record_id = tokio::time::timeout(limit, self.dns.create_record(fqdn, &target))
            .await
            .map_err(|_| {
                SagaError::Provider(format!("creating record for {} timed out after {:?}", fqdn, limit))
            })??;

        if run.record_id.as_deref() != Some(record_id.as_str()) {
            self.append(
                run,
                StreamType::Organization,
                run.organization_id,
                "organization.subdomain.dns_created",
                &SubdomainDnsCreated {
                    fqdn: fqdn.to_string(),
                    target: target.clone(),
                    record_id: record_id.clone(),
                },
                format!("DNS record created for {}", fqdn),
            )?;
            run.record_id = Some(record_id);
        }

        run.step = SagaStep::VerifyingExternalRecord;
        self.runs.save(run)?;
        self.verifier.verify(fqdn, &target).await
    }

    fn generate_invitations(&self, run: &mut SagaRun) -> Result<()> {
        for index in 0..run.ledger.invitations.len() {
            if run.ledger.invitations[index].created {
                continue;
            }
            let planned = run.ledger.invitations[index].clone();
            let spec = run.request.invitations[index].clone();
            self.append_once(
                run,
                StreamType::Invitation,
                planned.id,
                "invitation.created",
                &InvitationCreated {
                    organization_id: run.organization_id,
                    email: spec.email,
                    first_name: spec.first_name,
                    last_name: spec.last_name,
                    role: spec.role,
                    token: planned.token,
                    expires_at: planned.expires_at,
                },
                "Invitation generated during organization bootstrap",
            )?;
            run.ledger.invitations[index].created = true;
            self.runs.save(run)?;
        }
        Ok(())
    }

    /// Send one email per invitation. A failed or timed-out send is recorded
    /// on the invitation and does not fail the run; cancellation does.
    async fn send_notifications(
        &self,
        run: &mut SagaRun,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<()> {
        let limit = self.config.provider_timeout();
        let organization = &run.request.organization;
        let organization_name = organization
            .display_name
            .clone()
            .unwrap_or_else(|| organization.name.clone());

        for index in 0..run.ledger.invitations.len() {
            if run.ledger.invitations[index].notified {
                continue;
            }
            let planned = run.ledger.invitations[index].clone();
            let spec = run.request.invitations[index].clone();
            let data = json!({
                "organization_name": organization_name,
                "first_name": spec.first_name,
                "role": spec.role,
                "accept_url": format!(
                    "{}/{}",
                    self.config.invitation_base_url.trim_end_matches('/'),
                    planned.token
                ),
                "expires_at": planned.expires_at.to_rfc3339(),
            });

            let sent = tokio::select! {
                sent = tokio::time::timeout(limit, self.email.send(&spec.email, INVITATION_TEMPLATE, &data)) => {
                    sent.unwrap_or_else(|_| {
                        Err(SagaError::Provider(format!("email to {} timed out after {:?}", spec.email, limit)))
                    })
                }
                _ = cancelled(cancel) => return Err(SagaError::Cancelled(run.organization_id)),
            };

            let delivered = match sent {
                Ok(delivery_id) => {
                    debug!(invitation_id = %planned.id, delivery_id = %delivery_id, "Invitation sent");
                    self.append(
                        run,
                        StreamType::Invitation,
                        planned.id,
                        "invitation.email_sent",
                        &InvitationEmailSent { delivery_id },
                        "Invitation email handed to the mail provider",
                    )?;
                    true
                }
                Err(e) => {
                    warn!(
                        invitation_id = %planned.id,
                        email = %spec.email,
                        error = %e,
                        "Invitation email failed"
                    );
                    self.append(
                        run,
                        StreamType::Invitation,
                        planned.id,
                        "invitation.email_failed",
                        &InvitationEmailFailed {
                            error: e.to_string(),
                        },
                        "Invitation email could not be delivered",
                    )?;
                    false
                }
            };

            run.ledger.invitations[index].notified = true;
            run.ledger.invitations[index].delivered = delivered;
            self.runs.save(run)?;
        }
        Ok(())
    }

    fn activate(&self, run: &mut SagaRun) -> Result<()> {
        let org_id = run.organization_id;
        self.append(
            run,
            StreamType::Organization,
            org_id,
            "organization.activated",
            &json!({}),
            "Organization bootstrap finished, activating",
        )?;
        self.append(
            run,
            StreamType::Organization,
            org_id,
            "organization.bootstrap.completed",
            &BootstrapOutcome::default(),
            "Organization bootstrap completed",
        )?;
        Ok(())
    }

    fn finish(&self, run: &mut SagaRun) -> Result<SagaOutcome> {
        self.runs.delete(run.organization_id)?;
        let outcome = SagaOutcome {
            organization_id: run.organization_id,
            dns_skipped: run.skip_dns,
            dns_attempts: run.dns_attempts,
            invitations_sent: run.ledger.invitations.iter().filter(|i| i.delivered).count(),
            invitations_failed: run
                .ledger
                .invitations
                .iter()
                .filter(|i| i.notified && !i.delivered)
                .count(),
        };
        observe::record_saga_outcome("activated");
        info!(
            organization_id = %outcome.organization_id,
            dns_attempts = outcome.dns_attempts,
            invitations_sent = outcome.invitations_sent,
            "Organization activated"
        );
        Ok(outcome)
    }

    /// Best-effort rollback in reverse creation order: invitations, the DNS
    /// record, phones, addresses, contacts, then the organization itself.
    async fn compensate(&self, run: &mut SagaRun) -> Result<SagaOutcome> {
        let cause = run.failure.clone().unwrap_or(FailureCause::StepFailed {
            step: run.step,
            error: "unknown failure".into(),
        });
        warn!(
            organization_id = %run.organization_id,
            stage = cause.stage(),
            cause = %cause.message(),
            "Compensating provisioning run"
        );

        if run.step == SagaStep::CompensatingChildren {
            let invitations: Vec<Uuid> = run
                .ledger
                .invitations
                .iter()
                .filter(|i| i.created)
                .map(|i| i.id)
                .collect();
            for id in invitations.into_iter().rev() {
                self.undo(run, StreamType::Invitation, id, "invitation.revoked");
            }
            if let Some(record_id) = run.record_id.clone() {
                self.remove_record(run, &record_id).await;
            }
            for id in run.ledger.created_phones().to_vec().into_iter().rev() {
                self.undo(run, StreamType::Phone, id, "phone.deleted");
            }
            for id in run.ledger.created_addresses().to_vec().into_iter().rev() {
                self.undo(run, StreamType::Address, id, "address.deleted");
            }
            for id in run.ledger.created_contacts().to_vec().into_iter().rev() {
                self.undo(run, StreamType::Contact, id, "contact.deleted");
            }
            run.step = SagaStep::CompensatingAggregate;
            self.runs.save(run)?;
        }

        if run.step == SagaStep::CompensatingAggregate {
            if run.ledger.organization_created {
                let org_id = run.organization_id;
                self.undo(run, StreamType::Organization, org_id, "organization.deleted");
            }

            let (fact_type, reason) = match cause {
                FailureCause::Cancelled => (
                    "organization.bootstrap.cancelled",
                    "Organization bootstrap cancelled by operator",
                ),
                _ => (
                    "organization.bootstrap.failed",
                    "Organization bootstrap failed and was rolled back",
                ),
            };
            let outcome = BootstrapOutcome {
                stage: Some(cause.stage().to_string()),
                error: Some(cause.message()),
                compensation_failures: run.compensation_failures.clone(),
            };
            if let Err(e) = self.append(
                run,
                StreamType::Organization,
                run.organization_id,
                fact_type,
                &outcome,
                reason,
            ) {
                error!(organization_id = %run.organization_id, error = %e, "Recording bootstrap outcome failed");
                run.compensation_failures.push(format!("{}: {}", fact_type, e));
            }
            run.step = SagaStep::Failed;
            self.runs.save(run)?;
        }

        self.runs.delete(run.organization_id)?;
        observe::record_saga_outcome(match cause {
            FailureCause::Cancelled => "cancelled",
            _ => "compensated",
        });
        let failures = std::mem::take(&mut run.compensation_failures);
        Err(match cause {
            FailureCause::DnsExhausted { attempts, .. } => SagaError::RetriesExhausted {
                attempts,
                compensation_failures: failures.len(),
            },
            FailureCause::Cancelled => SagaError::Cancelled(run.organization_id),
            other if !failures.is_empty() => SagaError::CompensationPartialFailure {
                cause: other.message(),
                failures,
            },
            other => SagaError::Compensated {
                stage: other.stage().to_string(),
                error: other.message(),
            },
        })
    }

    /// Delete the provisioned DNS record, collecting any failure so the
    /// outcome names what is left for manual cleanup.
    async fn remove_record(&self, run: &mut SagaRun, record_id: &str) {
        let Some(fqdn) = run.fqdn(&self.config.base_domain) else {
            return;
        };
        let limit = self.config.provider_timeout();
        let result = match tokio::time::timeout(limit, self.dns.delete_record(&fqdn, record_id)).await {
            Ok(result) => result,
            Err(_) => Err(SagaError::Provider(format!(
                "deleting record for {} timed out after {:?}",
                fqdn, limit
            ))),
        };

        match result {
            Ok(()) => {
                info!(organization_id = %run.organization_id, fqdn = %fqdn, record_id, "DNS record removed");
                run.record_id = None;
            }
            Err(e) => {
                error!(
                    organization_id = %run.organization_id,
                    fqdn = %fqdn,
                    record_id,
                    error = %e,
                    "DNS record left in place"
                );
                run.compensation_failures
                    .push(format!("dns record {} for {}: {}", record_id, fqdn, e));
            }
        }
    }

    /// Append one deletion fact, logging and collecting any failure.
    fn undo(&self, run: &mut SagaRun, stream_type: StreamType, id: Uuid, fact_type: &str) {
        let result = self.append_once(
            run,
            stream_type,
            id,
            fact_type,
            &json!({}),
            "Rolling back failed organization bootstrap",
        );
        if let Err(e) = result {
            error!(
                organization_id = %run.organization_id,
                stream_id = %id,
                fact_type,
                error = %e,
                "Compensation step failed"
            );
            run.compensation_failures
                .push(format!("{} {}: {}", fact_type, id, e));
        }
    }

    /// Append unless the stream already holds a fact of this type.
    fn append_once<P: Serialize>(
        &self,
        run: &SagaRun,
        stream_type: StreamType,
        stream_id: Uuid,
        fact_type: &str,
        payload: &P,
        reason: impl Into<String>,
    ) -> Result<()> {
        let exists = self
            .store
            .stream(stream_id)?
            .iter()
            .any(|fact| fact.fact_type == fact_type);
        if exists {
            debug!(stream_id = %stream_id, fact_type, "Fact already recorded, skipping");
            return Ok(());
        }
        self.append(run, stream_type, stream_id, fact_type, payload, reason)
            .map(|_| ())
    }

    /// Append and treat a failed projection as a failed step.
    fn append<P: Serialize>(
        &self,
        run: &SagaRun,
        stream_type: StreamType,
        stream_id: Uuid,
        fact_type: &str,
        payload: &P,
        reason: impl Into<String>,
    ) -> Result<Fact> {
        let fact = self.store.append_next(
            &run.actor,
            FactDraft::new(
                stream_type,
                stream_id,
                fact_type,
                serde_json::to_value(payload)?,
                reason,
            ),
        )?;
        if let Some(message) = &fact.processing_error {
            return Err(TenantryError::HandlerFailure(format!(
                "{} on {}: {}",
                fact_type, stream_id, message
            ))
            .into());
        }
        Ok(fact)
    }
}

struct ActiveRun<'a> {
    active: &'a DashMap<Uuid, watch::Sender<bool>>,
    organization_id: Uuid,
}

impl Drop for ActiveRun<'_> {
    fn drop(&mut self) {
        self.active.remove(&self.organization_id);
    }
}

/// Actor context a run inherits from the fact that initiated it
pub fn initiating_context(metadata: &FactMetadata) -> ActorContext {
    ActorContext::new(metadata.actor_id, metadata.organization_id)
        .with_correlation_id(metadata.correlation_id)
}

fn fresh_ids(n: usize) -> Vec<Uuid> {
    (0..n).map(|_| Uuid::new_v4()).collect()
}

/// Sleep for `delay`; true when cancelled first.
async fn pause(delay: Duration, cancel: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => false,
        _ = cancelled(cancel) => true,
    }
}

/// Resolves once cancellation is signalled; never if the sender is gone.
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    if cancel.wait_for(|flag| *flag).await.is_err() {
        futures::future::pending::<()>().await;
    }
}
