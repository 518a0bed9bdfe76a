//! Persisted state of one provisioning run.

use crate::request::ProvisioningRequest;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tenantry_core::ActorContext;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SagaStep {
    Init,
    CreatingAggregate,
    ProvisioningExternalRecord,
    VerifyingExternalRecord,
    GeneratingInvitations,
    SendingNotifications,
    Activated,
    CompensatingChildren,
    CompensatingAggregate,
    Failed,
}

impl SagaStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaStep::Init => "init",
            SagaStep::CreatingAggregate => "creating_aggregate",
            SagaStep::ProvisioningExternalRecord => "provisioning_external_record",
            SagaStep::VerifyingExternalRecord => "verifying_external_record",
            SagaStep::GeneratingInvitations => "generating_invitations",
            SagaStep::SendingNotifications => "sending_notifications",
            SagaStep::Activated => "activated",
            SagaStep::CompensatingChildren => "compensating_children",
            SagaStep::CompensatingAggregate => "compensating_aggregate",
            SagaStep::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SagaStep::Activated | SagaStep::Failed)
    }

    pub fn is_compensating(&self) -> bool {
        matches!(
            self,
            SagaStep::CompensatingChildren | SagaStep::CompensatingAggregate | SagaStep::Failed
        )
    }
}

impl fmt::Display for SagaStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Why a run entered compensation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureCause {
    DnsExhausted { attempts: u32, last_error: String },
    Cancelled,
    StepFailed { step: SagaStep, error: String },
}

impl FailureCause {
    pub fn stage(&self) -> &'static str {
        match self {
            FailureCause::DnsExhausted { .. } => SagaStep::VerifyingExternalRecord.as_str(),
            FailureCause::Cancelled => "cancelled",
            FailureCause::StepFailed { step, .. } => step.as_str(),
        }
    }

    pub fn message(&self) -> String {
        match self {
            FailureCause::DnsExhausted { attempts, last_error } => {
                format!("DNS not verified after {} attempts: {}", attempts, last_error)
            }
            FailureCause::Cancelled => "cancelled by operator".to_string(),
            FailureCause::StepFailed { step, error } => format!("{} failed: {}", step, error),
        }
    }
}

/// Invitation planned at `Init`; the token is fixed so resumed runs reuse it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedInvitation {
    pub id: Uuid,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub created: bool,
    pub notified: bool,
    pub delivered: bool,
}

/// Ids allocated at `Init` plus what has been appended so far.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildLedger {
    pub contact_ids: Vec<Uuid>,
    pub address_ids: Vec<Uuid>,
    pub phone_ids: Vec<Uuid>,
    pub organization_created: bool,
    pub contacts_created: usize,
    pub addresses_created: usize,
    pub phones_created: usize,
    pub links_created: usize,
    pub invitations: Vec<PlannedInvitation>,
}

impl ChildLedger {
    pub fn created_contacts(&self) -> &[Uuid] {
        &self.contact_ids[..self.contacts_created]
    }

    pub fn created_addresses(&self) -> &[Uuid] {
        &self.address_ids[..self.addresses_created]
    }

    pub fn created_phones(&self) -> &[Uuid] {
        &self.phone_ids[..self.phones_created]
    }
}

/// One run of the provisioning state machine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SagaRun {
    pub organization_id: Uuid,
    pub actor: ActorContext,
    pub request: ProvisioningRequest,
    pub step: SagaStep,
    pub skip_dns: bool,
    pub dns_attempts: u32,
    pub dns_verified: bool,
    pub record_id: Option<String>,
    pub ledger: ChildLedger,
    #[serde(default)]
    pub cancel_requested: bool,
    #[serde(default)]
    pub failure: Option<FailureCause>,
    #[serde(default)]
    pub compensation_failures: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SagaRun {
    pub fn new(organization_id: Uuid, actor: ActorContext, request: ProvisioningRequest) -> Self {
        let now = Utc::now();
        Self {
            organization_id,
            actor,
            skip_dns: !request.requires_dns(),
            request,
            step: SagaStep::Init,
            dns_attempts: 0,
            dns_verified: false,
            record_id: None,
            ledger: ChildLedger::default(),
            cancel_requested: false,
            failure: None,
            compensation_failures: Vec::new(),
            started_at: now,
            updated_at: now,
        }
    }

    /// Fully qualified record name, when the run provisions DNS
    pub fn fqdn(&self, base_domain: &str) -> Option<String> {
        self.request
            .organization
            .subdomain
            .as_ref()
            .map(|sub| format!("{}.{}", sub, base_domain))
    }

    /// Enter compensation unless already there
    pub fn fail(&mut self, cause: FailureCause) {
        if !self.step.is_compensating() {
            self.failure = Some(cause);
            self.step = SagaStep::CompensatingChildren;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::OrganizationSpec;
    use tenantry_projection::{Classification, OrganizationType};

    fn run(org_type: OrganizationType, subdomain: Option<&str>) -> SagaRun {
        let request = ProvisioningRequest::new(OrganizationSpec {
            name: "Acme".into(),
            display_name: None,
            classification: Classification::new(org_type),
            subdomain: subdomain.map(String::from),
            timezone: "UTC".into(),
        });
        SagaRun::new(Uuid::new_v4(), ActorContext::new(Uuid::new_v4(), Uuid::new_v4()), request)
    }

    #[test]
    fn skip_flag_follows_classification() {
        assert!(!run(OrganizationType::Provider, Some("acme")).skip_dns);
        assert!(run(OrganizationType::PlatformOwner, None).skip_dns);
    }

    #[test]
    fn fail_only_enters_compensation_once() {
        let mut r = run(OrganizationType::Provider, Some("acme"));
        r.step = SagaStep::SendingNotifications;
        r.fail(FailureCause::Cancelled);
        assert_eq!(r.step, SagaStep::CompensatingChildren);

        r.step = SagaStep::CompensatingAggregate;
        r.fail(FailureCause::StepFailed {
            step: SagaStep::CreatingAggregate,
            error: "late".into(),
        });
        assert_eq!(r.step, SagaStep::CompensatingAggregate);
        assert_eq!(r.failure, Some(FailureCause::Cancelled));
    }

    #[test]
    fn run_state_survives_serialization() {
        let mut r = run(OrganizationType::Provider, Some("acme"));
        r.ledger.contact_ids = vec![Uuid::new_v4(), Uuid::new_v4()];
        r.ledger.contacts_created = 1;
        r.dns_attempts = 3;
        let back: SagaRun = serde_json::from_str(&serde_json::to_string(&r).unwrap()).unwrap();
        assert_eq!(back, r);
        assert_eq!(back.ledger.created_contacts().len(), 1);
        assert_eq!(back.fqdn("tenants.local").as_deref(), Some("acme.tenants.local"));
    }
}
