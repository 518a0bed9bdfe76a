//! Typed payloads for every fact the standard handlers understand.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tenantry_core::StreamType;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrganizationType {
    Provider,
    ProviderPartner,
    PlatformOwner,
}

impl OrganizationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrganizationType::Provider => "provider",
            OrganizationType::ProviderPartner => "provider_partner",
            OrganizationType::PlatformOwner => "platform_owner",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartnerType {
    /// Value-added reseller; hosts its own tenant subdomain
    Var,
    Family,
    Court,
    Other,
}

impl PartnerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PartnerType::Var => "var",
            PartnerType::Family => "family",
            PartnerType::Court => "court",
            PartnerType::Other => "other",
        }
    }
}

/// Entity classification deciding which provisioning steps apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub org_type: OrganizationType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partner_type: Option<PartnerType>,
}

impl Classification {
    pub fn new(org_type: OrganizationType) -> Self {
        Self {
            org_type,
            partner_type: None,
        }
    }

    pub fn partner(partner_type: PartnerType) -> Self {
        Self {
            org_type: OrganizationType::ProviderPartner,
            partner_type: Some(partner_type),
        }
    }

    /// Providers and VAR partners are reachable on their own subdomain.
    pub fn requires_dns(&self) -> bool {
        match self.org_type {
            OrganizationType::Provider => true,
            OrganizationType::ProviderPartner => self.partner_type == Some(PartnerType::Var),
            OrganizationType::PlatformOwner => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrganizationCreated {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(flatten)]
    pub classification: Classification,
    #[serde(default)]
    pub subdomain: Option<String>,
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrganizationUpdated {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubdomainDnsCreated {
    pub fqdn: String,
    pub target: String,
    pub record_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubdomainVerified {
    pub fqdn: String,
    pub agreeing: usize,
    pub total: usize,
    pub attempt: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubdomainVerificationFailed {
    pub fqdn: String,
    pub attempts: u32,
    pub last_error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BootstrapOutcome {
    #[serde(default)]
    pub stage: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub compensation_failures: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactCreated {
    #[serde(default)]
    pub organization_id: Option<Uuid>,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub is_primary: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContactUpdated {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressCreated {
    #[serde(default)]
    pub organization_id: Option<Uuid>,
    #[serde(default)]
    pub label: Option<String>,
    pub street1: String,
    #[serde(default)]
    pub street2: Option<String>,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    #[serde(default = "default_country")]
    pub country: String,
    #[serde(default)]
    pub is_primary: bool,
}

fn default_country() -> String {
    "US".to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AddressUpdated {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub street1: Option<String>,
    #[serde(default)]
    pub street2: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
}

/// Phones belong either to an organization or to a single user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhoneCreated {
    #[serde(default)]
    pub organization_id: Option<Uuid>,
    #[serde(default)]
    pub user_id: Option<Uuid>,
    #[serde(default)]
    pub label: Option<String>,
    pub number: String,
    #[serde(default)]
    pub extension: Option<String>,
    #[serde(default)]
    pub is_primary: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhoneUpdated {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub number: Option<String>,
    #[serde(default)]
    pub extension: Option<String>,
}

/// Junction kinds, each backed by one link table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkKind {
    OrganizationContact,
    OrganizationAddress,
    OrganizationPhone,
    ContactPhone,
    ContactAddress,
}

const LINK_NAMESPACE: Uuid = Uuid::from_u128(0x6c1f_4b8e_9a0d_4e55_b2a7_3d91_c0de_11a5);

impl LinkKind {
    pub const ALL: [LinkKind; 5] = [
        LinkKind::OrganizationContact,
        LinkKind::OrganizationAddress,
        LinkKind::OrganizationPhone,
        LinkKind::ContactPhone,
        LinkKind::ContactAddress,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LinkKind::OrganizationContact => "organization_contact",
            LinkKind::OrganizationAddress => "organization_address",
            LinkKind::OrganizationPhone => "organization_phone",
            LinkKind::ContactPhone => "contact_phone",
            LinkKind::ContactAddress => "contact_address",
        }
    }

    pub fn table(&self) -> &'static str {
        match self {
            LinkKind::OrganizationContact => "organization_contacts",
            LinkKind::OrganizationAddress => "organization_addresses",
            LinkKind::OrganizationPhone => "organization_phones",
            LinkKind::ContactPhone => "contact_phones",
            LinkKind::ContactAddress => "contact_addresses",
        }
    }

    /// Stream kinds on the (left, right) sides of the link
    pub fn sides(&self) -> (StreamType, StreamType) {
        match self {
            LinkKind::OrganizationContact => (StreamType::Organization, StreamType::Contact),
            LinkKind::OrganizationAddress => (StreamType::Organization, StreamType::Address),
            LinkKind::OrganizationPhone => (StreamType::Organization, StreamType::Phone),
            LinkKind::ContactPhone => (StreamType::Contact, StreamType::Phone),
            LinkKind::ContactAddress => (StreamType::Contact, StreamType::Address),
        }
    }

    pub fn columns(&self) -> (&'static str, &'static str) {
        let (left, right) = self.sides();
        (column_for(left), column_for(right))
    }

    /// Deterministic stream id, so creation and removal land on one stream.
    pub fn stream_id(&self, left_id: Uuid, right_id: Uuid) -> Uuid {
        let name = format!("{}:{}:{}", self.as_str(), left_id, right_id);
        Uuid::new_v5(&LINK_NAMESPACE, name.as_bytes())
    }
}

fn column_for(stream_type: StreamType) -> &'static str {
    match stream_type {
        StreamType::Organization => "organization_id",
        StreamType::Contact => "contact_id",
        StreamType::Address => "address_id",
        StreamType::Phone => "phone_id",
        StreamType::Junction => "link_id",
        StreamType::Invitation => "invitation_id",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkChanged {
    pub kind: LinkKind,
    pub left_id: Uuid,
    pub right_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvitationCreated {
    pub organization_id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: String,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvitationEmailSent {
    pub delivery_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvitationEmailFailed {
    pub error: String,
}
