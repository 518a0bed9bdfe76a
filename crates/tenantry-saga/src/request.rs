//! What a provisioning run is asked to create.

use serde::{Deserialize, Serialize};
use tenantry_core::TenantryError;
use tenantry_projection::Classification;

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrganizationSpec {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(flatten)]
    pub classification: Classification,
    /// Required when the classification needs its own DNS record
    #[serde(default)]
    pub subdomain: Option<String>,
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactSpec {
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

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressSpec {
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

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhoneSpec {
    #[serde(default)]
    pub label: Option<String>,
    pub number: String,
    #[serde(default)]
    pub extension: Option<String>,
    #[serde(default)]
    pub is_primary: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvitationSpec {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default = "default_role")]
    pub role: String,
}

fn default_role() -> String {
    "administrator".to_string()
}

/// Full request, carried as the payload of `organization.bootstrap.initiated`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvisioningRequest {
    pub organization: OrganizationSpec,
    #[serde(default)]
    pub contacts: Vec<ContactSpec>,
    #[serde(default)]
    pub addresses: Vec<AddressSpec>,
    #[serde(default)]
    pub phones: Vec<PhoneSpec>,
    #[serde(default)]
    pub invitations: Vec<InvitationSpec>,
}

impl ProvisioningRequest {
    pub fn new(organization: OrganizationSpec) -> Self {
        Self {
            organization,
            contacts: Vec::new(),
            addresses: Vec::new(),
            phones: Vec::new(),
            invitations: Vec::new(),
        }
    }

    pub fn with_contact(mut self, contact: ContactSpec) -> Self {
        self.contacts.push(contact);
        self
    }

    pub fn with_address(mut self, address: AddressSpec) -> Self {
        self.addresses.push(address);
        self
    }

    pub fn with_phone(mut self, phone: PhoneSpec) -> Self {
        self.phones.push(phone);
        self
    }

    pub fn with_invitation(mut self, invitation: InvitationSpec) -> Self {
        self.invitations.push(invitation);
        self
    }

    /// Whether the DNS steps run for this organization
    pub fn requires_dns(&self) -> bool {
        self.organization.classification.requires_dns()
    }

    /// Reject requests that cannot be provisioned, before anything is appended.
    pub fn validate(&self) -> Result<()> {
        let org = &self.organization;
        if org.name.trim().is_empty() {
            return Err(invalid("organization name is required"));
        }

        match (&org.subdomain, self.requires_dns()) {
            (None, true) => {
                return Err(invalid(format!(
                    "{} organizations need a subdomain",
                    org.classification.org_type.as_str()
                )))
            }
            (Some(sub), _) if !is_valid_label(sub) => {
                return Err(invalid(format!("'{}' is not a valid subdomain label", sub)))
            }
            _ => {}
        }

        for contact in &self.contacts {
            if !contact.email.contains('@') {
                return Err(invalid(format!("contact email '{}' is malformed", contact.email)));
            }
        }
        for invitation in &self.invitations {
            if !invitation.email.contains('@') {
                return Err(invalid(format!(
                    "invitation email '{}' is malformed",
                    invitation.email
                )));
            }
        }
        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> crate::error::SagaError {
    TenantryError::Validation(message.into()).into()
}

/// Lowercase DNS label: 1-63 of `[a-z0-9-]`, not starting or ending in `-`.
fn is_valid_label(label: &str) -> bool {
    !label.is_empty()
        && label.len() <= 63
        && !label.starts_with('-')
        && !label.ends_with('-')
        && label
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;
    use tenantry_projection::{OrganizationType, PartnerType};

    fn spec(classification: Classification, subdomain: Option<&str>) -> OrganizationSpec {
        OrganizationSpec {
            name: "Acme Health".into(),
            display_name: None,
            classification,
            subdomain: subdomain.map(String::from),
            timezone: "UTC".into(),
        }
    }

    #[test]
    fn dns_classifications_need_a_subdomain() {
        let provider = ProvisioningRequest::new(spec(Classification::new(OrganizationType::Provider), None));
        assert!(provider.validate().is_err());

        let family = ProvisioningRequest::new(spec(Classification::partner(PartnerType::Family), None));
        family.validate().unwrap();
        assert!(!family.requires_dns());
    }

    #[test]
    fn subdomain_must_be_a_dns_label() {
        let provider = Classification::new(OrganizationType::Provider);
        for bad in ["", "-acme", "acme-", "Acme", "acme.health", "a_b"] {
            assert!(ProvisioningRequest::new(spec(provider, Some(bad))).validate().is_err(), "{}", bad);
        }
        ProvisioningRequest::new(spec(provider, Some("acme-health-2"))).validate().unwrap();
    }

    #[test]
    fn request_round_trips_as_fact_payload() {
        let request = ProvisioningRequest::new(spec(Classification::partner(PartnerType::Var), Some("var1")))
            .with_invitation(InvitationSpec {
                email: "owner@var1.example".into(),
                first_name: "Vera".into(),
                last_name: "Rossi".into(),
                role: default_role(),
            });
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["organization"]["org_type"], "provider_partner");
        let back: ProvisioningRequest = serde_json::from_value(value).unwrap();
        assert_eq!(back, request);
    }
}
