use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Caller identity threaded explicitly through every append and operator call.
///
/// Issued by the external identity collaborator; tenantry treats the fields
/// as opaque.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorContext {
    pub actor_id: Uuid,
    pub organization_id: Uuid,
    pub correlation_id: Uuid,
    #[serde(default)]
    pub permissions: Vec<String>,
}

impl ActorContext {
    pub fn new(actor_id: Uuid, organization_id: Uuid) -> Self {
        Self {
            actor_id,
            organization_id,
            correlation_id: Uuid::new_v4(),
            permissions: Vec::new(),
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        self.permissions.push(permission.into());
        self
    }

    /// Same actor and correlation, scoped to another organization.
    pub fn for_organization(&self, organization_id: Uuid) -> Self {
        Self {
            organization_id,
            ..self.clone()
        }
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }
}
