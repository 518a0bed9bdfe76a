use crate::error::{Result, TenantryError};
use crate::types::ActorContext;

/// Authorization hook for operator-facing operations.
///
/// Policy evaluation belongs to the external authorization collaborator;
/// tenantry only asks the question.
pub trait AccessPolicy: Send + Sync {
    fn authorize(&self, actor: &ActorContext, operation: &str) -> Result<()>;
}

/// Requires a single named permission in the actor's permission set.
#[derive(Debug, Clone)]
pub struct PermissionPolicy {
    permission: String,
}

impl PermissionPolicy {
    pub const PLATFORM_ADMIN: &'static str = "platform.admin";

    pub fn new(permission: impl Into<String>) -> Self {
        Self {
            permission: permission.into(),
        }
    }
}

impl Default for PermissionPolicy {
    fn default() -> Self {
        Self::new(Self::PLATFORM_ADMIN)
    }
}

impl AccessPolicy for PermissionPolicy {
    fn authorize(&self, actor: &ActorContext, operation: &str) -> Result<()> {
        if actor.has_permission(&self.permission) {
            Ok(())
        } else {
            Err(TenantryError::Unauthorized(format!(
                "{} requires '{}' (actor {})",
                operation, self.permission, actor.actor_id
            )))
        }
    }
}

/// Accepts every caller. For embedded use where the gateway already checked.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl AccessPolicy for AllowAll {
    fn authorize(&self, _actor: &ActorContext, _operation: &str) -> Result<()> {
        Ok(())
    }
}
