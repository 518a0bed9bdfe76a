pub mod facts;
pub mod rebuild;
pub mod runs;
pub mod status;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tenantry::prelude::*;
use tenantry::{OperatorSurface, PermissionPolicy};

pub fn load_config(db_path: PathBuf, config_path: Option<&Path>) -> Result<PlatformConfig> {
    match config_path {
        Some(path) => PlatformConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => Ok(PlatformConfig::new(db_path)),
    }
}

/// Platform-admin context for operator commands
pub fn operator_context(actor: Option<Uuid>) -> ActorContext {
    let actor_id = actor.unwrap_or_else(Uuid::nil);
    ActorContext::new(actor_id, Uuid::nil()).with_permission(PermissionPolicy::PLATFORM_ADMIN)
}

pub fn open_store(config: &PlatformConfig) -> Result<Arc<SqliteFactStore>> {
    let store = SqliteFactStore::open(config.store.clone(), tenantry::HandlerRegistry::standard())
        .with_context(|| format!("Failed to open database {}", config.store.path.display()))?;
    Ok(Arc::new(store))
}

pub fn open_operator(config: &PlatformConfig) -> Result<OperatorSurface> {
    let store = open_store(config)?;
    Ok(OperatorSurface::new(store, Arc::new(PermissionPolicy::default())))
}
