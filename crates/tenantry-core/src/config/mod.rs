pub mod bridge;
pub mod saga;
pub mod store;

pub use bridge::BridgeConfig;
pub use saga::SagaConfig;
pub use store::{StoreConfig, SynchronousMode};

use crate::error::{Result, TenantryError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration bundling every component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    pub store: StoreConfig,

    #[serde(default)]
    pub bridge: BridgeConfig,

    #[serde(default)]
    pub saga: SagaConfig,
}

impl PlatformConfig {
    pub fn new(path: PathBuf) -> Self {
        Self {
            store: StoreConfig::new(path),
            bridge: BridgeConfig::default(),
            saga: SagaConfig::default(),
        }
    }

    /// Load from a JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| TenantryError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.store.validate()?;
        self.saga.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_json_fills_defaults() {
        let config: PlatformConfig =
            serde_json::from_str(r#"{"store": {"path": "/tmp/tenantry.db"}}"#).unwrap();
        assert_eq!(config.store.reason_min_len, 10);
        assert_eq!(config.saga.max_dns_attempts, 7);
        assert_eq!(config.saga.resolvers.len(), 3);
        assert_eq!(config.saga.provider_timeout().as_secs(), 30);
        assert_eq!(
            config.bridge.allow_list,
            vec!["organization.bootstrap.initiated".to_string()]
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn from_file_rejects_bad_quorum() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tenantry.json");
        std::fs::write(
            &path,
            r#"{"store": {"path": "/tmp/t.db"}, "saga": {"quorum": 5}}"#,
        )
        .unwrap();
        assert!(matches!(
            PlatformConfig::from_file(&path),
            Err(TenantryError::Config(_))
        ));
    }
}
