use crate::error::{Result, TenantryError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the provisioning orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SagaConfig {
    /// Zone under which tenant subdomains are created
    #[serde(default = "default_base_domain")]
    pub base_domain: String,

    /// Value every tenant record must resolve to
    #[serde(default = "default_dns_target")]
    pub dns_target: String,

    /// Independent resolvers consulted by the quorum verifier
    #[serde(default = "default_resolvers")]
    pub resolvers: Vec<String>,

    /// Agreeing resolvers required for a verified record
    /// Default: 2
    #[serde(default = "default_quorum")]
    pub quorum: usize,

    /// Per-resolver query timeout
    /// Default: 5000ms
    #[serde(default = "default_resolver_timeout")]
    pub resolver_timeout_ms: u64,

    /// Limit on a single DNS record creation or email send
    /// Default: 30000ms
    #[serde(default = "default_provider_timeout")]
    pub provider_timeout_ms: u64,

    /// First delay between provision+verify attempts
    /// Default: 10s
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_secs: u64,

    /// Ceiling for the doubling delay
    /// Default: 300s
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,

    /// Total provision+verify attempts before compensation
    /// Default: 7
    #[serde(default = "default_max_dns_attempts")]
    pub max_dns_attempts: u32,

    /// How long an invitation token stays valid
    /// Default: 7 days
    #[serde(default = "default_invitation_ttl")]
    pub invitation_ttl_secs: u64,

    /// Base URL embedded in invitation emails
    #[serde(default = "default_invitation_url")]
    pub invitation_base_url: String,

    /// Runs a worker drives at the same time
    /// Default: 16
    #[serde(default = "default_max_concurrent_runs")]
    pub max_concurrent_runs: usize,
}

fn default_base_domain() -> String {
    "tenants.local".to_string()
}

fn default_dns_target() -> String {
    "ingress.tenants.local".to_string()
}

fn default_resolvers() -> Vec<String> {
    vec![
        "1.1.1.1".to_string(),
        "8.8.8.8".to_string(),
        "9.9.9.9".to_string(),
    ]
}

fn default_quorum() -> usize {
    2
}

fn default_resolver_timeout() -> u64 {
    5000
}

fn default_provider_timeout() -> u64 {
    30_000
}

fn default_initial_backoff() -> u64 {
    10
}

fn default_max_backoff() -> u64 {
    300
}

fn default_max_dns_attempts() -> u32 {
    7
}

fn default_invitation_ttl() -> u64 {
    7 * 24 * 60 * 60
}

fn default_invitation_url() -> String {
    "https://app.tenants.local/accept-invitation".to_string()
}

fn default_max_concurrent_runs() -> usize {
    16
}

impl Default for SagaConfig {
    fn default() -> Self {
        Self {
            base_domain: default_base_domain(),
            dns_target: default_dns_target(),
            resolvers: default_resolvers(),
            quorum: default_quorum(),
            resolver_timeout_ms: default_resolver_timeout(),
            provider_timeout_ms: default_provider_timeout(),
            initial_backoff_secs: default_initial_backoff(),
            max_backoff_secs: default_max_backoff(),
            max_dns_attempts: default_max_dns_attempts(),
            invitation_ttl_secs: default_invitation_ttl(),
            invitation_base_url: default_invitation_url(),
            max_concurrent_runs: default_max_concurrent_runs(),
        }
    }
}

impl SagaConfig {
    pub fn with_base_domain(mut self, domain: impl Into<String>) -> Self {
        self.base_domain = domain.into();
        self
    }

    pub fn with_dns_target(mut self, target: impl Into<String>) -> Self {
        self.dns_target = target.into();
        self
    }

    pub fn with_resolvers(mut self, resolvers: Vec<String>) -> Self {
        self.resolvers = resolvers;
        self
    }

    pub fn with_max_dns_attempts(mut self, attempts: u32) -> Self {
        self.max_dns_attempts = attempts;
        self
    }

    pub fn with_provider_timeout(mut self, timeout: Duration) -> Self {
        self.provider_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_max_concurrent_runs(mut self, max: usize) -> Self {
        self.max_concurrent_runs = max;
        self
    }

    pub fn resolver_timeout(&self) -> Duration {
        Duration::from_millis(self.resolver_timeout_ms)
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_millis(self.provider_timeout_ms)
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_secs(self.initial_backoff_secs)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs)
    }

    pub fn invitation_ttl(&self) -> Duration {
        Duration::from_secs(self.invitation_ttl_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.resolvers.is_empty() {
            return Err(TenantryError::Config("at least one resolver is required".into()));
        }
        if self.quorum == 0 || self.quorum > self.resolvers.len() {
            return Err(TenantryError::Config(format!(
                "quorum must be between 1 and {} (resolver count), got {}",
                self.resolvers.len(),
                self.quorum
            )));
        }
        if self.provider_timeout_ms == 0 {
            return Err(TenantryError::Config("provider_timeout_ms must be positive".into()));
        }
        if self.max_dns_attempts == 0 {
            return Err(TenantryError::Config("max_dns_attempts must be at least 1".into()));
        }
        if self.initial_backoff_secs > self.max_backoff_secs {
            return Err(TenantryError::Config(
                "initial_backoff_secs exceeds max_backoff_secs".into(),
            ));
        }
        Ok(())
    }
}
