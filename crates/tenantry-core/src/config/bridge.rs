use serde::{Deserialize, Serialize};

/// Fact type that asks the orchestrator to provision an organization
pub const BOOTSTRAP_INITIATED: &str = "organization.bootstrap.initiated";

/// Configuration for the notification bridge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Fact types forwarded to subscribers after commit
    #[serde(default = "default_allow_list")]
    pub allow_list: Vec<String>,

    /// Broadcast buffer per subscriber; slow subscribers lag past this
    /// Default: 1024
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_allow_list() -> Vec<String> {
    vec![BOOTSTRAP_INITIATED.to_string()]
}

fn default_channel_capacity() -> usize {
    1024
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            allow_list: default_allow_list(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl BridgeConfig {
    pub fn with_allowed(mut self, fact_type: impl Into<String>) -> Self {
        self.allow_list.push(fact_type.into());
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }
}
