use crate::error::{Result, TenantryError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the SQLite fact store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path to the SQLite database file
    pub path: PathBuf,

    /// Enable WAL mode
    /// Default: true
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,

    /// SQLite synchronous mode
    #[serde(default)]
    pub synchronous: SynchronousMode,

    /// How long a writer waits on a locked database before failing
    /// Default: 5000ms
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,

    /// Minimum reason length in characters
    /// Default: 10
    #[serde(default = "default_reason_min_len")]
    pub reason_min_len: usize,

    /// Maximum reason length in characters
    /// Default: 1000
    #[serde(default = "default_reason_max_len")]
    pub reason_max_len: usize,

    /// How deep handler follow-up facts may cascade within one append
    /// Default: 8
    #[serde(default = "default_max_cascade_depth")]
    pub max_cascade_depth: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum SynchronousMode {
    /// Full fsync (safest, slowest)
    Full,
    /// fsync at critical moments (good balance)
    #[default]
    Normal,
    /// No fsync (fastest, least safe)
    Off,
}

impl SynchronousMode {
    pub fn as_pragma(&self) -> &'static str {
        match self {
            SynchronousMode::Full => "FULL",
            SynchronousMode::Normal => "NORMAL",
            SynchronousMode::Off => "OFF",
        }
    }
}

fn default_wal_mode() -> bool {
    true
}

fn default_busy_timeout() -> u64 {
    5000
}

fn default_reason_min_len() -> usize {
    10
}

fn default_reason_max_len() -> usize {
    1000
}

fn default_max_cascade_depth() -> usize {
    8
}

impl StoreConfig {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            wal_mode: default_wal_mode(),
            synchronous: SynchronousMode::default(),
            busy_timeout_ms: default_busy_timeout(),
            reason_min_len: default_reason_min_len(),
            reason_max_len: default_reason_max_len(),
            max_cascade_depth: default_max_cascade_depth(),
        }
    }

    pub fn with_synchronous(mut self, synchronous: SynchronousMode) -> Self {
        self.synchronous = synchronous;
        self
    }

    pub fn with_wal_mode(mut self, wal_mode: bool) -> Self {
        self.wal_mode = wal_mode;
        self
    }

    pub fn with_max_cascade_depth(mut self, depth: usize) -> Self {
        self.max_cascade_depth = depth;
        self
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.reason_min_len > self.reason_max_len {
            return Err(TenantryError::Config(format!(
                "reason_min_len ({}) exceeds reason_max_len ({})",
                self.reason_min_len, self.reason_max_len
            )));
        }
        if self.max_cascade_depth == 0 {
            return Err(TenantryError::Config(
                "max_cascade_depth must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
