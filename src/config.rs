//! Store configuration.
//!
//! Read from JSON; every field is optional and falls back to its default:
//! ```json
//! {
//!   "default_isolation": "read_committed",
//!   "lock_timeout_ms": null,
//!   "retry": { "max_attempts": 5, "min_backoff_ms": 100, "max_backoff_ms": 400 }
//! }
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, ThothError};
use crate::TransactionIsolation;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ThothConfig {
    /// Isolation level of transactions started without an explicit one.
    pub default_isolation: TransactionIsolation,
    /// Upper bound on waiting for an exclusive row lock. `None` waits forever.
    pub lock_timeout_ms: Option<u64>,
    pub retry: RetryConfig,
}

/// Bounds of the optimistic retry loop.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    /// Inclusive lower bound of the randomized backoff.
    pub min_backoff_ms: u64,
    /// Exclusive upper bound of the randomized backoff.
    pub max_backoff_ms: u64,
}

impl Default for ThothConfig {
    fn default() -> Self {
        Self {
            default_isolation: TransactionIsolation::ReadCommitted,
            lock_timeout_ms: None,
            retry: RetryConfig::default(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            min_backoff_ms: 100,
            max_backoff_ms: 400,
        }
    }
}

impl ThothConfig {
    /// Parses and validates a JSON configuration.
    pub fn from_json_str(content: &str) -> Result<Self> {
        let config: ThothConfig = serde_json::from_str(content)
            .map_err(|e| ThothError::ConfigError(format!("invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the configuration file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ThothError::ConfigError(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            return Err(ThothError::ConfigError(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.retry.min_backoff_ms > self.retry.max_backoff_ms {
            return Err(ThothError::ConfigError(format!(
                "retry.min_backoff_ms ({}) exceeds retry.max_backoff_ms ({})",
                self.retry.min_backoff_ms, self.retry.max_backoff_ms
            )));
        }
        Ok(())
    }

    pub fn lock_timeout(&self) -> Option<Duration> {
        self.lock_timeout_ms.map(Duration::from_millis)
    }
}
