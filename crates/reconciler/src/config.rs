//! Engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Configuration for a reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Quantity mutations per bulk call.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Read-back retries per quantity batch.
    #[serde(default = "default_verify_attempts")]
    pub verify_attempts: u32,

    /// Linear backoff step between read-backs: retry `n` waits `n` steps.
    #[serde(default = "default_verify_backoff_ms")]
    pub verify_backoff_ms: u64,

    /// Timeout applied to every external call.
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,

    /// Items reconciled in flight. 1 keeps the sequential reference order.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Destination calls per second. 0 disables the limiter.
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,

    /// Synthesize `null` for template keys the destination lacks.
    #[serde(default)]
    pub keep_missing: bool,

    /// Plan without calling any writer.
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            verify_attempts: default_verify_attempts(),
            verify_backoff_ms: default_verify_backoff_ms(),
            call_timeout_secs: default_call_timeout_secs(),
            concurrency: default_concurrency(),
            requests_per_second: default_requests_per_second(),
            keep_missing: false,
            dry_run: false,
        }
    }
}

impl EngineConfig {
    /// Create a config with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` naming the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::invalid_config("batch_size must be greater than 0"));
        }

        if self.verify_attempts == 0 {
            return Err(Error::invalid_config(
                "verify_attempts must be greater than 0",
            ));
        }

        if self.call_timeout_secs == 0 {
            return Err(Error::invalid_config(
                "call_timeout_secs must be greater than 0",
            ));
        }

        if self.concurrency == 0 {
            return Err(Error::invalid_config("concurrency must be greater than 0"));
        }

        Ok(())
    }

    /// Timeout for one external call.
    #[must_use]
    pub const fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    /// Wait before read-back retry `attempt` (1-based).
    #[must_use]
    pub fn verify_backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.verify_backoff_ms.saturating_mul(u64::from(attempt)))
    }

    /// Enable dry-run mode.
    #[must_use]
    pub const fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

fn default_batch_size() -> usize {
    50
}

fn default_verify_attempts() -> u32 {
    3
}

fn default_verify_backoff_ms() -> u64 {
    500
}

fn default_call_timeout_secs() -> u64 {
    30
}

fn default_concurrency() -> usize {
    1
}

fn default_requests_per_second() -> u32 {
    2
}
