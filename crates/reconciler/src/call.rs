//! Guard around external calls: token-bucket rate limit, finite timeout and
//! cancellation.

use std::future::Future;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::EngineConfig;
use crate::error::{Error, Result};

/// Wraps every external call of a pass.
#[derive(Clone)]
pub struct CallGuard {
    limiter: Option<Arc<DefaultDirectRateLimiter>>,
    timeout: Duration,
    cancel: CancellationToken,
}

impl CallGuard {
    /// Create a guard from the engine configuration.
    pub fn new(config: &EngineConfig, cancel: CancellationToken) -> Self {
        let limiter = NonZeroU32::new(config.requests_per_second)
            .map(|rate| Arc::new(RateLimiter::direct(Quota::per_second(rate))));
        Self {
            limiter,
            timeout: config.call_timeout(),
            cancel,
        }
    }

    /// Whether the pass has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Run a call with timeout and cancellation.
    ///
    /// # Errors
    ///
    /// Returns `Error::Cancelled` if the token fires first, `Error::Transport`
    /// on timeout, or the call's own error.
    pub async fn call<T, F>(&self, operation: &str, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if self.cancel.is_cancelled() {
            return Err(Error::cancelled(operation));
        }
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(Error::cancelled(operation)),
            result = tokio::time::timeout(self.timeout, call) => match result {
                Ok(result) => result,
                Err(_) => Err(Error::transport(
                    operation,
                    format!("timed out after {}s", self.timeout.as_secs()),
                )),
            },
        }
    }

    /// Run a destination call: waits for the rate limiter first.
    ///
    /// # Errors
    ///
    /// As [`CallGuard::call`].
    pub async fn destination<T, F>(&self, operation: &str, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if let Some(limiter) = &self.limiter {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Err(Error::cancelled(operation)),
                () = limiter.until_ready() => {}
            }
        }
        debug!(operation, "Destination call");
        self.call(operation, call).await
    }

    /// Run a call with the timeout only. For writes that must follow one
    /// already made, so a cancel cannot split them.
    ///
    /// # Errors
    ///
    /// Returns `Error::Transport` on timeout, or the call's own error.
    pub async fn settle<T, F>(&self, operation: &str, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(Error::transport(
                operation,
                format!("timed out after {}s", self.timeout.as_secs()),
            )),
        }
    }

    /// Sleep unless cancelled.
    ///
    /// # Errors
    ///
    /// Returns `Error::Cancelled` if the token fires during the sleep.
    pub async fn sleep(&self, operation: &str, duration: Duration) -> Result<()> {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(Error::cancelled(operation)),
            () = tokio::time::sleep(duration) => Ok(()),
        }
    }
}
