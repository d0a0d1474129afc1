//! Bounded exponential backoff for transient chain RPC failures.

use std::{future::Future, time::Duration};

use derive_new::new;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::{ChainCommunicationError, ChainResult};

/// Delay before the first retry is scaled from this base
pub const BASE_RPC_RETRY_DELAY: Duration = Duration::from_secs(1);
/// Upper bound of a single backoff
pub const MAX_RPC_RETRY_DELAY: Duration = Duration::from_secs(30);
/// Total number of attempts, including the first one
pub const RPC_MAX_RETRY_ATTEMPTS: u32 = 5;
/// Growth factor between consecutive backoffs
pub const RETRY_POWER: u32 = 3;

/// How often and how patiently an RPC call is retried
#[derive(Debug, Clone, Copy, PartialEq, Eq, new)]
pub struct RetryPolicy {
    /// Total number of attempts
    pub max_attempts: u32,
    /// Base delay
    pub base_delay: Duration,
    /// Cap of a single delay
    pub max_delay: Duration,
    /// Growth factor
    pub power: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: RPC_MAX_RETRY_ATTEMPTS,
            base_delay: BASE_RPC_RETRY_DELAY,
            max_delay: MAX_RPC_RETRY_DELAY,
            power: RETRY_POWER,
        }
    }
}

impl RetryPolicy {
    /// Delay slept after the `failures`-th failed attempt
    pub fn delay_for(&self, failures: u32) -> Duration {
        self.power
            .checked_pow(failures)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    /// Run `op` until it succeeds, the attempts are used up or `cancel` fires.
    ///
    /// Cancellation is checked before every attempt and while sleeping; an
    /// already cancelled token makes no attempt at all. When the attempts are
    /// used up the error of the last attempt is returned.
    #[instrument(level = "debug", skip_all, fields(max_attempts = self.max_attempts))]
    pub async fn retry<T, F, Fut>(&self, cancel: &CancellationToken, mut op: F) -> ChainResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ChainResult<T>>,
    {
        let mut failures = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(ChainCommunicationError::Cancelled);
            }
            let err = match op().await {
                Ok(v) => return Ok(v),
                Err(err) => err,
            };
            failures += 1;
            if failures >= self.max_attempts {
                debug!(attempts = failures, "Giving up after max attempts");
                return Err(err);
            }
            let delay = self.delay_for(failures);
            warn!(?err, attempt = failures, ?delay, "Request failed, retrying");
            tokio::select! {
                _ = cancel.cancelled() => return Err(ChainCommunicationError::Cancelled),
                _ = sleep(delay) => {}
            }
        }
    }
}

/// [`RetryPolicy::retry`] with the default policy
pub async fn retry<T, F, Fut>(cancel: &CancellationToken, op: F) -> ChainResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ChainResult<T>>,
{
    RetryPolicy::default().retry(cancel, op).await
}
