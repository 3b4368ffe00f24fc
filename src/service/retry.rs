use std::time::Duration;

use log::{debug, error, warn};
use rand::Rng;

use crate::account::AccountId;
use crate::config::RetryConfig;
use crate::errors::{Result, ThothError};

/// Bounds of the optimistic retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub min_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            min_backoff: Duration::from_millis(config.min_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }
}

impl RetryPolicy {
    /// A delay drawn uniformly from `[min_backoff, max_backoff)`.
    ///
    /// Returns `min_backoff` when the interval is empty.
    pub fn backoff(&self) -> Duration {
        let min = self.min_backoff.as_millis() as u64;
        let max = self.max_backoff.as_millis() as u64;
        if min >= max {
            return self.min_backoff;
        }
        Duration::from_millis(rand::rng().random_range(min..max))
    }
}

/// Suspends the calling thread between attempts.
///
/// Injected so tests can observe backoff without waiting for it.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// Sleeps on the real clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Runs `op` until it succeeds, fails terminally, or runs out of attempts.
///
/// `op` receives the 1-based attempt number and should run one complete unit
/// of work. A retryable error ([`ThothError::is_retryable`]) is followed by a
/// randomized backoff and another attempt; there is no sleep after the last
/// one. Any other error is returned as is.
///
/// # Errors
///
/// [`ThothError::RetryExhausted`] once `max_attempts` attempts (at least one)
/// have all failed with retryable errors.
pub fn retry_on_conflict<T, F>(
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
    account: AccountId,
    mut op: F,
) -> Result<T>
where
    F: FnMut(u32) -> Result<T>,
{
    let max_attempts = policy.max_attempts.max(1);
    for attempt in 1..=max_attempts {
        match op(attempt) {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() => {
                warn!(
                    "Attempt {}/{} on account {} hit a conflict: {}",
                    attempt, max_attempts, account, e
                );
                if attempt < max_attempts {
                    let delay = policy.backoff();
                    debug!("Backing off {:?} before retrying account {}", delay, account);
                    sleeper.sleep(delay);
                }
            }
            Err(e) => return Err(e),
        }
    }
    error!(
        "Giving up on account {} after {} attempts",
        account, max_attempts
    );
    Err(ThothError::RetryExhausted {
        account,
        attempts: max_attempts,
    })
}
