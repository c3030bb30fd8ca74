//! Bounded compare-and-swap retry loop.
//!
//! Each handler attempt reads a record, applies the event to a fresh entity
//! and tries a conditional write. When the write loses the race the attempt
//! reports [`Attempt::Conflict`], everything it produced is dropped, and the
//! loop sleeps a jittered backoff before starting over from the read.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tradelab_store::EntityKey;

use crate::error::DispatchError;

/// Exponent cap for the backoff doubling.
const MAX_BACKOFF_EXPONENT: u32 = 16;

/// Outcome of one read-modify-write attempt.
#[derive(Debug)]
pub enum Attempt<T> {
    /// The conditional write succeeded.
    Committed(T),
    /// The record moved between read and write.
    Conflict {
        /// Version found in the store at write time.
        found: u64,
    },
}

impl<T> Attempt<T> {
    /// Transform the committed value, keeping conflicts as they are.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Attempt<U> {
        match self {
            Self::Committed(value) => Attempt::Committed(f(value)),
            Self::Conflict { found } => Attempt::Conflict { found },
        }
    }
}

/// Retry budget and backoff shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts before giving up.
    pub max_attempts: u32,
    /// Base of the exponential backoff ceiling.
    pub base_backoff: Duration,
    /// Upper bound of any single backoff.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 64,
            base_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(50),
        }
    }
}

impl RetryPolicy {
    /// A policy that retries immediately, for tests.
    pub const fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Upper bound of the sleep after `conflicts` consecutive conflicts:
    /// `min(max_backoff, base_backoff * 2^conflicts)`.
    pub fn ceiling(&self, conflicts: u32) -> Duration {
        let exponent = conflicts.min(MAX_BACKOFF_EXPONENT);
        self.base_backoff
            .saturating_mul(1_u32 << exponent)
            .min(self.max_backoff)
    }

    /// A uniformly random sleep in `[0, ceiling(conflicts)]` (full jitter).
    pub fn backoff(&self, conflicts: u32, rng: &mut impl Rng) -> Duration {
        let ceiling = u64::try_from(self.ceiling(conflicts).as_micros()).unwrap_or(u64::MAX);
        Duration::from_micros(rng.random_range(0..=ceiling))
    }

    /// Run `attempt` until it commits, fails, or the budget is spent.
    ///
    /// # Errors
    ///
    /// Propagates the first non-conflict error unchanged, or returns
    /// [`DispatchError::RetriesExhausted`] after `max_attempts` conflicts.
    pub async fn run<T, F, Fut>(&self, key: &EntityKey, mut attempt: F) -> Result<T, DispatchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Attempt<T>, DispatchError>>,
    {
        let mut conflicts: u32 = 0;
        loop {
            match attempt().await? {
                Attempt::Committed(value) => {
                    if conflicts > 0 {
                        tracing::debug!(%key, conflicts, "committed after retry");
                    }
                    return Ok(value);
                }
                Attempt::Conflict { found } => {
                    conflicts = conflicts.saturating_add(1);
                    if conflicts >= self.max_attempts {
                        tracing::warn!(%key, attempts = conflicts, "retry budget exhausted");
                        return Err(DispatchError::RetriesExhausted {
                            key: key.to_string(),
                            attempts: conflicts,
                        });
                    }
                    let delay = {
                        let mut rng = rand::rng();
                        self.backoff(conflicts, &mut rng)
                    };
                    tracing::warn!(
                        %key,
                        found_version = found,
                        conflicts,
                        delay_us = u64::try_from(delay.as_micros()).unwrap_or(u64::MAX),
                        "version conflict, backing off"
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
    }
}
