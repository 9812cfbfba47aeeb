//! Retry policy for transient failures.
//!
//! Delays grow as `base * 2^(retry - 1)`, are capped at `max_delay`, and get
//! `±jitter` applied. A `Retry-After` hint from the server raises the delay,
//! never lowers it. The total time spent on one call never exceeds `max_elapsed`.

use std::time::Duration;

use capella_config::RetrySettings;
use capella_config::constants::DEFAULT_RETRY_JITTER;

use crate::error::ClientError;

/// Backoff and budget applied by `CapellaClient::execute_with_policy`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Attempts per call, the initial attempt included.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Fraction of each delay added or removed at random, in `[0, 1)`.
    pub jitter: f64,
    pub max_elapsed: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetrySettings::default())
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            base_delay: settings.base_delay,
            max_delay: settings.max_delay,
            jitter: DEFAULT_RETRY_JITTER,
            max_elapsed: settings.max_elapsed,
        }
    }
}

impl RetryPolicy {
    /// A single attempt, no retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (1-based), before jitter.
    pub fn nominal_backoff(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Delay before retry number `retry` (1-based), jitter applied.
    pub fn backoff(&self, retry: u32) -> Duration {
        let nominal = self.nominal_backoff(retry);
        let jitter = self.jitter.clamp(0.0, 0.99);
        if jitter == 0.0 {
            return nominal;
        }
        let factor = 1.0 + jitter * (fastrand::f64() * 2.0 - 1.0);
        nominal.mul_f64(factor)
    }

    /// Delay before retrying after `err`, honouring `Retry-After`.
    pub fn delay_for(&self, retry: u32, err: &ClientError) -> Duration {
        let backoff = self.backoff(retry);
        match err.retry_after() {
            Some(hint) => backoff.max(hint),
            None => backoff,
        }
    }
}
