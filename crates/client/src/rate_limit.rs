//! Shared outbound rate limiter for status checks.
//!
//! Responsibilities:
//! - Hand out request slots at a fixed rate (burst of one) across every clone.
//! - Serve waiters in arrival order.
//! - Optionally give up after a maximum wait.
//!
//! Does NOT handle:
//! - Cancellation; callers race `acquire` against their own token.
//!
//! Invariants:
//! - Clones share one budget; `unlimited()` never waits.
//! - Waiters queue on a fair `tokio::sync::Mutex` before touching the governor,
//!   so a late caller never overtakes an earlier one.

use std::fmt;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use capella_config::RateLimitSettings;
use governor::{DefaultDirectRateLimiter, Quota};
use tokio::sync::Mutex;

use crate::error::{ClientError, Result};

struct Governed {
    limiter: DefaultDirectRateLimiter,
    queue: Mutex<()>,
    per_second: NonZeroU32,
    max_wait: Option<Duration>,
}

/// Cloneable handle on a shared token bucket.
#[derive(Clone)]
pub struct RateLimiter {
    inner: Option<Arc<Governed>>,
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner {
            Some(g) => f
                .debug_struct("RateLimiter")
                .field("per_second", &g.per_second)
                .field("max_wait", &g.max_wait)
                .finish(),
            None => f.write_str("RateLimiter(unlimited)"),
        }
    }
}

impl RateLimiter {
    /// A limiter that never waits.
    pub fn unlimited() -> Self {
        Self { inner: None }
    }

    /// `per_second` slots per second with a burst of one. `0` means unlimited.
    pub fn per_second(per_second: u32) -> Self {
        let Some(rate) = NonZeroU32::new(per_second) else {
            return Self::unlimited();
        };
        let quota = Quota::per_second(rate).allow_burst(NonZeroU32::MIN);
        Self {
            inner: Some(Arc::new(Governed {
                limiter: governor::RateLimiter::direct(quota),
                queue: Mutex::new(()),
                per_second: rate,
                max_wait: None,
            })),
        }
    }

    pub fn from_settings(settings: &RateLimitSettings) -> Self {
        Self::per_second(settings.per_second)
    }

    /// Fail acquisitions that would wait longer than `max_wait`.
    ///
    /// Returns a new, independent limiter; existing clones keep their budget.
    pub fn with_max_wait(self, max_wait: Duration) -> Self {
        match self.inner {
            Some(g) => {
                let quota = Quota::per_second(g.per_second).allow_burst(NonZeroU32::MIN);
                Self {
                    inner: Some(Arc::new(Governed {
                        limiter: governor::RateLimiter::direct(quota),
                        queue: Mutex::new(()),
                        per_second: g.per_second,
                        max_wait: Some(max_wait),
                    })),
                }
            }
            None => self,
        }
    }

    pub fn is_limited(&self) -> bool {
        self.inner.is_some()
    }

    /// Wait for the next slot.
    ///
    /// # Errors
    /// Returns [`ClientError::LimiterAcquisitionFailed`] when the configured
    /// maximum wait elapses first.
    pub async fn acquire(&self) -> Result<()> {
        let Some(governed) = &self.inner else {
            return Ok(());
        };

        let wait = async {
            let _turn = governed.queue.lock().await;
            governed.limiter.until_ready().await;
        };

        match governed.max_wait {
            Some(max_wait) => tokio::time::timeout(max_wait, wait).await.map_err(|_| {
                ClientError::LimiterAcquisitionFailed(format!(
                    "no slot available within {max_wait:?}"
                ))
            }),
            None => {
                wait.await;
                Ok(())
            }
        }
    }
}
