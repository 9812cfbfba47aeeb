//! Configuration types for the Capella client.
//!
//! Responsibilities:
//! - Define connection settings (host, TLS verification, timeouts).
//! - Define retry, polling, pagination and rate limit settings.
//! - Provide the `Config` structure combining all of the above with the credential.
//!
//! Does NOT handle:
//! - Loading from the environment (see `loader` module).
//! - Actual network connections (see client crate).
//!
//! Invariants:
//! - Default values come from `constants`, never from magic numbers.
//! - The auth token is held as a `SecretString` and never printed by `Debug`.

use secrecy::SecretString;
use std::time::Duration;

use crate::constants::{
    DEFAULT_HOST, DEFAULT_MAX_ATTEMPTS, DEFAULT_PAGE_SIZE, DEFAULT_POLL_INTERVAL_SECS,
    DEFAULT_POLL_MAX_ATTEMPTS, DEFAULT_POLL_TIMEOUT_SECS, DEFAULT_RATE_LIMIT_PER_SEC,
    DEFAULT_RETRY_BASE_DELAY_MS, DEFAULT_RETRY_MAX_DELAY_SECS, DEFAULT_RETRY_MAX_ELAPSED_SECS,
    DEFAULT_TIMEOUT_SECS,
};

/// Connection settings for the Capella control plane.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Host URL without a trailing slash (e.g. `https://cloudapi.cloud.couchbase.com`).
    pub host: String,
    /// Whether to skip TLS verification (for self-signed certificates).
    pub skip_verify: bool,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            skip_verify: false,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

/// Retry budget for transient failures.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrySettings {
    /// Attempts per call, the initial attempt included.
    pub max_attempts: u32,
    /// Delay before the first retry; doubled on every further retry.
    pub base_delay: Duration,
    /// Cap applied to a single delay.
    pub max_delay: Duration,
    /// Total time budget for one call including all retries.
    pub max_elapsed: Duration,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(DEFAULT_RETRY_BASE_DELAY_MS),
            max_delay: Duration::from_secs(DEFAULT_RETRY_MAX_DELAY_SECS),
            max_elapsed: Duration::from_secs(DEFAULT_RETRY_MAX_ELAPSED_SECS),
        }
    }
}

/// Budget for poll-until-ready watches.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollSettings {
    /// Fixed wait between poll rounds.
    pub interval: Duration,
    /// Maximum number of poll rounds.
    pub max_attempts: u32,
    /// Overall deadline for one watch.
    pub timeout: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            max_attempts: DEFAULT_POLL_MAX_ATTEMPTS,
            timeout: Duration::from_secs(DEFAULT_POLL_TIMEOUT_SECS),
        }
    }
}

/// Outbound rate limit shared by every monitor built from this config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitSettings {
    /// Requests per second; `0` disables limiting.
    pub per_second: u32,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            per_second: DEFAULT_RATE_LIMIT_PER_SEC,
        }
    }
}

/// Complete client configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub connection: ConnectionConfig,
    /// Bearer token attached to every request.
    pub auth_token: SecretString,
    pub retry: RetrySettings,
    pub polling: PollSettings,
    pub rate_limit: RateLimitSettings,
    /// `perPage` sent with paginated reads.
    pub page_size: u32,
}

impl Config {
    /// Create a config for `host` with default settings.
    pub fn with_token(host: String, auth_token: SecretString) -> Self {
        Self {
            connection: ConnectionConfig {
                host,
                ..ConnectionConfig::default()
            },
            auth_token,
            retry: RetrySettings::default(),
            polling: PollSettings::default(),
            rate_limit: RateLimitSettings::default(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}
