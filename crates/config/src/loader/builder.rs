//! Builder-pattern configuration loader.
//!
//! Responsibilities:
//! - Collect optional overrides from code, `.env` files, and `CAPELLA_*` variables.
//! - Validate every value against its documented bounds in `build()`.
//! - Fill unset values from `constants`.
//!
//! Does NOT handle:
//! - Parsing individual environment variables (see env.rs).
//!
//! Invariants / Assumptions:
//! - Later calls override earlier ones; `from_env()` overrides prior `with_*` calls.
//! - `load_dotenv()` must be called explicitly to enable `.env` file loading.
//! - The `DOTENV_DISABLED` variable is checked before `dotenvy::dotenv()` is called.

use secrecy::SecretString;
use std::time::Duration;

use super::env::apply_env;
use super::error::ConfigError;
use crate::constants::{
    DEFAULT_HOST, DEFAULT_MAX_ATTEMPTS, DEFAULT_PAGE_SIZE, DEFAULT_POLL_INTERVAL_SECS,
    DEFAULT_POLL_MAX_ATTEMPTS, DEFAULT_POLL_TIMEOUT_SECS, DEFAULT_RATE_LIMIT_PER_SEC,
    DEFAULT_RETRY_BASE_DELAY_MS, DEFAULT_RETRY_MAX_DELAY_SECS, DEFAULT_RETRY_MAX_ELAPSED_SECS,
    DEFAULT_TIMEOUT_SECS, MAX_MAX_ATTEMPTS, MAX_PAGE_SIZE, MAX_POLL_TIMEOUT_SECS,
    MAX_RATE_LIMIT_PER_SEC, MAX_TIMEOUT_SECS,
};
use crate::types::{Config, ConnectionConfig, PollSettings, RateLimitSettings, RetrySettings};

/// Configuration loader that builds config from code overrides and environment variables.
#[derive(Default)]
pub struct ConfigLoader {
    host: Option<String>,
    auth_token: Option<SecretString>,
    skip_verify: Option<bool>,
    timeout: Option<Duration>,
    max_attempts: Option<u32>,
    retry_base_delay: Option<Duration>,
    retry_max_elapsed: Option<Duration>,
    poll_interval: Option<Duration>,
    poll_max_attempts: Option<u32>,
    poll_timeout: Option<Duration>,
    rate_limit_per_sec: Option<u32>,
    page_size: Option<u32>,
}

impl ConfigLoader {
    /// Create a new configuration loader with nothing set.
    pub fn new() -> Self {
        Self::default()
    }

    fn dotenv_disabled() -> bool {
        matches!(
            std::env::var("DOTENV_DISABLED").ok().as_deref(),
            Some("true") | Some("1")
        )
    }

    /// Load environment variables from a `.env` file if present.
    ///
    /// Skipped entirely when `DOTENV_DISABLED` is `true` or `1`. A missing
    /// file is not an error.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::DotenvParse` on invalid syntax and
    /// `ConfigError::DotenvIo` when the file exists but cannot be read.
    /// Neither includes the offending line.
    pub fn load_dotenv(self) -> Result<Self, ConfigError> {
        if Self::dotenv_disabled() {
            return Ok(self);
        }

        match dotenvy::dotenv() {
            Ok(path) => {
                tracing::debug!(path = %path.display(), "Loaded .env file");
                Ok(self)
            }
            Err(dotenvy::Error::Io(io_err)) if io_err.kind() == std::io::ErrorKind::NotFound => {
                Ok(self)
            }
            Err(dotenvy::Error::LineParse(_, idx)) => {
                Err(ConfigError::DotenvParse { error_index: idx })
            }
            Err(dotenvy::Error::Io(io_err)) => Err(ConfigError::DotenvIo {
                kind: io_err.kind(),
            }),
            Err(_) => Err(ConfigError::DotenvUnknown),
        }
    }

    /// Read configuration from `CAPELLA_*` environment variables.
    pub fn from_env(mut self) -> Result<Self, ConfigError> {
        apply_env(&mut self)?;
        Ok(self)
    }

    pub fn with_host(mut self, host: String) -> Self {
        self.host = Some(host);
        self
    }

    pub fn with_auth_token(mut self, token: String) -> Self {
        self.auth_token = Some(SecretString::new(token.into()));
        self
    }

    pub fn with_skip_verify(mut self, skip: bool) -> Self {
        self.skip_verify = Some(skip);
        self
    }

    /// Set the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the number of attempts per call, the initial attempt included.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = Some(delay);
        self
    }

    pub fn with_retry_max_elapsed(mut self, budget: Duration) -> Self {
        self.retry_max_elapsed = Some(budget);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    pub fn with_poll_max_attempts(mut self, rounds: u32) -> Self {
        self.poll_max_attempts = Some(rounds);
        self
    }

    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = Some(timeout);
        self
    }

    /// Set the shared status-check rate; `0` disables limiting.
    pub fn with_rate_limit_per_sec(mut self, rate: u32) -> Self {
        self.rate_limit_per_sec = Some(rate);
        self
    }

    pub fn with_page_size(mut self, size: u32) -> Self {
        self.page_size = Some(size);
        self
    }

    pub(crate) fn set_host(&mut self, host: Option<String>) {
        self.host = host;
    }

    pub(crate) fn set_auth_token(&mut self, token: Option<SecretString>) {
        self.auth_token = token;
    }

    pub(crate) fn set_skip_verify(&mut self, skip: Option<bool>) {
        self.skip_verify = skip;
    }

    pub(crate) fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    pub(crate) fn set_max_attempts(&mut self, attempts: Option<u32>) {
        self.max_attempts = attempts;
    }

    pub(crate) fn set_retry_base_delay(&mut self, delay: Option<Duration>) {
        self.retry_base_delay = delay;
    }

    pub(crate) fn set_retry_max_elapsed(&mut self, budget: Option<Duration>) {
        self.retry_max_elapsed = budget;
    }

    pub(crate) fn set_poll_interval(&mut self, interval: Option<Duration>) {
        self.poll_interval = interval;
    }

    pub(crate) fn set_poll_max_attempts(&mut self, rounds: Option<u32>) {
        self.poll_max_attempts = rounds;
    }

    pub(crate) fn set_poll_timeout(&mut self, timeout: Option<Duration>) {
        self.poll_timeout = timeout;
    }

    pub(crate) fn set_rate_limit_per_sec(&mut self, rate: Option<u32>) {
        self.rate_limit_per_sec = rate;
    }

    pub(crate) fn set_page_size(&mut self, size: Option<u32>) {
        self.page_size = size;
    }

    /// Build the final configuration.
    pub fn build(self) -> Result<Config, ConfigError> {
        let host = validate_and_normalize_host(self.host.as_deref().unwrap_or(DEFAULT_HOST))?;
        let auth_token = self.auth_token.ok_or(ConfigError::MissingAuthToken)?;

        let connection = ConnectionConfig {
            host,
            skip_verify: self.skip_verify.unwrap_or(false),
            timeout: self
                .timeout
                .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
        };
        validate_timeout(connection.timeout)?;

        let retry = RetrySettings {
            max_attempts: self.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS),
            base_delay: self
                .retry_base_delay
                .unwrap_or(Duration::from_millis(DEFAULT_RETRY_BASE_DELAY_MS)),
            max_delay: Duration::from_secs(DEFAULT_RETRY_MAX_DELAY_SECS),
            max_elapsed: self
                .retry_max_elapsed
                .unwrap_or(Duration::from_secs(DEFAULT_RETRY_MAX_ELAPSED_SECS)),
        };
        validate_retry(&retry)?;

        let polling = PollSettings {
            interval: self
                .poll_interval
                .unwrap_or(Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS)),
            max_attempts: self.poll_max_attempts.unwrap_or(DEFAULT_POLL_MAX_ATTEMPTS),
            timeout: self
                .poll_timeout
                .unwrap_or(Duration::from_secs(DEFAULT_POLL_TIMEOUT_SECS)),
        };
        validate_polling(&polling)?;

        let rate_limit = RateLimitSettings {
            per_second: self.rate_limit_per_sec.unwrap_or(DEFAULT_RATE_LIMIT_PER_SEC),
        };
        if rate_limit.per_second > MAX_RATE_LIMIT_PER_SEC {
            return Err(ConfigError::InvalidRateLimit {
                message: format!(
                    "must be between 0 and {} requests per second (got {})",
                    MAX_RATE_LIMIT_PER_SEC, rate_limit.per_second
                ),
            });
        }

        let page_size = self.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
        if page_size == 0 || page_size > MAX_PAGE_SIZE {
            return Err(ConfigError::InvalidPageSize {
                message: format!("must be between 1 and {} (got {})", MAX_PAGE_SIZE, page_size),
            });
        }

        Ok(Config {
            connection,
            auth_token,
            retry,
            polling,
            rate_limit,
            page_size,
        })
    }
}

fn validate_timeout(timeout: Duration) -> Result<(), ConfigError> {
    if timeout.is_zero() {
        return Err(ConfigError::InvalidTimeout {
            message: "timeout must be greater than 0 seconds".to_string(),
        });
    }
    if timeout.as_secs() > MAX_TIMEOUT_SECS {
        return Err(ConfigError::InvalidTimeout {
            message: format!(
                "timeout exceeds maximum allowed value of {} seconds",
                MAX_TIMEOUT_SECS
            ),
        });
    }
    Ok(())
}

fn validate_retry(retry: &RetrySettings) -> Result<(), ConfigError> {
    if retry.max_attempts == 0 || retry.max_attempts > MAX_MAX_ATTEMPTS {
        return Err(ConfigError::InvalidRetry {
            message: format!(
                "max attempts must be between 1 and {} (got {})",
                MAX_MAX_ATTEMPTS, retry.max_attempts
            ),
        });
    }
    if retry.base_delay > retry.max_delay {
        return Err(ConfigError::InvalidRetry {
            message: format!(
                "base delay ({:?}) must not exceed the delay cap ({:?})",
                retry.base_delay, retry.max_delay
            ),
        });
    }
    if retry.max_elapsed.is_zero() {
        return Err(ConfigError::InvalidRetry {
            message: "total retry budget must be greater than 0".to_string(),
        });
    }
    Ok(())
}

fn validate_polling(polling: &PollSettings) -> Result<(), ConfigError> {
    if polling.max_attempts == 0 {
        return Err(ConfigError::InvalidPolling {
            message: "max poll attempts must be greater than 0".to_string(),
        });
    }
    if polling.timeout.is_zero() || polling.timeout.as_secs() > MAX_POLL_TIMEOUT_SECS {
        return Err(ConfigError::InvalidPolling {
            message: format!(
                "poll timeout must be between 1 and {} seconds",
                MAX_POLL_TIMEOUT_SECS
            ),
        });
    }
    if polling.interval > polling.timeout {
        return Err(ConfigError::InvalidPolling {
            message: format!(
                "poll interval ({:?}) must not exceed the poll timeout ({:?})",
                polling.interval, polling.timeout
            ),
        });
    }
    Ok(())
}

/// Validate the host is an absolute http(s) URL and strip any trailing slash.
fn validate_and_normalize_host(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim();

    let parsed = url::Url::parse(trimmed).map_err(|e| ConfigError::InvalidHost {
        host: trimmed.to_string(),
        message: format!("must be an absolute http(s) URL: {e}"),
    })?;

    let scheme = parsed.scheme();
    if scheme != "http" && scheme != "https" {
        return Err(ConfigError::InvalidHost {
            host: trimmed.to_string(),
            message: format!("scheme must be http or https, got: {scheme}"),
        });
    }

    if parsed.host_str().is_none() {
        return Err(ConfigError::InvalidHost {
            host: trimmed.to_string(),
            message: "host is required".to_string(),
        });
    }

    Ok(parsed.as_str().trim_end_matches('/').to_string())
}
