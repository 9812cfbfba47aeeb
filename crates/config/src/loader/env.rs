//! Environment variable parsing for configuration.
//!
//! Responsibilities:
//! - Read and parse `CAPELLA_*` environment variables.
//! - Apply environment variable values to a ConfigLoader instance.
//! - Provide helper functions for reading env vars with empty/whitespace filtering.
//!
//! Does NOT handle:
//! - Building the final Config or range validation (see builder.rs).
//! - .env file loading (handled by ConfigLoader::load_dotenv).
//!
//! Invariants:
//! - Environment variables take precedence over values already on the loader.
//! - Empty or whitespace-only environment variables are treated as unset.
//! - Returned values are trimmed (leading/trailing whitespace removed).
//! - Unparsable values return ConfigError::InvalidValue naming the variable.

use secrecy::SecretString;
use std::str::FromStr;
use std::time::Duration;

use super::builder::ConfigLoader;
use super::error::ConfigError;

pub(crate) const ENV_HOST: &str = "CAPELLA_HOST";
pub(crate) const ENV_AUTH_TOKEN: &str = "CAPELLA_AUTH_TOKEN";
pub(crate) const ENV_SKIP_VERIFY: &str = "CAPELLA_SKIP_VERIFY";
pub(crate) const ENV_TIMEOUT: &str = "CAPELLA_TIMEOUT";
pub(crate) const ENV_MAX_RETRIES: &str = "CAPELLA_MAX_RETRIES";
pub(crate) const ENV_RETRY_BASE_MS: &str = "CAPELLA_RETRY_BASE_MS";
pub(crate) const ENV_RETRY_MAX_ELAPSED: &str = "CAPELLA_RETRY_MAX_ELAPSED";
pub(crate) const ENV_POLL_INTERVAL: &str = "CAPELLA_POLL_INTERVAL";
pub(crate) const ENV_POLL_MAX_ATTEMPTS: &str = "CAPELLA_POLL_MAX_ATTEMPTS";
pub(crate) const ENV_POLL_TIMEOUT: &str = "CAPELLA_POLL_TIMEOUT";
pub(crate) const ENV_RATE_LIMIT_PER_SEC: &str = "CAPELLA_RATE_LIMIT_PER_SEC";
pub(crate) const ENV_PAGE_SIZE: &str = "CAPELLA_PAGE_SIZE";

/// Read an environment variable, returning None if unset, empty, or whitespace-only.
/// Returns the trimmed value (leading/trailing whitespace removed) if present.
pub fn env_var_or_none(key: &str) -> Option<String> {
    std::env::var(key).ok().and_then(|s| {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            None
        } else if trimmed.len() == s.len() {
            Some(s)
        } else {
            Some(trimmed.to_string())
        }
    })
}

/// Parse an environment variable into `T`, mapping failures to `InvalidValue`.
fn parse_env<T: FromStr>(key: &str, expected: &str) -> Result<Option<T>, ConfigError> {
    env_var_or_none(key)
        .map(|raw| {
            raw.parse::<T>().map_err(|_| ConfigError::InvalidValue {
                var: key.to_string(),
                message: format!("must be {expected}"),
            })
        })
        .transpose()
}

/// Apply environment variable configuration to the loader.
pub fn apply_env(loader: &mut ConfigLoader) -> Result<(), ConfigError> {
    if let Some(host) = env_var_or_none(ENV_HOST) {
        loader.set_host(Some(host));
    }
    if let Some(token) = env_var_or_none(ENV_AUTH_TOKEN) {
        loader.set_auth_token(Some(SecretString::new(token.into())));
    }
    if let Some(skip) = parse_env::<bool>(ENV_SKIP_VERIFY, "true or false")? {
        loader.set_skip_verify(Some(skip));
    }
    if let Some(secs) = parse_env::<u64>(ENV_TIMEOUT, "a number of seconds")? {
        loader.set_timeout(Some(Duration::from_secs(secs)));
    }
    if let Some(attempts) = parse_env::<u32>(ENV_MAX_RETRIES, "a non-negative integer")? {
        loader.set_max_attempts(Some(attempts));
    }
    if let Some(ms) = parse_env::<u64>(ENV_RETRY_BASE_MS, "a number of milliseconds")? {
        loader.set_retry_base_delay(Some(Duration::from_millis(ms)));
    }
    if let Some(secs) = parse_env::<u64>(ENV_RETRY_MAX_ELAPSED, "a number of seconds")? {
        loader.set_retry_max_elapsed(Some(Duration::from_secs(secs)));
    }
    if let Some(secs) = parse_env::<u64>(ENV_POLL_INTERVAL, "a number of seconds")? {
        loader.set_poll_interval(Some(Duration::from_secs(secs)));
    }
    if let Some(rounds) = parse_env::<u32>(ENV_POLL_MAX_ATTEMPTS, "a non-negative integer")? {
        loader.set_poll_max_attempts(Some(rounds));
    }
    if let Some(secs) = parse_env::<u64>(ENV_POLL_TIMEOUT, "a number of seconds")? {
        loader.set_poll_timeout(Some(Duration::from_secs(secs)));
    }
    if let Some(rate) = parse_env::<u32>(ENV_RATE_LIMIT_PER_SEC, "a non-negative integer")? {
        loader.set_rate_limit_per_sec(Some(rate));
    }
    if let Some(size) = parse_env::<u32>(ENV_PAGE_SIZE, "a positive integer")? {
        loader.set_page_size(Some(size));
    }
    Ok(())
}
