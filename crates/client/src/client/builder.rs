//! Client builder for constructing [`CapellaClient`] instances.
//!
//! This module is responsible for:
//! - Providing a fluent builder API for client configuration
//! - Normalizing the host URL (removing trailing slashes)
//! - Configuring the underlying HTTP client (timeouts, TLS verification, redirects)
//!
//! # What this module does NOT handle:
//! - Actual API calls (see `execute.rs`)
//! - Sourcing configuration from the environment (see `capella_config::ConfigLoader`)
//!
//! # Invariants
//! - `host` is required and must be provided before calling `build()`
//! - The host is always normalized to have no trailing slashes
//! - `skip_verify` only affects HTTPS connections; HTTP connections log a warning

use std::time::Duration;

use capella_config::{
    Config, PollSettings,
    constants::{DEFAULT_MAX_REDIRECTS, DEFAULT_PAGE_SIZE, DEFAULT_TIMEOUT_SECS},
};

use crate::client::CapellaClient;
use crate::error::{ClientError, Result};
use crate::metrics::MetricsCollector;
use crate::rate_limit::RateLimiter;
use crate::retry::RetryPolicy;

/// Builder for creating a new [`CapellaClient`].
///
/// All options have defaults except `host`.
pub struct CapellaClientBuilder {
    host: Option<String>,
    skip_verify: bool,
    timeout: Duration,
    retry_policy: RetryPolicy,
    page_size: u32,
    poll_settings: PollSettings,
    rate_limiter: Option<RateLimiter>,
    metrics: Option<MetricsCollector>,
}

impl Default for CapellaClientBuilder {
    fn default() -> Self {
        Self {
            host: None,
            skip_verify: false,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            retry_policy: RetryPolicy::default(),
            page_size: DEFAULT_PAGE_SIZE,
            poll_settings: PollSettings::default(),
            rate_limiter: None,
            metrics: None,
        }
    }
}

impl CapellaClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the control-plane host, e.g. `https://cloudapi.cloud.couchbase.com`.
    pub fn host(mut self, host: String) -> Self {
        self.host = Some(host);
        self
    }

    /// Set whether to skip TLS certificate verification.
    ///
    /// # Security Warning
    /// Only use this against development endpoints.
    pub fn skip_verify(mut self, skip: bool) -> Self {
        self.skip_verify = skip;
        self
    }

    /// Set the per-attempt request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn page_size(mut self, size: u32) -> Self {
        self.page_size = size;
        self
    }

    pub fn poll_settings(mut self, settings: PollSettings) -> Self {
        self.poll_settings = settings;
        self
    }

    /// Share an existing limiter instead of creating one per client.
    pub fn rate_limiter(mut self, limiter: RateLimiter) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    /// Set the metrics collector for API call performance tracking.
    pub fn metrics(mut self, metrics: MetricsCollector) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Create a client builder from loaded configuration.
    pub fn from_config(mut self, config: &Config) -> Self {
        self.host = Some(config.connection.host.clone());
        self.skip_verify = config.connection.skip_verify;
        self.timeout = config.connection.timeout;
        self.retry_policy = RetryPolicy::from(&config.retry);
        self.page_size = config.page_size;
        self.poll_settings = config.polling;
        self.rate_limiter = Some(RateLimiter::from_settings(&config.rate_limit));
        self
    }

    /// Normalize a host URL by removing trailing slashes.
    ///
    /// - `"https://cloudapi.example.com/"` -> `"https://cloudapi.example.com"`
    /// - `"https://cloudapi.example.com//"` -> `"https://cloudapi.example.com"`
    fn normalize_host(host: String) -> String {
        host.trim().trim_end_matches('/').to_string()
    }

    /// Build the [`CapellaClient`] with the configured options.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidRequest`] if `host` was not provided or
    /// the HTTP client fails to build.
    pub fn build(self) -> Result<CapellaClient> {
        let host = self
            .host
            .map(Self::normalize_host)
            .filter(|h| !h.is_empty())
            .ok_or_else(|| ClientError::InvalidRequest("host is required".to_string()))?;

        let mut http_builder = reqwest::Client::builder()
            .timeout(self.timeout)
            .redirect(reqwest::redirect::Policy::limited(DEFAULT_MAX_REDIRECTS));

        if self.skip_verify {
            if host.starts_with("https://") {
                http_builder = http_builder.danger_accept_invalid_certs(true);
            } else {
                tracing::warn!(
                    "skip_verify=true has no effect on HTTP URLs. TLS verification only applies to HTTPS connections."
                );
            }
        }

        let http = http_builder
            .build()
            .map_err(|e| ClientError::InvalidRequest(format!("failed to build HTTP client: {e}")))?;

        Ok(CapellaClient {
            http,
            host,
            user_agent: format!("capella-client/{}", env!("CARGO_PKG_VERSION")),
            retry_policy: self.retry_policy,
            page_size: self.page_size.max(1),
            poll_settings: self.poll_settings,
            rate_limiter: self
                .rate_limiter
                .unwrap_or_else(|| RateLimiter::from_settings(&Default::default())),
            metrics: self.metrics,
        })
    }
}
