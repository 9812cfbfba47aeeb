//! Capella API client and request executor.
//!
//! This module provides [`CapellaClient`], which turns an [`EndpointConfig`]
//! into a [`Response`] or a classified [`ClientError`](crate::error::ClientError).
//!
//! # Submodules
//! - [`builder`]: Client construction and configuration
//! - `execute`: Single-attempt execution and the retry loop
//!
//! # What this module does NOT handle:
//! - Following pagination cursors (see [`crate::pagination`])
//! - Waiting for resources to converge (see [`crate::monitor`])
//!
//! # Invariants
//! - The client holds no per-call state; `execute` is idempotent from the client's side.
//! - The bearer token is supplied per call and only exposed while building the header.
//!
//! [`EndpointConfig`]: crate::endpoint::EndpointConfig
//! [`Response`]: crate::endpoint::Response

pub mod builder;
mod execute;

use capella_config::PollSettings;

use crate::metrics::MetricsCollector;
use crate::rate_limit::RateLimiter;
use crate::retry::RetryPolicy;

/// Client for the Capella control-plane API.
///
/// # Creating a Client
///
/// ```rust,ignore
/// use capella_client::CapellaClient;
///
/// let client = CapellaClient::builder()
///     .host("https://cloudapi.cloud.couchbase.com".to_string())
///     .build()?;
/// ```
#[derive(Debug, Clone)]
pub struct CapellaClient {
    pub(crate) http: reqwest::Client,
    pub(crate) host: String,
    pub(crate) user_agent: String,
    pub(crate) retry_policy: RetryPolicy,
    pub(crate) page_size: u32,
    pub(crate) poll_settings: PollSettings,
    pub(crate) rate_limiter: RateLimiter,
    pub(crate) metrics: Option<MetricsCollector>,
}

impl CapellaClient {
    /// Create a new client builder.
    pub fn builder() -> builder::CapellaClientBuilder {
        builder::CapellaClientBuilder::new()
    }

    /// Host URL without a trailing slash.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Retry policy used by `execute_with_retry`.
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// `perPage` sent by paginated reads.
    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Poll budget used by the index watch helpers.
    pub fn poll_settings(&self) -> &PollSettings {
        &self.poll_settings
    }

    /// Shared outbound limiter for status checks. Clones share one budget.
    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }
}
