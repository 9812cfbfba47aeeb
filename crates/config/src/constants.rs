//! Centralized constants for the Capella client workspace.
//!
//! This module contains default values used across crates to avoid
//! magic number duplication and improve maintainability.

// =============================================================================
// Connection & Timeout Defaults
// =============================================================================

/// Default Capella control-plane host.
pub const DEFAULT_HOST: &str = "https://cloudapi.cloud.couchbase.com";

/// Default HTTP request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Maximum allowed request timeout in seconds (1 hour).
pub const MAX_TIMEOUT_SECS: u64 = 3600;

/// Default maximum number of HTTP redirects to follow.
pub const DEFAULT_MAX_REDIRECTS: usize = 5;

// =============================================================================
// Retry Defaults
// =============================================================================

/// Default number of attempts (initial call included) for transient failures.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 6;

/// Upper bound accepted for the configured attempt count.
pub const MAX_MAX_ATTEMPTS: u32 = 20;

/// Base delay of the exponential backoff in milliseconds.
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 2000;

/// Cap applied to a single backoff delay in seconds.
pub const DEFAULT_RETRY_MAX_DELAY_SECS: u64 = 32;

/// Jitter applied to every backoff delay, as a fraction of the delay (±20%).
pub const DEFAULT_RETRY_JITTER: f64 = 0.2;

/// Total time budget for one retried call in seconds (10 minutes).
pub const DEFAULT_RETRY_MAX_ELAPSED_SECS: u64 = 600;

// =============================================================================
// Pagination Defaults
// =============================================================================

/// Default `perPage` value sent with paginated requests.
pub const DEFAULT_PAGE_SIZE: u32 = 25;

/// Largest `perPage` value accepted by the API.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Hard ceiling on pages fetched by a single paginated read.
pub const MAX_PAGES_PER_FETCH: u32 = 10_000;

// =============================================================================
// Polling Defaults
// =============================================================================

/// Fixed interval between poll rounds in seconds.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;

/// Default number of poll rounds before giving up.
pub const DEFAULT_POLL_MAX_ATTEMPTS: u32 = 60;

/// Overall deadline for one watch in seconds (60 minutes).
pub const DEFAULT_POLL_TIMEOUT_SECS: u64 = 3600;

/// Maximum allowed watch deadline in seconds (24 hours).
pub const MAX_POLL_TIMEOUT_SECS: u64 = 86400;

/// First wait of a growing single-resource poll, in seconds.
pub const DEFAULT_GROWING_POLL_INITIAL_SECS: u64 = 60;

/// Cap on the wait of a growing single-resource poll, in seconds (20 minutes).
pub const DEFAULT_GROWING_POLL_MAX_SECS: u64 = 1200;

// =============================================================================
// Rate Limiting Defaults
// =============================================================================

/// Outbound status-check budget shared by all monitors (requests per second).
///
/// Higher rates make the indexer choke while builds are in flight.
pub const DEFAULT_RATE_LIMIT_PER_SEC: u32 = 1;

/// Maximum accepted rate limit (requests per second).
pub const MAX_RATE_LIMIT_PER_SEC: u32 = 1000;

// =============================================================================
// Known Server Codes
// =============================================================================

/// Server code returned when a cluster on/off schedule does not exist.
pub const SCHEDULE_NOT_FOUND_CODE: i64 = 11040;

/// Server code attached to a 504 when an index DDL statement timed out.
pub const INDEX_DDL_GATEWAY_TIMEOUT_CODE: i64 = 7001;
