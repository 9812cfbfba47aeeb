//! Testing utilities for Capella client tests.
//!
//! Builders for the JSON bodies the Capella API returns, plus a client
//! preconfigured with millisecond retry delays so retry tests stay fast.
//! Available when running tests or when the `test-utils` feature is enabled.
//!
//! # Example
//! ```ignore
//! use capella_client::testing::{fast_client, paginated_body};
//!
//! let client = fast_client(&server.uri());
//! let body = paginated_body(&[1, 2, 3], 1, 0, 1, 3);
//! ```

use std::time::Duration;

use serde::Serialize;
use serde_json::{Value, json};

use crate::client::CapellaClient;
use crate::retry::RetryPolicy;

/// Retry policy with millisecond delays and no jitter.
pub fn fast_retry_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay: Duration::from_millis(5),
        max_delay: Duration::from_millis(40),
        jitter: 0.0,
        max_elapsed: Duration::from_secs(10),
    }
}

/// Client pointed at `host` with [`fast_retry_policy`] and no rate limit.
///
/// # Panics
/// If the client cannot be built.
pub fn fast_client(host: &str) -> CapellaClient {
    CapellaClient::builder()
        .host(host.to_string())
        .timeout(Duration::from_secs(5))
        .retry_policy(fast_retry_policy(4))
        .rate_limiter(crate::rate_limit::RateLimiter::unlimited())
        .build()
        .expect("test client should build")
}

/// A paginated response body: `{data, cursor: {pages, hrefs}}`.
pub fn paginated_body<T: Serialize>(
    data: &[T],
    page: u32,
    next: u32,
    last: u32,
    total_items: u64,
) -> Value {
    json!({
        "data": data,
        "cursor": {
            "pages": {
                "page": page,
                "next": next,
                "previous": page.saturating_sub(1),
                "last": last,
                "perPage": 25,
                "totalItems": total_items,
            },
            "hrefs": {},
        }
    })
}

/// A Capella error body.
pub fn api_error_body(code: i64, http_status_code: u16, message: &str) -> Value {
    json!({
        "code": code,
        "hint": "",
        "httpStatusCode": http_status_code,
        "message": message,
    })
}

/// A status-check body such as `{"status": "Ready"}`.
pub fn status_body(status: &str) -> Value {
    json!({ "status": status })
}
