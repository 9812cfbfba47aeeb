//! Capella control-plane API client.
//!
//! This crate provides the execution core shared by every Capella resource
//! operation: a request executor with retry and backoff, a structured error
//! model, cursor-following paginated reads, and a rate-limited monitor that
//! waits for resources to reach a terminal state.

pub mod client;
pub mod endpoint;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod monitor;
pub mod pagination;
pub mod rate_limit;
pub mod retry;

#[cfg(any(feature = "test-utils", test))]
pub mod testing;

pub use client::CapellaClient;
pub use client::builder::CapellaClientBuilder;
pub use endpoint::{EndpointConfig, Payload, Response};
pub use error::{
    ApiErrorBody, ClientError, ErrorCodePolicy, ErrorKind, Result, TransportKind,
    UnconvergedResource,
};
pub use metrics::{ErrorCategory, MetricsCollector};
pub use monitor::{
    GrowingInterval, MonitorSettings, ResourceState, WatchOptions, poll_until_ready,
    watch_until_ready,
};
pub use pagination::{Cursor, PaginatedWithMeta, SortBy, get_paginated, get_paginated_with_meta};
pub use rate_limit::RateLimiter;
pub use retry::RetryPolicy;
