//! Metrics collection for API call performance.
//!
//! This module provides metrics collection for Capella API calls, including:
//! - Request latency histograms
//! - Request counters (total, retries, errors)
//! - Poll round counters for convergence watches
//!
//! # What this module does NOT handle:
//! - Metrics exposition/export (install a recorder such as `metrics-exporter-prometheus`)
//!
//! # Invariants
//! - All metrics use consistent label names: `endpoint`, `method`, `status`, `error_category`
//! - Metric recording is infallible
//! - Zero-cost when no metrics recorder is installed

use crate::error::{ClientError, TransportKind};
use std::time::Duration;

/// Metric name for request duration histogram.
pub const METRIC_REQUEST_DURATION: &str = "capella_api_request_duration_seconds";

/// Metric name for total request counter.
pub const METRIC_REQUESTS_TOTAL: &str = "capella_api_requests_total";

/// Metric name for retry counter.
pub const METRIC_RETRIES_TOTAL: &str = "capella_api_retries_total";

/// Metric name for error counter.
pub const METRIC_ERRORS_TOTAL: &str = "capella_api_errors_total";

/// Metric name for poll round counter.
pub const METRIC_POLL_ROUNDS_TOTAL: &str = "capella_poll_rounds_total";

/// Error categories for metrics labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Connection refused, reset, DNS and other pre-status failures
    Transport,
    /// Request or body read timed out
    Timeout,
    /// Caller cancelled
    Cancelled,
    /// HTTP 4xx client errors
    Http4xx,
    /// HTTP 5xx server errors
    Http5xx,
    /// Body did not match the expected shape
    Unmarshal,
    /// Watched resources did not converge
    Convergence,
    /// Anything else (pre-flight rejections, limiter failures, odd statuses)
    Unknown,
}

impl ErrorCategory {
    /// Returns the string label for this error category.
    pub const fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Transport => "transport",
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::Cancelled => "cancelled",
            ErrorCategory::Http4xx => "http_4xx",
            ErrorCategory::Http5xx => "http_5xx",
            ErrorCategory::Unmarshal => "unmarshal",
            ErrorCategory::Convergence => "convergence",
            ErrorCategory::Unknown => "unknown",
        }
    }
}

impl From<&ClientError> for ErrorCategory {
    fn from(error: &ClientError) -> Self {
        match error {
            ClientError::Transport { kind, .. } => match kind {
                TransportKind::Timeout => ErrorCategory::Timeout,
                TransportKind::Cancelled => ErrorCategory::Cancelled,
                TransportKind::Connect | TransportKind::Request => ErrorCategory::Transport,
            },
            ClientError::HttpStatus { status, .. } => {
                if (400..500).contains(status) {
                    ErrorCategory::Http4xx
                } else if (500..600).contains(status) {
                    ErrorCategory::Http5xx
                } else {
                    ErrorCategory::Unknown
                }
            }
            ClientError::Unmarshal { .. } => ErrorCategory::Unmarshal,
            ClientError::Convergence { .. } => ErrorCategory::Convergence,
            ClientError::LimiterAcquisitionFailed(_) | ClientError::InvalidRequest(_) => {
                ErrorCategory::Unknown
            }
        }
    }
}

/// Metrics collector for Capella API calls.
///
/// A lightweight wrapper around the `metrics` crate macros providing
/// type-safe methods for recording API metrics with consistent labels.
#[derive(Debug, Clone, Default)]
pub struct MetricsCollector {
    enabled: bool,
}

impl MetricsCollector {
    /// Create a new, enabled metrics collector.
    pub fn new() -> Self {
        Self { enabled: true }
    }

    /// Create a collector that records nothing.
    pub fn disabled() -> Self {
        Self { enabled: false }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Record the duration of one request attempt.
    ///
    /// `status` is `None` when the attempt failed before a status was observed.
    pub fn record_request_duration(
        &self,
        endpoint: &str,
        method: &str,
        duration: Duration,
        status: Option<u16>,
    ) {
        if !self.enabled {
            return;
        }

        let status_label = status.map_or("error".to_string(), |s| s.to_string());

        metrics::histogram!(METRIC_REQUEST_DURATION,
            "endpoint" => endpoint.to_string(),
            "method" => method.to_string(),
            "status" => status_label,
        )
        .record(duration.as_secs_f64());
    }

    /// Record a request attempt, retries included.
    pub fn record_request(&self, endpoint: &str, method: &str) {
        if !self.enabled {
            return;
        }

        metrics::counter!(METRIC_REQUESTS_TOTAL,
            "endpoint" => endpoint.to_string(),
            "method" => method.to_string(),
        )
        .increment(1);
    }

    /// Record a retry (not the initial request). `retry` is 1-based.
    pub fn record_retry(&self, endpoint: &str, method: &str, retry: u32) {
        if !self.enabled {
            return;
        }

        metrics::counter!(METRIC_RETRIES_TOTAL,
            "endpoint" => endpoint.to_string(),
            "method" => method.to_string(),
            "attempt" => retry.to_string(),
        )
        .increment(1);
    }

    pub fn record_error(&self, endpoint: &str, method: &str, category: ErrorCategory) {
        if !self.enabled {
            return;
        }

        metrics::counter!(METRIC_ERRORS_TOTAL,
            "endpoint" => endpoint.to_string(),
            "method" => method.to_string(),
            "error_category" => category.as_str(),
        )
        .increment(1);
    }

    /// Record an error, categorizing it automatically.
    pub fn record_client_error(&self, endpoint: &str, method: &str, error: &ClientError) {
        self.record_error(endpoint, method, ErrorCategory::from(error));
    }

    /// Record one poll round of a convergence watch.
    pub fn record_poll_round(&self, target_state: &str, outstanding: usize) {
        if !self.enabled {
            return;
        }

        metrics::counter!(METRIC_POLL_ROUNDS_TOTAL,
            "target_state" => target_state.to_string(),
            "outstanding" => if outstanding == 0 { "none" } else { "some" },
        )
        .increment(1);
    }
}
