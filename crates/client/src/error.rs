//! Error types for the Capella client.
//!
//! Responsibilities:
//! - Classify every failed call into exactly one `ClientError` variant.
//! - Decode the server error body (`{code, hint, httpStatusCode, message}`) when present.
//! - Render a one-line `short_message` and a multi-field `complete_message`.
//! - Decide which failures are transient (eligible for retry).
//!
//! Does NOT handle:
//! - Retrying (see `client::execute_with_policy`).
//! - Deciding what a server code means for a particular resource (see `ErrorCodePolicy`).
//!
//! Invariants:
//! - Classification is total: an undecodable error body still keeps its raw text and status.
//! - Cancellation is a `Transport` error that is never transient.

use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Server code attached to a 504 when an index DDL statement timed out server-side.
/// Retrying such a request only queues another DDL behind the first one.
const INDEX_DDL_GATEWAY_TIMEOUT_CODE: i64 = 7001;

/// What went wrong below the HTTP layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// The request or body read exceeded the client timeout.
    Timeout,
    /// The connection could not be established or was reset.
    Connect,
    /// The caller cancelled the operation.
    Cancelled,
    /// Any other failure while sending the request or reading the body.
    Request,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TransportKind::Timeout => "timeout",
            TransportKind::Connect => "connection",
            TransportKind::Cancelled => "cancelled",
            TransportKind::Request => "request",
        };
        f.write_str(label)
    }
}

/// Coarse classification of a [`ClientError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transport(TransportKind),
    HttpStatus,
    Unmarshal,
    Convergence,
    LimiterAcquisitionFailed,
    InvalidRequest,
}

/// Error body returned by the Capella API on non-success responses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApiErrorBody {
    pub code: i64,
    pub hint: String,
    pub http_status_code: i64,
    pub message: String,
}

impl ApiErrorBody {
    /// Decode an error body, returning `None` when it carries no server information.
    pub fn parse(body: &[u8]) -> Option<Self> {
        let parsed: Self = serde_json::from_slice(body).ok()?;
        if parsed.code == 0 && parsed.message.is_empty() {
            None
        } else {
            Some(parsed)
        }
    }

    /// JSON rendering of every field.
    pub fn complete(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(
                "{{\"code\":{},\"hint\":{:?},\"httpStatusCode\":{},\"message\":{:?}}}",
                self.code, self.hint, self.http_status_code, self.message
            )
        })
    }
}

/// A watched resource that did not reach its target state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnconvergedResource {
    pub name: String,
    /// Last observed state, or the failure that removed it from polling.
    pub reason: String,
}

impl fmt::Display for UnconvergedResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.reason)
    }
}

/// Errors that can occur during Capella client operations.
#[derive(Error, Debug)]
pub enum ClientError {
    /// No HTTP status was observed.
    #[error("{method} {url}: {kind} error: {message}")]
    Transport {
        kind: TransportKind,
        method: String,
        url: String,
        message: String,
    },

    /// A status was observed but it was not the configured success status.
    #[error("{method} {url}: unexpected status {status} (expected {expected}){}", server_suffix(.api))]
    HttpStatus {
        method: String,
        url: String,
        status: u16,
        expected: u16,
        api: Option<ApiErrorBody>,
        /// Raw response body, kept even when `api` decoded.
        body: String,
        retry_after: Option<Duration>,
    },

    /// The response body could not be decoded into the expected shape.
    #[error("failed to decode {target} from {url}: {message}")]
    Unmarshal {
        url: String,
        target: String,
        message: String,
    },

    /// Watched resources did not all reach the target state.
    #[error("{} resource(s) did not reach '{target_state}' after {attempts} poll round(s): {}", .unconverged.len(), join_unconverged(.unconverged))]
    Convergence {
        target_state: String,
        attempts: u32,
        unconverged: Vec<UnconvergedResource>,
    },

    /// The shared rate limiter refused a slot.
    #[error("rate limiter acquisition failed: {0}")]
    LimiterAcquisitionFailed(String),

    /// Rejected before any network activity.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

fn server_suffix(api: &Option<ApiErrorBody>) -> String {
    match api {
        Some(api) if !api.message.is_empty() => format!(": {}", api.message),
        _ => String::new(),
    }
}

fn join_unconverged(unconverged: &[UnconvergedResource]) -> String {
    unconverged
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl ClientError {
    /// Classify a transport failure reported by reqwest.
    pub fn from_transport(err: reqwest::Error, method: &str, url: &str) -> Self {
        if err.is_builder() {
            return Self::InvalidRequest(format!("{method} {url}: {err}"));
        }
        let kind = if err.is_timeout() {
            TransportKind::Timeout
        } else if err.is_connect() {
            TransportKind::Connect
        } else {
            TransportKind::Request
        };
        Self::Transport {
            kind,
            method: method.to_string(),
            url: url.to_string(),
            message: err.to_string(),
        }
    }

    /// The cancellation error for a call to `url`.
    pub fn cancelled(method: &str, url: &str) -> Self {
        Self::Transport {
            kind: TransportKind::Cancelled,
            method: method.to_string(),
            url: url.to_string(),
            message: "operation cancelled".to_string(),
        }
    }

    /// Classify a response whose status did not match the expected one.
    pub fn from_status(
        method: &str,
        url: &str,
        status: u16,
        expected: u16,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Self {
        Self::HttpStatus {
            method: method.to_string(),
            url: url.to_string(),
            status,
            expected,
            api: ApiErrorBody::parse(body),
            body: String::from_utf8_lossy(body).into_owned(),
            retry_after: parse_retry_after(headers),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport { kind, .. } => ErrorKind::Transport(*kind),
            Self::HttpStatus { .. } => ErrorKind::HttpStatus,
            Self::Unmarshal { .. } => ErrorKind::Unmarshal,
            Self::Convergence { .. } => ErrorKind::Convergence,
            Self::LimiterAcquisitionFailed(_) => ErrorKind::LimiterAcquisitionFailed,
            Self::InvalidRequest(_) => ErrorKind::InvalidRequest,
        }
    }

    /// Check if this error is eligible for automatic retry.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport { kind, .. } => *kind != TransportKind::Cancelled,
            Self::HttpStatus { status, api, .. } => {
                let ddl_timeout = *status == 504
                    && api
                        .as_ref()
                        .is_some_and(|a| a.code == INDEX_DDL_GATEWAY_TIMEOUT_CODE);
                Self::is_retryable_status(*status) && !ddl_timeout
            }
            _ => false,
        }
    }

    /// Check if an HTTP status code is retryable.
    ///
    /// Retryable status codes:
    /// - 429: Too Many Requests (rate limiting)
    /// - 502: Bad Gateway
    /// - 503: Service Unavailable
    /// - 504: Gateway Timeout
    pub fn is_retryable_status(status: u16) -> bool {
        matches!(status, 429 | 502 | 503 | 504)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Self::Transport {
                kind: TransportKind::Cancelled,
                ..
            }
        )
    }

    /// True for a 404 status error.
    pub fn is_resource_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    /// Observed HTTP status, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Server-supplied error code, if the body carried one.
    pub fn server_code(&self) -> Option<i64> {
        match self {
            Self::HttpStatus { api: Some(api), .. } if api.code != 0 => Some(api.code),
            _ => None,
        }
    }

    /// Wait requested by the server through `Retry-After`.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::HttpStatus { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// One-line diagnostic.
    pub fn short_message(&self) -> String {
        match self {
            Self::HttpStatus {
                status,
                api: Some(api),
                ..
            } if !api.message.is_empty() => format!("{} (status {})", api.message, status),
            _ => self.to_string(),
        }
    }

    /// Full explanation including the server error body when available.
    pub fn complete_message(&self) -> String {
        match self {
            Self::HttpStatus {
                api: Some(api),
                method,
                url,
                status,
                ..
            } => format!("{method} {url} returned {status}: {}", api.complete()),
            Self::HttpStatus { body, .. } if !body.is_empty() => {
                format!("{self}; response body: {body}")
            }
            Self::Convergence {
                target_state,
                attempts,
                unconverged,
            } => {
                let mut out = format!(
                    "{} resource(s) did not reach '{}' after {} poll round(s):",
                    unconverged.len(),
                    target_state,
                    attempts
                );
                for resource in unconverged {
                    out.push_str(&format!("\n  - {}: {}", resource.name, resource.reason));
                }
                out
            }
            _ => self.to_string(),
        }
    }
}

/// Parse a delta-seconds `Retry-After` header. HTTP-date values are ignored.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Opt-in mapping of server codes to "expected empty state".
///
/// Some endpoints answer a read of an absent singleton (for example an on/off
/// schedule, code `11040`) with an error instead of an empty body. Callers
/// that want to treat such codes as "nothing there" build a policy and pass
/// their result through [`ErrorCodePolicy::resolve`].
#[derive(Debug, Clone, Default)]
pub struct ErrorCodePolicy {
    empty_state_codes: Vec<i64>,
}

impl ErrorCodePolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Treat errors carrying `code` as an empty result.
    pub fn treat_as_empty(mut self, code: i64) -> Self {
        if !self.empty_state_codes.contains(&code) {
            self.empty_state_codes.push(code);
        }
        self
    }

    pub fn is_empty_state(&self, err: &ClientError) -> bool {
        err.server_code()
            .is_some_and(|code| self.empty_state_codes.contains(&code))
    }

    /// `Ok(Some)` on success, `Ok(None)` for an empty-state error, otherwise the error.
    pub fn resolve<T>(&self, result: Result<T>) -> Result<Option<T>> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(err) if self.is_empty_state(&err) => Ok(None),
            Err(err) => Err(err),
        }
    }
}
