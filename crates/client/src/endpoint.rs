//! Endpoint descriptions, request payloads and raw responses.
//!
//! Responsibilities:
//! - Describe one logical call (`EndpointConfig`): absolute URL, method, success status.
//! - Serialize request payloads before any network activity (`Payload`).
//! - Carry the body and status of a successful call back to the caller (`Response`).
//!
//! Does NOT handle:
//! - Sending requests or retrying (see `client`).
//!
//! Invariants:
//! - An `EndpointConfig` has exactly one success status.
//! - A relative or unparsable URL is rejected as `InvalidRequest` before sending.

use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use url::Url;

use crate::error::{ClientError, Result};

/// One logical API call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    /// Fully resolved absolute URL, path parameters included.
    pub url: String,
    pub method: Method,
    /// The only status treated as success.
    pub success_status: StatusCode,
    /// Extra request headers such as `If-Match`.
    pub headers: Vec<(String, String)>,
}

impl EndpointConfig {
    pub fn new(method: Method, url: impl Into<String>, success_status: StatusCode) -> Self {
        Self {
            url: url.into(),
            method,
            success_status,
            headers: Vec::new(),
        }
    }

    /// `GET` expecting `200 OK`.
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url, StatusCode::OK)
    }

    /// `POST` expecting `201 Created`.
    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url, StatusCode::CREATED)
    }

    /// `PUT` expecting `204 No Content`.
    pub fn put(url: impl Into<String>) -> Self {
        Self::new(Method::PUT, url, StatusCode::NO_CONTENT)
    }

    /// `DELETE` expecting `204 No Content`.
    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(Method::DELETE, url, StatusCode::NO_CONTENT)
    }

    pub fn with_success_status(mut self, status: StatusCode) -> Self {
        self.success_status = status;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Same call against another URL.
    pub fn with_url(&self, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..self.clone()
        }
    }

    /// Parse and validate the target URL.
    pub fn parsed_url(&self) -> Result<Url> {
        let url = Url::parse(&self.url)
            .map_err(|e| ClientError::InvalidRequest(format!("invalid URL '{}': {e}", self.url)))?;
        if url.cannot_be_a_base() || !matches!(url.scheme(), "http" | "https") {
            return Err(ClientError::InvalidRequest(format!(
                "URL '{}' must be an absolute http(s) URL",
                self.url
            )));
        }
        Ok(url)
    }
}

/// Serialized request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

impl Payload {
    /// JSON-encode `value`.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        let body = serde_json::to_vec(value)
            .map_err(|e| ClientError::InvalidRequest(format!("payload serialization failed: {e}")))?;
        Ok(Self {
            content_type: "application/json",
            body,
        })
    }

    /// A JavaScript source sent verbatim, e.g. an App Services function body.
    pub fn javascript(source: impl Into<String>) -> Self {
        Self {
            content_type: "application/javascript",
            body: source.into().into_bytes(),
        }
    }
}

/// A response whose status matched the configured success status.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// Final URL after redirects.
    pub url: String,
    pub body: Vec<u8>,
}

impl Response {
    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|e| ClientError::Unmarshal {
            url: self.url.clone(),
            target: std::any::type_name::<T>().to_string(),
            message: e.to_string(),
        })
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn into_body(self) -> Vec<u8> {
        self.body
    }
}
