//! Request execution with retry and exponential backoff.
//!
//! `execute` performs exactly one attempt. `execute_with_retry` and
//! `execute_with_policy` wrap it in a loop that retries transient failures
//! (see [`ClientError::is_transient`]) until the attempt count or the total
//! time budget runs out, then return the last error unchanged.

use std::time::Instant;

use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use secrecy::{ExposeSecret, SecretString};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::client::CapellaClient;
use crate::endpoint::{EndpointConfig, Payload, Response};
use crate::error::{ClientError, Result};
use crate::retry::RetryPolicy;

impl CapellaClient {
    /// Execute one attempt of `endpoint`.
    ///
    /// Succeeds only when the observed status equals `endpoint.success_status`.
    ///
    /// # Errors
    /// - `InvalidRequest` for a relative or unparsable URL, before any network activity.
    /// - `Transport` when no status was observed, `Transport(Cancelled)` when `cancel` fired.
    /// - `HttpStatus` for any other status.
    pub async fn execute(
        &self,
        endpoint: &EndpointConfig,
        payload: Option<&Payload>,
        token: &SecretString,
        cancel: &CancellationToken,
    ) -> Result<Response> {
        let url = endpoint.parsed_url()?;
        let method = endpoint.method.as_str();
        let path = url.path().to_string();

        if cancel.is_cancelled() {
            return Err(ClientError::cancelled(method, &endpoint.url));
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_request(&path, method);
        }

        let started = Instant::now();
        let result = self
            .send_once(endpoint, url, payload, token, cancel)
            .await;

        if let Some(metrics) = &self.metrics {
            let status = match &result {
                Ok(response) => Some(response.status.as_u16()),
                Err(err) => err.status(),
            };
            metrics.record_request_duration(&path, method, started.elapsed(), status);
            if let Err(err) = &result {
                metrics.record_client_error(&path, method, err);
            }
        }

        result
    }

    async fn send_once(
        &self,
        endpoint: &EndpointConfig,
        url: url::Url,
        payload: Option<&Payload>,
        token: &SecretString,
        cancel: &CancellationToken,
    ) -> Result<Response> {
        let method = endpoint.method.as_str();

        let mut request = self
            .http
            .request(endpoint.method.clone(), url)
            .bearer_auth(token.expose_secret())
            .header(USER_AGENT, self.user_agent.as_str());
        for (name, value) in &endpoint.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(payload) = payload {
            request = request
                .header(CONTENT_TYPE, payload.content_type)
                .body(payload.body.clone());
        }

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ClientError::cancelled(method, &endpoint.url)),
            sent = request.send() => {
                sent.map_err(|e| ClientError::from_transport(e, method, &endpoint.url))?
            }
        };

        let status = response.status();
        let headers = response.headers().clone();
        let final_url = response.url().to_string();

        let body = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ClientError::cancelled(method, &endpoint.url)),
            bytes = response.bytes() => {
                bytes.map_err(|e| ClientError::from_transport(e, method, &endpoint.url))?
            }
        };

        debug!(
            method,
            url = %endpoint.url,
            status = status.as_u16(),
            expected = endpoint.success_status.as_u16(),
            "Request completed"
        );

        if status != endpoint.success_status {
            return Err(ClientError::from_status(
                method,
                &endpoint.url,
                status.as_u16(),
                endpoint.success_status.as_u16(),
                &headers,
                &body,
            ));
        }

        Ok(Response {
            status,
            headers,
            url: final_url,
            body: body.to_vec(),
        })
    }

    /// Execute `endpoint`, retrying transient failures with the client's policy.
    pub async fn execute_with_retry(
        &self,
        endpoint: &EndpointConfig,
        payload: Option<&Payload>,
        token: &SecretString,
        cancel: &CancellationToken,
    ) -> Result<Response> {
        let policy = self.retry_policy;
        self.execute_with_policy(endpoint, payload, token, &policy, cancel)
            .await
    }

    /// Execute `endpoint`, retrying transient failures according to `policy`.
    ///
    /// A backoff wait that would push the call past `policy.max_elapsed` is
    /// not started; the last error is returned instead. Cancellation during
    /// a wait returns `Transport(Cancelled)` immediately.
    pub async fn execute_with_policy(
        &self,
        endpoint: &EndpointConfig,
        payload: Option<&Payload>,
        token: &SecretString,
        policy: &RetryPolicy,
        cancel: &CancellationToken,
    ) -> Result<Response> {
        let started = tokio::time::Instant::now();
        let max_attempts = policy.max_attempts.max(1);
        let method = endpoint.method.as_str();
        let mut attempt: u32 = 1;

        loop {
            let err = match self.execute(endpoint, payload, token, cancel).await {
                Ok(response) => {
                    if attempt > 1 {
                        debug!(attempt, url = %endpoint.url, "Request succeeded after retry");
                    }
                    return Ok(response);
                }
                Err(err) => err,
            };

            if !err.is_transient() {
                return Err(err);
            }

            if attempt >= max_attempts {
                debug!(
                    attempts = attempt,
                    url = %endpoint.url,
                    "Max attempts exhausted for transient failure"
                );
                return Err(err);
            }

            let delay = policy.delay_for(attempt, &err);
            if started.elapsed() + delay > policy.max_elapsed {
                debug!(
                    attempts = attempt,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    url = %endpoint.url,
                    "Retry time budget exhausted"
                );
                return Err(err);
            }

            warn!(
                attempt,
                max_attempts,
                backoff_ms = delay.as_millis() as u64,
                method,
                url = %endpoint.url,
                error = %err,
                "Transient failure, retrying"
            );
            if let Some(metrics) = &self.metrics {
                let path = url::Url::parse(&endpoint.url)
                    .map(|u| u.path().to_string())
                    .unwrap_or_default();
                metrics.record_retry(&path, method, attempt);
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ClientError::cancelled(method, &endpoint.url)),
                _ = tokio::time::sleep(delay) => {}
            }

            attempt += 1;
        }
    }
}
