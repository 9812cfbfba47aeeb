//! Rate-limited poll-until-ready monitor.
//!
//! Responsibilities:
//! - Build status-check URLs from a [`WatchOptions`] hierarchy.
//! - Poll a fixed set of named resources until each reaches a target state.
//! - Report every resource that did not converge, with its last state or failure.
//!
//! Does NOT handle:
//! - Retrying individual status calls (the poll function does, usually via
//!   `execute_with_retry`).
//!
//! Invariants:
//! - One shared limiter slot is acquired before every status call; a failed
//!   acquisition is logged and the call proceeds.
//! - A 404 or transient error keeps a resource outstanding. Any other error marks
//!   only that resource `Failed`; the others keep being polled.
//! - Cancellation aborts immediately. The deadline is enforced independently of it
//!   and bounds limiter waits and in-flight status calls as well as the sleeps.

use std::future::Future;
use std::time::Duration;

use capella_config::PollSettings;
use capella_config::constants::{
    DEFAULT_GROWING_POLL_INITIAL_SECS, DEFAULT_GROWING_POLL_MAX_SECS, DEFAULT_POLL_TIMEOUT_SECS,
};
use secrecy::SecretString;
use serde::Deserialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::client::CapellaClient;
use crate::endpoint::{EndpointConfig, Response};
use crate::error::{ClientError, Result, UnconvergedResource};
use crate::metrics::MetricsCollector;
use crate::rate_limit::RateLimiter;

/// State an index reports once its build has finished.
pub const INDEX_READY_STATE: &str = "Ready";

const DEFAULT_STATUS_PATH: &str = "queryService/indexBuildStatus";
const DEFAULT_KEYSPACE_PART: &str = "_default";

/// Parent hierarchy of the watched resources.
///
/// Every level is optional, but a level may only be set when its parent is.
/// When a bucket is set, scope and collection default to `_default`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchOptions {
    pub host: String,
    pub organization_id: Option<String>,
    pub project_id: Option<String>,
    pub cluster_id: Option<String>,
    pub bucket: Option<String>,
    pub scope: Option<String>,
    pub collection: Option<String>,
    /// Path between the cluster and the resource name.
    pub status_path: Option<String>,
}

impl WatchOptions {
    /// Options for resources of one cluster.
    pub fn for_cluster(
        host: impl Into<String>,
        organization_id: impl Into<String>,
        project_id: impl Into<String>,
        cluster_id: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            organization_id: Some(organization_id.into()),
            project_id: Some(project_id.into()),
            cluster_id: Some(cluster_id.into()),
            ..Self::default()
        }
    }

    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = Some(bucket.into());
        self
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    pub fn with_status_path(mut self, path: impl Into<String>) -> Self {
        self.status_path = Some(path.into());
        self
    }

    /// Status-check URL for the resource `name`.
    ///
    /// # Errors
    /// `InvalidRequest` for an empty or relative host, or a level set without its parent.
    pub fn status_url(&self, name: &str) -> Result<String> {
        self.check_hierarchy()?;

        let host = self.host.trim();
        if host.is_empty() {
            return Err(ClientError::InvalidRequest(
                "watch host is required".to_string(),
            ));
        }
        let mut url = Url::parse(host)
            .map_err(|e| ClientError::InvalidRequest(format!("invalid watch host '{host}': {e}")))?;

        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                ClientError::InvalidRequest(format!("watch host '{host}' cannot carry a path"))
            })?;
            segments.pop_if_empty().push("v4");
            if let Some(org) = &self.organization_id {
                segments.push("organizations").push(org);
            }
            if let Some(project) = &self.project_id {
                segments.push("projects").push(project);
            }
            if let Some(cluster) = &self.cluster_id {
                segments.push("clusters").push(cluster);
            }
            let status_path = self.status_path.as_deref().unwrap_or(DEFAULT_STATUS_PATH);
            segments.extend(status_path.split('/').filter(|s| !s.is_empty()));
            segments.push(name);
        }

        if let Some(bucket) = &self.bucket {
            url.query_pairs_mut()
                .append_pair("bucket", bucket)
                .append_pair(
                    "scope",
                    self.scope.as_deref().unwrap_or(DEFAULT_KEYSPACE_PART),
                )
                .append_pair(
                    "collection",
                    self.collection.as_deref().unwrap_or(DEFAULT_KEYSPACE_PART),
                );
        }

        Ok(url.into())
    }

    fn check_hierarchy(&self) -> Result<()> {
        let levels = [
            ("organization_id", self.organization_id.is_some()),
            ("project_id", self.project_id.is_some()),
            ("cluster_id", self.cluster_id.is_some()),
        ];
        for pair in levels.windows(2) {
            if pair[1].1 && !pair[0].1 {
                return Err(ClientError::InvalidRequest(format!(
                    "{} requires {}",
                    pair[1].0, pair[0].0
                )));
            }
        }
        if (self.scope.is_some() || self.collection.is_some()) && self.bucket.is_none() {
            return Err(ClientError::InvalidRequest(
                "scope and collection require bucket".to_string(),
            ));
        }
        Ok(())
    }
}

/// Round budget of [`watch_until_ready`].
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    /// Fixed wait between rounds.
    pub poll_interval: Duration,
    pub max_attempts: u32,
    /// Overall deadline of one watch.
    pub deadline: Duration,
    pub metrics: Option<MetricsCollector>,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self::from(&PollSettings::default())
    }
}

impl From<&PollSettings> for MonitorSettings {
    fn from(settings: &PollSettings) -> Self {
        Self {
            poll_interval: settings.interval,
            max_attempts: settings.max_attempts,
            deadline: settings.timeout,
            metrics: None,
        }
    }
}

impl MonitorSettings {
    pub fn with_metrics(mut self, metrics: Option<MetricsCollector>) -> Self {
        self.metrics = metrics;
        self
    }
}

/// Where a watched resource stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceState {
    /// Not successfully polled yet.
    Unknown,
    /// Polled, reported a state other than the target.
    Observed(String),
    Ready,
    /// Removed from polling after a non-transient failure.
    Failed(String),
}

impl ResourceState {
    fn is_outstanding(&self) -> bool {
        matches!(self, ResourceState::Unknown | ResourceState::Observed(_))
    }
}

/// Body of a status-check response.
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceStatus {
    pub status: String,
}

struct Tracked {
    name: String,
    url: String,
    state: ResourceState,
    /// Most recent poll outcome, used when reporting non-convergence.
    last_seen: String,
}

impl Tracked {
    fn unconverged(&self) -> UnconvergedResource {
        let reason = match &self.state {
            ResourceState::Failed(reason) => format!("failed: {reason}"),
            _ => self.last_seen.clone(),
        };
        UnconvergedResource {
            name: self.name.clone(),
            reason,
        }
    }
}

fn convergence_error(target_state: &str, rounds: u32, tracked: &[Tracked]) -> ClientError {
    ClientError::Convergence {
        target_state: target_state.to_string(),
        attempts: rounds,
        unconverged: tracked
            .iter()
            .filter(|t| t.state != ResourceState::Ready)
            .map(Tracked::unconverged)
            .collect(),
    }
}

/// Poll every resource in `names` until each reports `target_state`.
///
/// `poll` performs one status call; it receives a `GET` endpoint built by
/// [`WatchOptions::status_url`].
///
/// # Errors
/// - `Convergence` naming every resource that failed or did not converge within
///   `settings.max_attempts` rounds or `settings.deadline`.
/// - `Transport(Cancelled)` when `cancel` fires.
/// - `InvalidRequest` when a status URL cannot be built.
pub async fn watch_until_ready<F, Fut>(
    target_state: &str,
    names: &[String],
    mut poll: F,
    options: &WatchOptions,
    settings: &MonitorSettings,
    limiter: &RateLimiter,
    cancel: &CancellationToken,
) -> Result<()>
where
    F: FnMut(EndpointConfig) -> Fut,
    Fut: Future<Output = Result<Response>>,
{
    let mut tracked = names
        .iter()
        .map(|name| -> Result<Tracked> {
            Ok(Tracked {
                name: name.clone(),
                url: options.status_url(name)?,
                state: ResourceState::Unknown,
                last_seen: "never observed".to_string(),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    if tracked.is_empty() {
        return Ok(());
    }

    let deadline = Instant::now() + settings.deadline;
    let max_rounds = settings.max_attempts.max(1);
    let mut rounds: u32 = 0;

    loop {
        rounds += 1;

        for i in 0..tracked.len() {
            if !tracked[i].state.is_outstanding() {
                continue;
            }

            let acquired = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ClientError::cancelled("GET", &tracked[i].url)),
                _ = tokio::time::sleep_until(deadline) => {
                    warn!(rounds, target_state, "Deadline reached waiting for rate limiter");
                    return Err(convergence_error(target_state, rounds, &tracked));
                }
                acquired = limiter.acquire() => acquired,
            };
            if let Err(err) = acquired {
                warn!(error = %err, resource = %tracked[i].name, "Rate limiter acquisition failed, polling anyway");
            }

            let endpoint = EndpointConfig::get(tracked[i].url.clone());
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ClientError::cancelled("GET", &tracked[i].url)),
                _ = tokio::time::sleep_until(deadline) => {
                    warn!(resource = %tracked[i].name, rounds, "Deadline reached during status check");
                    tracked[i].last_seen = "status check still in flight at deadline".to_string();
                    return Err(convergence_error(target_state, rounds, &tracked));
                }
                outcome = poll(endpoint) => outcome,
            };

            let resource = &mut tracked[i];
            match outcome.and_then(|response| response.json::<ResourceStatus>()) {
                Ok(status) if status.status == target_state => {
                    debug!(resource = %resource.name, round = rounds, "Resource reached target state");
                    resource.state = ResourceState::Ready;
                }
                Ok(status) => {
                    debug!(resource = %resource.name, state = %status.status, round = rounds, "Resource not ready");
                    resource.last_seen = status.status.clone();
                    resource.state = ResourceState::Observed(status.status);
                }
                Err(err) if err.is_cancelled() => return Err(err),
                Err(err) if err.is_resource_not_found() || err.is_transient() => {
                    debug!(resource = %resource.name, error = %err, "Status check failed, will poll again");
                    resource.last_seen = err.short_message();
                }
                Err(err) => {
                    warn!(resource = %resource.name, error = %err, "Status check failed, giving up on resource");
                    resource.state = ResourceState::Failed(err.short_message());
                }
            }
        }

        let outstanding = tracked.iter().filter(|t| t.state.is_outstanding()).count();
        if let Some(metrics) = &settings.metrics {
            metrics.record_poll_round(target_state, outstanding);
        }

        if outstanding == 0 {
            if tracked.iter().all(|t| t.state == ResourceState::Ready) {
                info!(resources = tracked.len(), rounds, target_state, "All resources converged");
                return Ok(());
            }
            return Err(convergence_error(target_state, rounds, &tracked));
        }

        if rounds >= max_rounds || Instant::now() + settings.poll_interval > deadline {
            warn!(outstanding, rounds, target_state, "Poll budget exhausted");
            return Err(convergence_error(target_state, rounds, &tracked));
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ClientError::cancelled("GET", &options.host)),
            _ = tokio::time::sleep_until(deadline) => {
                return Err(convergence_error(target_state, rounds, &tracked));
            }
            _ = tokio::time::sleep(settings.poll_interval) => {}
        }
    }
}

/// Wait schedule of [`poll_until_ready`]: `initial`, doubled after every poll up to `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GrowingInterval {
    pub initial: Duration,
    pub max: Duration,
    pub deadline: Duration,
}

impl Default for GrowingInterval {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(DEFAULT_GROWING_POLL_INITIAL_SECS),
            max: Duration::from_secs(DEFAULT_GROWING_POLL_MAX_SECS),
            deadline: Duration::from_secs(DEFAULT_POLL_TIMEOUT_SECS),
        }
    }
}

/// Poll one resource with growing waits until it reports `target_state`.
///
/// The first poll happens after `schedule.initial`. Errors from `poll` end the
/// wait immediately. `schedule.deadline` bounds every wait, including an
/// in-flight poll.
pub async fn poll_until_ready<F, Fut>(
    target_state: &str,
    name: &str,
    mut poll: F,
    schedule: &GrowingInterval,
    limiter: &RateLimiter,
    cancel: &CancellationToken,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Response>>,
{
    let deadline = Instant::now() + schedule.deadline;
    let mut wait = schedule.initial;
    let mut polls: u32 = 0;
    let mut last_seen = "never observed".to_string();

    let expired = |polls: u32, reason: String| ClientError::Convergence {
        target_state: target_state.to_string(),
        attempts: polls,
        unconverged: vec![UnconvergedResource {
            name: name.to_string(),
            reason,
        }],
    };

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ClientError::cancelled("GET", name)),
            _ = tokio::time::sleep_until(deadline) => return Err(expired(polls, last_seen)),
            _ = tokio::time::sleep(wait) => {}
        }

        let acquired = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ClientError::cancelled("GET", name)),
            _ = tokio::time::sleep_until(deadline) => return Err(expired(polls, last_seen)),
            acquired = limiter.acquire() => acquired,
        };
        if let Err(err) = acquired {
            warn!(error = %err, resource = name, "Rate limiter acquisition failed, polling anyway");
        }

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ClientError::cancelled("GET", name)),
            _ = tokio::time::sleep_until(deadline) => {
                warn!(resource = name, polls, "Deadline reached during status check");
                return Err(expired(polls, "status check still in flight at deadline".to_string()));
            }
            response = poll() => response?,
        };
        polls += 1;

        let status: ResourceStatus = response.json()?;
        if status.status == target_state {
            info!(resource = name, polls, "Resource reached target state");
            return Ok(());
        }

        debug!(resource = name, state = %status.status, next_wait_secs = wait.as_secs(), "Resource not ready");
        last_seen = status.status;
        wait = (wait * 2).min(schedule.max);
    }
}

impl CapellaClient {
    /// Wait until every index in `index_names` reports `Ready`.
    ///
    /// Uses the client's poll settings, retry policy and shared rate limiter.
    pub async fn watch_indexes(
        &self,
        token: &SecretString,
        options: &WatchOptions,
        index_names: &[String],
        cancel: &CancellationToken,
    ) -> Result<()> {
        let settings =
            MonitorSettings::from(self.poll_settings()).with_metrics(self.metrics.clone());

        watch_until_ready(
            INDEX_READY_STATE,
            index_names,
            |endpoint| async move {
                self.execute_with_retry(&endpoint, None, token, cancel)
                    .await
            },
            options,
            &settings,
            self.rate_limiter(),
            cancel,
        )
        .await
    }

    /// Wait for one index build with the default growing schedule.
    pub async fn poll_index(
        &self,
        token: &SecretString,
        options: &WatchOptions,
        index_name: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.poll_index_with_schedule(token, options, index_name, &GrowingInterval::default(), cancel)
            .await
    }

    pub async fn poll_index_with_schedule(
        &self,
        token: &SecretString,
        options: &WatchOptions,
        index_name: &str,
        schedule: &GrowingInterval,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let endpoint = EndpointConfig::get(options.status_url(index_name)?);
        let endpoint = &endpoint;

        poll_until_ready(
            INDEX_READY_STATE,
            index_name,
            || self.execute_with_retry(endpoint, None, token, cancel),
            schedule,
            self.rate_limiter(),
            cancel,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> WatchOptions {
        WatchOptions::for_cluster("https://cloudapi.example.com", "org", "proj", "clu")
            .with_bucket("travel-sample")
    }

    #[test]
    fn test_status_url_default_keyspace() {
        let url = options().status_url("idx_airline").unwrap();
        assert_eq!(
            url,
            "https://cloudapi.example.com/v4/organizations/org/projects/proj/clusters/clu/queryService/indexBuildStatus/idx_airline?bucket=travel-sample&scope=_default&collection=_default"
        );
    }

    #[test]
    fn test_status_url_explicit_keyspace_and_escaping() {
        let url = options()
            .with_scope("inventory")
            .with_collection("airline")
            .status_url("idx name/1")
            .unwrap();
        assert!(url.contains("/indexBuildStatus/idx%20name%2F1?"));
        assert!(url.ends_with("bucket=travel-sample&scope=inventory&collection=airline"));
    }

    #[test]
    fn test_status_url_branches_on_hierarchy() {
        let options = WatchOptions {
            host: "https://cloudapi.example.com/".into(),
            organization_id: Some("org".into()),
            status_path: Some("appservices/status".into()),
            ..WatchOptions::default()
        };
        assert_eq!(
            options.status_url("app1").unwrap(),
            "https://cloudapi.example.com/v4/organizations/org/appservices/status/app1"
        );
    }

    #[test]
    fn test_status_url_rejects_orphan_levels() {
        let orphan_project = WatchOptions {
            host: "https://cloudapi.example.com".into(),
            project_id: Some("proj".into()),
            ..WatchOptions::default()
        };
        assert!(matches!(
            orphan_project.status_url("x"),
            Err(ClientError::InvalidRequest(_))
        ));

        let orphan_scope = WatchOptions::for_cluster("https://h", "o", "p", "c").with_scope("s");
        assert!(orphan_scope.status_url("x").is_err());

        let no_host = WatchOptions::default();
        assert!(no_host.status_url("x").is_err());
    }

    #[test]
    fn test_monitor_settings_from_poll_settings() {
        let settings = MonitorSettings::from(&PollSettings {
            interval: Duration::from_secs(3),
            max_attempts: 7,
            timeout: Duration::from_secs(90),
        });
        assert_eq!(settings.poll_interval, Duration::from_secs(3));
        assert_eq!(settings.max_attempts, 7);
        assert_eq!(settings.deadline, Duration::from_secs(90));
    }
}
