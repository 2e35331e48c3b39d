//! Progress tracking for a batch of applied resources
//!
//! After a component's resources are applied the caller registers them with a
//! [`ProgressTracker`] and waits until all of them are ready (or, after an
//! uninstall, until all of them are gone).

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use reconciler_common::poll::{poll_until, PollOutcome};
use reconciler_common::{Error, Result};

use crate::client::ClusterReader;
use crate::readiness::ReadinessProbe;
use crate::resource::ResourceRef;

/// State the tracked resources are expected to reach
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TargetState {
    /// Every resource passes its readiness rule
    Ready,
    /// Every resource has been removed from the cluster
    Terminated,
}

/// Polling configuration for a [`ProgressTracker`]
#[derive(Clone, Debug)]
pub struct ProgressConfig {
    /// Time between polls
    pub interval: Duration,
    /// Maximum time to wait for the target state
    pub timeout: Duration,
}

impl ProgressConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.interval.is_zero() {
            return Err(Error::validation_for_field(
                "progress.interval",
                "interval must be greater than zero",
            ));
        }
        if self.timeout.is_zero() {
            return Err(Error::validation_for_field(
                "progress.timeout",
                "timeout must be greater than zero",
            ));
        }
        if self.interval > self.timeout {
            return Err(Error::validation_for_field(
                "progress.interval",
                format!(
                    "interval {:?} must not exceed timeout {:?}",
                    self.interval, self.timeout
                ),
            ));
        }
        Ok(())
    }
}

/// Waits for a set of resources to reach a target state
pub struct ProgressTracker {
    client: Arc<dyn ClusterReader>,
    probe: ReadinessProbe,
    config: ProgressConfig,
    resources: Vec<ResourceRef>,
}

impl ProgressTracker {
    /// Create a tracker with a validated configuration
    pub fn new(client: Arc<dyn ClusterReader>, config: ProgressConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            probe: ReadinessProbe::new(client.clone()),
            client,
            config,
            resources: Vec::new(),
        })
    }

    /// Track another resource; duplicates are ignored
    pub fn add_resource(&mut self, resource: ResourceRef) {
        if !self.resources.contains(&resource) {
            self.resources.push(resource);
        }
    }

    /// Resources currently tracked
    pub fn resources(&self) -> &[ResourceRef] {
        &self.resources
    }

    /// Wait until every tracked resource reaches the target state
    ///
    /// Returns [`PollOutcome::Cancelled`] if the token fires first and a
    /// timeout error naming the pending resources if the deadline passes.
    pub async fn watch(&self, target: TargetState, cancel: &CancellationToken) -> Result<PollOutcome> {
        info!(
            resources = self.resources.len(),
            ?target,
            timeout = ?self.config.timeout,
            "waiting for resources"
        );

        let pending = Arc::new(Mutex::new(Vec::<String>::new()));
        let last_pending = pending.clone();

        let outcome = poll_until(
            self.config.timeout,
            self.config.interval,
            cancel,
            move || {
                let names = last_pending
                    .lock()
                    .map(|names| names.join(", "))
                    .unwrap_or_default();
                format!("resources did not reach {:?} in time: {}", target, names)
            },
            || {
                let pending = pending.clone();
                async move {
                    let still_pending = self.pending(target).await?;
                    let done = still_pending.is_empty();
                    if let Ok(mut names) = pending.lock() {
                        *names = still_pending.iter().map(ToString::to_string).collect();
                    }
                    Ok(done)
                }
            },
        )
        .await?;

        debug!(?target, ?outcome, "watch finished");
        Ok(outcome)
    }

    /// Resources not yet in the target state
    ///
    /// A read error on one resource marks it as pending rather than failing
    /// the whole check, so a flaky API server only delays convergence.
    pub async fn pending(&self, target: TargetState) -> Result<Vec<ResourceRef>> {
        let mut pending = Vec::new();
        for resource in &self.resources {
            let reached = match target {
                TargetState::Ready => self.probe.is_ready(resource).await,
                TargetState::Terminated => self
                    .client
                    .get_object(resource)
                    .await
                    .map(|live| live.is_none()),
            };
            match reached {
                Ok(true) => {}
                Ok(false) => pending.push(resource.clone()),
                Err(e) => {
                    warn!(resource = %resource, error = %e, "progress check failed, will retry");
                    pending.push(resource.clone());
                }
            }
        }
        Ok(pending)
    }
}
