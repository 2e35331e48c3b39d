//! Retention cleaner for reconciliation records
//!
//! Runs one purge pass on start and then one per interval until cancelled.
//! Each pass removes reconciliations created before `now - retention`.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use reconciler_common::{Error, Result};

use crate::repository::{ReconciliationFilter, ReconciliationRepository};
use crate::transition::ClusterStatusTransition;

/// Retention settings of the cleaner
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanerConfig {
    /// Reconciliations older than this are removed
    #[serde(with = "humantime_serde")]
    pub purge_entities_older_than: Duration,
    /// Time between purge passes
    #[serde(with = "humantime_serde")]
    pub cleaner_interval: Duration,
}

impl CleanerConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.purge_entities_older_than.is_zero() {
            return Err(Error::validation_for_field(
                "cleaner.purgeEntitiesOlderThan",
                "retention must be greater than zero",
            ));
        }
        if self.cleaner_interval.is_zero() {
            return Err(Error::validation_for_field(
                "cleaner.cleanerInterval",
                "interval must be greater than zero",
            ));
        }
        Ok(())
    }

    /// Oldest creation time that survives a purge run at `now`
    pub fn deadline(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        let retention = chrono::Duration::from_std(self.purge_entities_older_than).map_err(|e| {
            Error::validation_for_field("cleaner.purgeEntitiesOlderThan", e.to_string())
        })?;
        now.checked_sub_signed(retention).ok_or_else(|| {
            Error::validation_for_field(
                "cleaner.purgeEntitiesOlderThan",
                "retention reaches before the earliest representable time",
            )
        })
    }
}

/// Outcome of one purge pass
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PurgeSummary {
    /// Reconciliations older than the deadline
    pub found: usize,
    /// Reconciliations removed
    pub removed: usize,
    /// Reconciliations whose removal failed
    pub failed: usize,
}

/// Periodically removes old reconciliation records
#[derive(Clone)]
pub struct Cleaner {
    repository: Arc<dyn ReconciliationRepository>,
}

impl Cleaner {
    /// Create a cleaner over the given repository
    pub fn new(repository: Arc<dyn ReconciliationRepository>) -> Self {
        Self { repository }
    }

    /// Create a cleaner over the repository of a transition service
    pub fn for_transition(transition: &ClusterStatusTransition) -> Self {
        Self::new(transition.repository().clone())
    }

    /// Run until `cancel` fires
    ///
    /// The first pass runs immediately. Failures inside a pass are logged and
    /// never stop the loop.
    pub async fn run(&self, config: &CleanerConfig, cancel: CancellationToken) -> Result<()> {
        config.validate()?;
        info!(
            interval = ?config.cleaner_interval,
            retention = ?config.purge_entities_older_than,
            "starting reconciliation cleaner"
        );

        self.purge_pass(config).await;

        let period = config.cleaner_interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("stopping reconciliation cleaner");
                    return Ok(());
                }
                _ = ticker.tick() => {
                    self.purge_pass(config).await;
                }
            }
        }
    }

    async fn purge_pass(&self, config: &CleanerConfig) {
        let deadline = match config.deadline(Utc::now()) {
            Ok(deadline) => deadline,
            Err(e) => {
                error!(error = %e, "cannot compute purge deadline");
                return;
            }
        };
        if let Err(e) = self.purge_before(deadline).await {
            error!(%deadline, error = %e, "failed to get reconciliations for purge");
        }
    }

    /// Remove every reconciliation created before `deadline`
    ///
    /// A failed removal is logged and counted; the remaining entities are
    /// still attempted. Only a failure to list the candidates is returned.
    pub async fn purge_before(&self, deadline: DateTime<Utc>) -> Result<PurgeSummary> {
        let candidates = self
            .repository
            .get_reconciliations(&ReconciliationFilter::CreatedBefore { time: deadline })
            .await?;

        let mut summary = PurgeSummary {
            found: candidates.len(),
            ..Default::default()
        };
        for entity in &candidates {
            info!(
                scheduling_id = %entity.scheduling_id,
                runtime_id = %entity.runtime_id,
                created = %entity.created,
                "purging reconciliation"
            );
            match self
                .repository
                .remove_reconciliation(&entity.scheduling_id)
                .await
            {
                Ok(()) => summary.removed += 1,
                Err(e) => {
                    error!(
                        scheduling_id = %entity.scheduling_id,
                        error = %e,
                        "failed to remove reconciliation"
                    );
                    summary.failed += 1;
                }
            }
        }

        debug!(%deadline, ?summary, "purge pass finished");
        Ok(summary)
    }
}
