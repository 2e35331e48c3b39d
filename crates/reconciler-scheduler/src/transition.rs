//! Cluster status transitions around a reconciliation run
//!
//! Starting a run moves the cluster into an in-progress status and enqueues a
//! [`ReconciliationEntity`]; finishing it records the resulting status. Status
//! and entity live in two collaborators, so a failed entity insert is followed
//! by a compensating status revert.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use reconciler_common::{Error, Result};

use crate::db::{transaction, Connection};
use crate::inventory::Inventory;
use crate::model::{ClusterState, ClusterStatus, ReconciliationEntity};
use crate::repository::{ReconciliationFilter, ReconciliationRepository};

/// Orchestrates the status changes of a cluster around a reconciliation run
pub struct ClusterStatusTransition {
    conn: Arc<dyn Connection>,
    inventory: Arc<dyn Inventory>,
    repository: Arc<dyn ReconciliationRepository>,
}

impl ClusterStatusTransition {
    /// Create a transition service over the given collaborators
    pub fn new(
        conn: Arc<dyn Connection>,
        inventory: Arc<dyn Inventory>,
        repository: Arc<dyn ReconciliationRepository>,
    ) -> Self {
        Self {
            conn,
            inventory,
            repository,
        }
    }

    /// The cluster inventory
    pub fn inventory(&self) -> &Arc<dyn Inventory> {
        &self.inventory
    }

    /// The reconciliation repository
    pub fn repository(&self) -> &Arc<dyn ReconciliationRepository> {
        &self.repository
    }

    /// Enqueue a reconciliation run for a cluster
    ///
    /// Fails with `AlreadyEnqueued` or `DuplicateReconciliation` when another
    /// run owns the runtime, and with `NotEligible` when the cluster status
    /// permits neither reconciliation nor deletion. An empty component set is
    /// a configuration error: the cluster ends up in `ReconcileError`, written
    /// in the same unit of work that rejects the run.
    pub async fn start_reconciliation(
        &self,
        runtime_id: &str,
        config_version: i64,
        pre_components: Vec<Vec<String>>,
    ) -> Result<ReconciliationEntity> {
        let rejected = AtomicBool::new(false);
        let outcome = transaction(self.conn.as_ref(), || {
            self.enqueue(runtime_id, config_version, &pre_components, &rejected)
        })
        .await;

        match outcome {
            Ok(started) => started,
            Err(e) if rejected.load(Ordering::SeqCst) => {
                error!(runtime_id, error = %e, "could not persist reconcile_error status");
                Err(Error::EmptyComponents {
                    runtime_id: runtime_id.to_string(),
                }
                .with_revert_failure(e))
            }
            Err(e) => Err(e),
        }
    }

    /// The outer error rolls the unit of work back; the inner one is returned
    /// after a commit.
    async fn enqueue(
        &self,
        runtime_id: &str,
        config_version: i64,
        pre_components: &[Vec<String>],
        rejected: &AtomicBool,
    ) -> Result<Result<ReconciliationEntity>> {
        let open = self
            .repository
            .get_reconciliations(&ReconciliationFilter::CurrentlyReconcilingWithRuntimeId {
                runtime_id: runtime_id.to_string(),
            })
            .await?;
        if let Some(existing) = open.first() {
            debug!(
                runtime_id,
                scheduling_id = %existing.scheduling_id,
                "cluster already enqueued"
            );
            return Err(Error::AlreadyEnqueued {
                runtime_id: runtime_id.to_string(),
                scheduling_id: existing.scheduling_id.clone(),
            });
        }

        let old_state = self
            .inventory
            .get(runtime_id, config_version)
            .await
            .inspect_err(|e| {
                error!(runtime_id, config_version, error = %e, "could not get latest cluster state");
            })?;

        let old_status = old_state.current_status();
        let target_status = if old_status.is_delete_candidate() {
            ClusterStatus::Deleting
        } else if old_status.is_reconcile_candidate() {
            ClusterStatus::Reconciling
        } else {
            return Err(Error::NotEligible {
                runtime_id: runtime_id.to_string(),
                status: old_status.to_string(),
            });
        };

        let new_state = self
            .inventory
            .update_status(&old_state, target_status)
            .await
            .inspect_err(|e| {
                error!(runtime_id, %target_status, error = %e, "could not update cluster status");
            })?;
        debug!(runtime_id, status = %old_status, %target_status, "cluster status updated");

        let err = match self
            .repository
            .create_reconciliation(&new_state, pre_components)
            .await
        {
            Ok(entity) => {
                info!(
                    runtime_id,
                    scheduling_id = %entity.scheduling_id,
                    "reconciliation enqueued"
                );
                return Ok(Ok(entity));
            }
            Err(e) => e,
        };

        if err.is_empty_components() {
            error!(
                runtime_id,
                from = %old_status,
                to = %target_status,
                "cluster has no components"
            );
            return match self
                .revert_status(&new_state, ClusterStatus::ReconcileError)
                .await
            {
                Ok(()) => {
                    rejected.store(true, Ordering::SeqCst);
                    Ok(Err(err))
                }
                Err(revert) => Err(err.with_revert_failure(revert)),
            };
        }

        if err.is_conflict() {
            info!(
                runtime_id,
                from = %old_status,
                to = %target_status,
                "cluster is already enqueued by a concurrent caller"
            );
        } else {
            error!(
                runtime_id,
                from = %old_status,
                to = %target_status,
                error = %err,
                "could not add cluster to reconciliation queue"
            );
        }

        match self.revert_status(&new_state, old_status).await {
            Ok(()) => Err(err),
            Err(revert) => Err(err.with_revert_failure(revert)),
        }
    }

    /// Status revert after a failed entity insert
    async fn revert_status(&self, state: &ClusterState, status: ClusterStatus) -> Result<()> {
        match self.inventory.update_status(state, status).await {
            Ok(_) => {
                debug!(
                    runtime_id = %state.runtime_id(),
                    from = %state.current_status(),
                    to = %status,
                    "cluster status reverted"
                );
                Ok(())
            }
            Err(revert) => {
                error!(
                    runtime_id = %state.runtime_id(),
                    from = %state.current_status(),
                    to = %status,
                    error = %revert,
                    "failed to revert cluster status"
                );
                Err(revert)
            }
        }
    }

    /// Mark a reconciliation run as finished
    ///
    /// The cluster status is set to `status` only while the cluster is still
    /// in progress. Finishing with `Deleted` removes the cluster from the
    /// inventory. A second call for the same run fails with `AlreadyFinished`.
    pub async fn finish_reconciliation(
        &self,
        scheduling_id: &str,
        status: ClusterStatus,
    ) -> Result<()> {
        transaction(self.conn.as_ref(), || self.finish(scheduling_id, status)).await
    }

    async fn finish(&self, scheduling_id: &str, status: ClusterStatus) -> Result<()> {
        let entity = self
            .repository
            .get_reconciliation(scheduling_id)
            .await
            .inspect_err(|e| {
                error!(scheduling_id, error = %e, "could not retrieve reconciliation");
            })?;

        if entity.finished {
            debug!(
                runtime_id = %entity.runtime_id,
                scheduling_id,
                "reconciliation is already finished"
            );
            return Err(Error::AlreadyFinished {
                scheduling_id: scheduling_id.to_string(),
            });
        }

        let runtime_id = entity.runtime_id.as_str();
        let mut state = self
            .inventory
            .get(runtime_id, entity.cluster_config)
            .await
            .inspect_err(|e| {
                error!(runtime_id, scheduling_id, error = %e, "could not get cluster state");
            })?;

        if state.current_status().is_in_progress() {
            state = self
                .inventory
                .update_status(&state, status)
                .await
                .inspect_err(|e| {
                    error!(
                        runtime_id,
                        scheduling_id,
                        target_status = %status,
                        error = %e,
                        "could not update cluster status"
                    );
                })?;
        } else {
            warn!(
                runtime_id,
                scheduling_id,
                status = %state.current_status(),
                target_status = %status,
                cluster_version = state.cluster.version,
                config_version = state.configuration.version,
                "skipped cluster status update"
            );
        }

        self.repository
            .finish_reconciliation(scheduling_id, &state.status)
            .await
            .inspect_err(|e| {
                error!(runtime_id, scheduling_id, error = %e, "could not finish reconciliation");
            })?;
        debug!(
            runtime_id,
            scheduling_id,
            status = %state.current_status(),
            "reconciliation finished"
        );

        if status == ClusterStatus::Deleted {
            self.inventory.delete(runtime_id).await?;
            info!(runtime_id, "cluster deleted");
        }
        Ok(())
    }
}
