//! Persistence contract for reconciliation records

use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[cfg(test)]
use mockall::automock;

use reconciler_common::Result;

use crate::model::{ClusterState, ReconciliationEntity, StatusEntry};

/// Queries supported by [`ReconciliationRepository::get_reconciliations`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReconciliationFilter {
    /// The non-finished reconciliation of a runtime (at most one exists)
    CurrentlyReconcilingWithRuntimeId {
        /// Runtime to look up
        runtime_id: String,
    },
    /// Reconciliations created strictly before the given time
    CreatedBefore {
        /// Exclusive upper bound on the creation time
        time: DateTime<Utc>,
    },
}

impl ReconciliationFilter {
    /// Check whether an entity matches the filter
    pub fn matches(&self, entity: &ReconciliationEntity) -> bool {
        match self {
            Self::CurrentlyReconcilingWithRuntimeId { runtime_id } => {
                !entity.finished && entity.runtime_id == *runtime_id
            }
            Self::CreatedBefore { time } => entity.created < *time,
        }
    }
}

/// Trait abstracting storage of reconciliation records
///
/// Implementations must reject a second non-finished reconciliation for the
/// same runtime even when the inserts race in concurrent transactions.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ReconciliationRepository: Send + Sync {
    /// List reconciliations matching the filter
    ///
    /// The order is stable for a fixed snapshot of the store.
    async fn get_reconciliations(
        &self,
        filter: &ReconciliationFilter,
    ) -> Result<Vec<ReconciliationEntity>>;

    /// Create a reconciliation for the cluster state
    ///
    /// Fails with `EmptyComponents` when `pre_components` is empty and with
    /// `DuplicateReconciliation` when a non-finished run already exists.
    async fn create_reconciliation(
        &self,
        state: &ClusterState,
        pre_components: &[Vec<String>],
    ) -> Result<ReconciliationEntity>;

    /// Get a reconciliation by scheduling ID
    async fn get_reconciliation(&self, scheduling_id: &str) -> Result<ReconciliationEntity>;

    /// Mark a reconciliation as finished with the resulting cluster status
    async fn finish_reconciliation(&self, scheduling_id: &str, status: &StatusEntry) -> Result<()>;

    /// Delete a reconciliation
    async fn remove_reconciliation(&self, scheduling_id: &str) -> Result<()>;
}
