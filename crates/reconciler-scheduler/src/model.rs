//! Persisted cluster and reconciliation records

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a cluster
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterStatus {
    /// Waiting for the first (or next) reconciliation
    #[default]
    ReconcilePending,
    /// A reconciliation run is in flight
    Reconciling,
    /// Reconciliation failed and will not be retried
    ReconcileError,
    /// Reconciliation failed and may be retried
    Error,
    /// Reconciliation is switched off for this cluster
    ReconcileDisabled,
    /// Cluster converged to its desired configuration
    Ready,
    /// Cluster is marked for removal
    DeletePending,
    /// A deletion run is in flight
    Deleting,
    /// Deletion failed and will not be retried
    DeleteError,
    /// Deletion failed and may be retried
    DeleteErrorRetryable,
    /// Cluster was removed
    Deleted,
}

impl ClusterStatus {
    /// The cluster is marked for removal and a deletion run may start
    pub fn is_delete_candidate(self) -> bool {
        matches!(self, Self::DeletePending | Self::DeleteErrorRetryable)
    }

    /// The cluster may start a new reconciliation run
    pub fn is_reconcile_candidate(self) -> bool {
        matches!(self, Self::ReconcilePending | Self::Ready | Self::Error)
    }

    /// A reconciliation or deletion run is active
    pub fn is_in_progress(self) -> bool {
        matches!(self, Self::Reconciling | Self::Deleting)
    }

    /// Wire name of the status
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ReconcilePending => "reconcile_pending",
            Self::Reconciling => "reconciling",
            Self::ReconcileError => "reconcile_error",
            Self::Error => "error",
            Self::ReconcileDisabled => "reconcile_disabled",
            Self::Ready => "ready",
            Self::DeletePending => "delete_pending",
            Self::Deleting => "deleting",
            Self::DeleteError => "delete_error",
            Self::DeleteErrorRetryable => "delete_error_retryable",
            Self::Deleted => "deleted",
        }
    }
}

impl fmt::Display for ClusterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cluster identity and version
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    /// Runtime the cluster belongs to
    pub runtime_id: String,
    /// Version of the cluster record
    pub version: i64,
}

/// Desired configuration of a cluster at a given version
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    /// Runtime the configuration belongs to
    pub runtime_id: String,
    /// Configuration version
    pub version: i64,
    /// Version of the cluster record this configuration belongs to
    pub cluster_version: i64,
}

/// One entry of a cluster's status history
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEntry {
    /// Monotonic identifier of this status entry
    pub id: i64,
    /// Runtime the status belongs to
    pub runtime_id: String,
    /// Cluster version the status was recorded for
    pub cluster_version: i64,
    /// Configuration version the status was recorded for
    pub config_version: i64,
    /// The status itself
    pub status: ClusterStatus,
    /// When the status was recorded
    pub created: DateTime<Utc>,
}

/// Snapshot of a cluster's configuration and current status
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterState {
    /// Cluster identity
    pub cluster: Cluster,
    /// Desired configuration
    pub configuration: Configuration,
    /// Latest status
    pub status: StatusEntry,
}

impl ClusterState {
    /// Runtime ID of the cluster
    pub fn runtime_id(&self) -> &str {
        &self.cluster.runtime_id
    }

    /// Current status of the cluster
    pub fn current_status(&self) -> ClusterStatus {
        self.status.status
    }
}

/// One reconciliation run
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationEntity {
    /// Unique identifier of the run
    pub scheduling_id: String,
    /// Runtime being reconciled
    pub runtime_id: String,
    /// Configuration version being applied
    pub cluster_config: i64,
    /// Status entry the run was started from (or finished with)
    pub cluster_config_status: i64,
    /// Status the cluster ended up in once the run finished
    pub status: ClusterStatus,
    /// Whether the run has finished
    pub finished: bool,
    /// Components that must be reconciled first, grouped in order
    pub pre_components: Vec<Vec<String>>,
    /// When the run was created
    pub created: DateTime<Utc>,
    /// When the run was last updated
    pub updated: DateTime<Utc>,
}

impl fmt::Display for ReconciliationEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Reconciliation [SchedulingID={},RuntimeID={},ClusterConfig={},Finished={}]",
            self.scheduling_id, self.runtime_id, self.cluster_config, self.finished
        )
    }
}
