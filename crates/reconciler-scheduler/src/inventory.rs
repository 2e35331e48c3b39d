//! Contract of the cluster inventory

use async_trait::async_trait;

#[cfg(test)]
use mockall::automock;

use reconciler_common::Result;

use crate::model::{ClusterState, ClusterStatus};

/// Trait abstracting the store of cluster configurations and statuses
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Inventory: Send + Sync {
    /// Load the cluster state for a configuration version
    ///
    /// Fails with `NotFound` if the runtime or configuration version is unknown.
    async fn get(&self, runtime_id: &str, config_version: i64) -> Result<ClusterState>;

    /// Record a new status for the cluster and return the updated state
    async fn update_status(&self, state: &ClusterState, status: ClusterStatus)
        -> Result<ClusterState>;

    /// Remove the cluster
    async fn delete(&self, runtime_id: &str) -> Result<()>;
}
