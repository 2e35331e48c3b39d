//! In-memory store implementing the inventory, repository and transactions
//!
//! Transactions are serialized by an async lock, so the check-then-insert
//! inside `create_reconciliation` can never interleave with another
//! transaction. Writes issued outside a unit of work take the same lock and
//! wait for the open transaction to end; rollback restores the snapshot taken
//! when the transaction began, which therefore only holds its own writes.
//! Reads never wait and may observe uncommitted writes.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{MutexGuard as WriteGuard, OwnedMutexGuard};
use tracing::debug;
use uuid::Uuid;

use reconciler_common::{Error, Result};

use crate::db::{in_transaction, Connection, Transaction};
use crate::inventory::Inventory;
use crate::model::{
    Cluster, ClusterState, ClusterStatus, Configuration, ReconciliationEntity, StatusEntry,
};
use crate::repository::{ReconciliationFilter, ReconciliationRepository};

#[derive(Clone, Debug)]
struct ClusterRecord {
    cluster: Cluster,
    configurations: BTreeMap<i64, Configuration>,
    statuses: Vec<StatusEntry>,
}

#[derive(Clone, Debug, Default)]
struct Tables {
    clusters: BTreeMap<String, ClusterRecord>,
    reconciliations: BTreeMap<String, ReconciliationEntity>,
    next_status_id: i64,
}

/// Shared in-memory store
///
/// Cloning yields another handle to the same data.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    tx_lock: Arc<tokio::sync::Mutex<()>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| Error::store("memory_store", "store lock poisoned"))
    }

    /// Serialize a write with open transactions
    ///
    /// Inside a unit of work the transaction already holds the lock.
    async fn write_guard(&self) -> Option<WriteGuard<'_, ()>> {
        if in_transaction() {
            None
        } else {
            Some(self.tx_lock.lock().await)
        }
    }

    /// Register a cluster with one configuration version and an initial status
    ///
    /// Registering an existing runtime adds the configuration and records the
    /// status as the latest one.
    pub async fn register_cluster(
        &self,
        runtime_id: &str,
        config_version: i64,
        status: ClusterStatus,
    ) -> Result<ClusterState> {
        let _guard = self.write_guard().await;
        let mut tables = self.tables()?;
        let status_id = next_status_id(&mut tables);

        let record = tables
            .clusters
            .entry(runtime_id.to_string())
            .or_insert_with(|| ClusterRecord {
                cluster: Cluster {
                    runtime_id: runtime_id.to_string(),
                    version: 1,
                },
                configurations: BTreeMap::new(),
                statuses: Vec::new(),
            });

        let configuration = Configuration {
            runtime_id: runtime_id.to_string(),
            version: config_version,
            cluster_version: record.cluster.version,
        };
        record
            .configurations
            .insert(config_version, configuration.clone());

        let entry = StatusEntry {
            id: status_id,
            runtime_id: runtime_id.to_string(),
            cluster_version: record.cluster.version,
            config_version,
            status,
            created: Utc::now(),
        };
        record.statuses.push(entry.clone());

        Ok(ClusterState {
            cluster: record.cluster.clone(),
            configuration,
            status: entry,
        })
    }

    /// Status history of a runtime, oldest first
    pub fn status_history(&self, runtime_id: &str) -> Result<Vec<ClusterStatus>> {
        let tables = self.tables()?;
        let record = tables
            .clusters
            .get(runtime_id)
            .ok_or_else(|| Error::not_found("cluster", runtime_id))?;
        Ok(record.statuses.iter().map(|s| s.status).collect())
    }

    /// Overwrite the creation time of a reconciliation
    pub async fn set_created(&self, scheduling_id: &str, created: DateTime<Utc>) -> Result<()> {
        let _guard = self.write_guard().await;
        let mut tables = self.tables()?;
        let entity = tables
            .reconciliations
            .get_mut(scheduling_id)
            .ok_or_else(|| Error::not_found("reconciliation", scheduling_id))?;
        entity.created = created;
        Ok(())
    }
}

fn next_status_id(tables: &mut Tables) -> i64 {
    tables.next_status_id += 1;
    tables.next_status_id
}

/// Transaction over a [`MemoryStore`]
pub struct MemoryTransaction {
    tables: Arc<Mutex<Tables>>,
    snapshot: Tables,
    _guard: OwnedMutexGuard<()>,
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn commit(self: Box<Self>) -> Result<()> {
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        let MemoryTransaction {
            tables, snapshot, ..
        } = *self;
        let mut tables = tables
            .lock()
            .map_err(|_| Error::store("rollback", "store lock poisoned"))?;
        *tables = snapshot;
        Ok(())
    }
}

#[async_trait]
impl Connection for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn Transaction>> {
        let guard = self.tx_lock.clone().lock_owned().await;
        let snapshot = self.tables()?.clone();
        Ok(Box::new(MemoryTransaction {
            tables: self.tables.clone(),
            snapshot,
            _guard: guard,
        }))
    }
}

#[async_trait]
impl Inventory for MemoryStore {
    async fn get(&self, runtime_id: &str, config_version: i64) -> Result<ClusterState> {
        let tables = self.tables()?;
        let record = tables
            .clusters
            .get(runtime_id)
            .ok_or_else(|| Error::not_found("cluster", runtime_id))?;
        let configuration = record
            .configurations
            .get(&config_version)
            .cloned()
            .ok_or_else(|| {
                Error::not_found(
                    "cluster configuration",
                    format!("{}/{}", runtime_id, config_version),
                )
            })?;
        let status = record
            .statuses
            .last()
            .cloned()
            .ok_or_else(|| Error::not_found("cluster status", runtime_id))?;

        Ok(ClusterState {
            cluster: record.cluster.clone(),
            configuration,
            status,
        })
    }

    async fn update_status(
        &self,
        state: &ClusterState,
        status: ClusterStatus,
    ) -> Result<ClusterState> {
        let _guard = self.write_guard().await;
        let mut tables = self.tables()?;
        let status_id = next_status_id(&mut tables);
        let record = tables
            .clusters
            .get_mut(state.runtime_id())
            .ok_or_else(|| Error::not_found("cluster", state.runtime_id()))?;

        let entry = StatusEntry {
            id: status_id,
            runtime_id: state.cluster.runtime_id.clone(),
            cluster_version: state.cluster.version,
            config_version: state.configuration.version,
            status,
            created: Utc::now(),
        };
        record.statuses.push(entry.clone());
        debug!(runtime_id = %state.runtime_id(), %status, "cluster status updated");

        Ok(ClusterState {
            cluster: state.cluster.clone(),
            configuration: state.configuration.clone(),
            status: entry,
        })
    }

    async fn delete(&self, runtime_id: &str) -> Result<()> {
        let _guard = self.write_guard().await;
        let mut tables = self.tables()?;
        tables
            .clusters
            .remove(runtime_id)
            .map(|_| ())
            .ok_or_else(|| Error::not_found("cluster", runtime_id))
    }
}

#[async_trait]
impl ReconciliationRepository for MemoryStore {
    async fn get_reconciliations(
        &self,
        filter: &ReconciliationFilter,
    ) -> Result<Vec<ReconciliationEntity>> {
        let tables = self.tables()?;
        let mut matching: Vec<ReconciliationEntity> = tables
            .reconciliations
            .values()
            .filter(|entity| filter.matches(entity))
            .cloned()
            .collect();

        if let ReconciliationFilter::CreatedBefore { .. } = filter {
            matching.sort_by(|a, b| {
                (a.created, &a.scheduling_id).cmp(&(b.created, &b.scheduling_id))
            });
        }
        Ok(matching)
    }

    async fn create_reconciliation(
        &self,
        state: &ClusterState,
        pre_components: &[Vec<String>],
    ) -> Result<ReconciliationEntity> {
        let runtime_id = state.runtime_id();
        if pre_components.is_empty() {
            return Err(Error::EmptyComponents {
                runtime_id: runtime_id.to_string(),
            });
        }

        let _guard = self.write_guard().await;
        let mut tables = self.tables()?;
        let duplicate = tables
            .reconciliations
            .values()
            .any(|entity| !entity.finished && entity.runtime_id == runtime_id);
        if duplicate {
            return Err(Error::DuplicateReconciliation {
                runtime_id: runtime_id.to_string(),
            });
        }

        let now = Utc::now();
        let entity = ReconciliationEntity {
            scheduling_id: Uuid::new_v4().to_string(),
            runtime_id: runtime_id.to_string(),
            cluster_config: state.configuration.version,
            cluster_config_status: state.status.id,
            status: state.status.status,
            finished: false,
            pre_components: pre_components.to_vec(),
            created: now,
            updated: now,
        };
        tables
            .reconciliations
            .insert(entity.scheduling_id.clone(), entity.clone());
        Ok(entity)
    }

    async fn get_reconciliation(&self, scheduling_id: &str) -> Result<ReconciliationEntity> {
        self.tables()?
            .reconciliations
            .get(scheduling_id)
            .cloned()
            .ok_or_else(|| Error::not_found("reconciliation", scheduling_id))
    }

    async fn finish_reconciliation(&self, scheduling_id: &str, status: &StatusEntry) -> Result<()> {
        let _guard = self.write_guard().await;
        let mut tables = self.tables()?;
        let entity = tables
            .reconciliations
            .get_mut(scheduling_id)
            .ok_or_else(|| Error::not_found("reconciliation", scheduling_id))?;
        entity.finished = true;
        entity.status = status.status;
        entity.cluster_config_status = status.id;
        entity.updated = Utc::now();
        Ok(())
    }

    async fn remove_reconciliation(&self, scheduling_id: &str) -> Result<()> {
        let _guard = self.write_guard().await;
        self.tables()?
            .reconciliations
            .remove(scheduling_id)
            .map(|_| ())
            .ok_or_else(|| Error::not_found("reconciliation", scheduling_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::transaction;

    fn pre_components() -> Vec<Vec<String>> {
        vec![vec!["cluster-essentials".to_string()]]
    }

    #[tokio::test]
    async fn test_inventory_get_and_update() {
        let store = MemoryStore::new();
        store
            .register_cluster("runtime-1", 1, ClusterStatus::Ready)
            .await
            .unwrap();

        let state = store.get("runtime-1", 1).await.unwrap();
        assert_eq!(state.current_status(), ClusterStatus::Ready);

        let updated = store
            .update_status(&state, ClusterStatus::Reconciling)
            .await
            .unwrap();
        assert_eq!(updated.current_status(), ClusterStatus::Reconciling);
        assert!(updated.status.id > state.status.id);

        assert_eq!(
            store.status_history("runtime-1").unwrap(),
            vec![ClusterStatus::Ready, ClusterStatus::Reconciling]
        );
    }

    #[tokio::test]
    async fn test_inventory_unknown_config_version() {
        let store = MemoryStore::new();
        store
            .register_cluster("runtime-1", 1, ClusterStatus::Ready)
            .await
            .unwrap();
        assert!(store.get("runtime-1", 2).await.unwrap_err().is_not_found());
        assert!(store.get("runtime-2", 1).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_second_open_reconciliation_is_rejected() {
        let store = MemoryStore::new();
        let state = store
            .register_cluster("runtime-1", 1, ClusterStatus::Ready)
            .await
            .unwrap();

        let first = store
            .create_reconciliation(&state, &pre_components())
            .await
            .unwrap();
        let err = store
            .create_reconciliation(&state, &pre_components())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateReconciliation { .. }));

        store
            .finish_reconciliation(&first.scheduling_id, &state.status)
            .await
            .unwrap();
        assert!(store
            .create_reconciliation(&state, &pre_components())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_empty_pre_components_rejected() {
        let store = MemoryStore::new();
        let state = store
            .register_cluster("runtime-1", 1, ClusterStatus::Ready)
            .await
            .unwrap();
        let err = store.create_reconciliation(&state, &[]).await.unwrap_err();
        assert!(err.is_empty_components());
    }

    #[tokio::test]
    async fn test_created_before_is_ordered_by_creation() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let mut ids = Vec::new();
        for (i, runtime) in ["a", "b", "c"].iter().enumerate() {
            let state = store
                .register_cluster(runtime, 1, ClusterStatus::Ready)
                .await
                .unwrap();
            let entity = store
                .create_reconciliation(&state, &pre_components())
                .await
                .unwrap();
            let age = chrono::Duration::days(10 - i64::try_from(i).unwrap() * 3);
            store
                .set_created(&entity.scheduling_id, now - age)
                .await
                .unwrap();
            ids.push(entity.scheduling_id);
        }

        let old = store
            .get_reconciliations(&ReconciliationFilter::CreatedBefore {
                time: now - chrono::Duration::days(5),
            })
            .await
            .unwrap();
        let old_ids: Vec<_> = old.into_iter().map(|e| e.scheduling_id).collect();
        assert_eq!(old_ids, ids[..2].to_vec());
    }

    #[tokio::test]
    async fn test_rollback_restores_snapshot() {
        let store = MemoryStore::new();
        let state = store
            .register_cluster("runtime-1", 1, ClusterStatus::Ready)
            .await
            .unwrap();

        let result: Result<()> = transaction(&store, || async {
            store
                .update_status(&state, ClusterStatus::Reconciling)
                .await?;
            store.create_reconciliation(&state, &pre_components()).await?;
            Err(Error::internal("boom"))
        })
        .await;
        assert!(result.is_err());

        assert_eq!(
            store.get("runtime-1", 1).await.unwrap().current_status(),
            ClusterStatus::Ready
        );
        assert!(store
            .get_reconciliations(&ReconciliationFilter::CurrentlyReconcilingWithRuntimeId {
                runtime_id: "runtime-1".to_string(),
            })
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_rollback_keeps_writes_made_outside_the_transaction() {
        let store = MemoryStore::new();
        let state = store
            .register_cluster("runtime-1", 1, ClusterStatus::Ready)
            .await
            .unwrap();
        let entity = store
            .create_reconciliation(&state, &pre_components())
            .await
            .unwrap();

        let tx = store.begin().await.unwrap();
        let remover = {
            let store = store.clone();
            let scheduling_id = entity.scheduling_id.clone();
            tokio::spawn(async move { store.remove_reconciliation(&scheduling_id).await })
        };
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(!remover.is_finished());
        assert!(store.get_reconciliation(&entity.scheduling_id).await.is_ok());

        tx.rollback().await.unwrap();
        remover.await.unwrap().unwrap();
        assert!(store
            .get_reconciliation(&entity.scheduling_id)
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_commit_keeps_writes() {
        let store = MemoryStore::new();
        let state = store
            .register_cluster("runtime-1", 1, ClusterStatus::Ready)
            .await
            .unwrap();

        transaction(&store, || async {
            store
                .update_status(&state, ClusterStatus::Reconciling)
                .await
                .map(|_| ())
        })
        .await
        .unwrap();

        assert_eq!(
            store.get("runtime-1", 1).await.unwrap().current_status(),
            ClusterStatus::Reconciling
        );
    }

    #[tokio::test]
    async fn test_remove_and_delete() {
        let store = MemoryStore::new();
        let state = store
            .register_cluster("runtime-1", 1, ClusterStatus::Ready)
            .await
            .unwrap();
        let entity = store
            .create_reconciliation(&state, &pre_components())
            .await
            .unwrap();

        store
            .remove_reconciliation(&entity.scheduling_id)
            .await
            .unwrap();
        assert!(store
            .remove_reconciliation(&entity.scheduling_id)
            .await
            .unwrap_err()
            .is_not_found());

        store.delete("runtime-1").await.unwrap();
        assert!(store.get("runtime-1", 1).await.unwrap_err().is_not_found());
    }
}
