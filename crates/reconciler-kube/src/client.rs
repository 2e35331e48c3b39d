//! Read-only access to the cluster API
//!
//! The readiness probe and the update strategy resolver only ever read live
//! state. Reads go through [`ClusterReader`] so tests can substitute a mock;
//! [`KubeReader`] is the kube-rs backed implementation.

use std::fmt::Debug;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, ReplicaSet, StatefulSet};
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, DynamicObject, ListParams};
use kube::Client;
use serde::de::DeserializeOwned;
use tracing::trace;

#[cfg(test)]
use mockall::automock;

use reconciler_common::kube_utils::build_api_resource;
use reconciler_common::{Error, Result};

use crate::resource::ResourceRef;

/// Trait abstracting the cluster API reads the reconciler performs
///
/// Typed getters fail with [`Error::NotFound`] when the object does not exist,
/// so a missing object is never confused with a transport failure.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterReader: Send + Sync {
    /// Get a Deployment
    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Deployment>;

    /// List ReplicaSets matching a label selector
    async fn list_replica_sets(&self, namespace: &str, label_selector: &str)
        -> Result<Vec<ReplicaSet>>;

    /// Get a StatefulSet
    async fn get_stateful_set(&self, namespace: &str, name: &str) -> Result<StatefulSet>;

    /// Get a Pod
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod>;

    /// Get a DaemonSet
    async fn get_daemon_set(&self, namespace: &str, name: &str) -> Result<DaemonSet>;

    /// Get a Job
    async fn get_job(&self, namespace: &str, name: &str) -> Result<Job>;

    /// Get any resource by identity, returning `None` if it does not exist
    async fn get_object(&self, resource: &ResourceRef) -> Result<Option<DynamicObject>>;
}

/// Real cluster reader backed by a kube client
#[derive(Clone)]
pub struct KubeReader {
    client: Client,
}

impl KubeReader {
    /// Create a new KubeReader wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn get_namespaced<K>(&self, namespace: &str, name: &str) -> Result<K>
    where
        K: kube::Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
        K::DynamicType: Default,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        api.get_opt(name).await?.ok_or_else(|| {
            Error::not_found(
                K::kind(&Default::default()),
                format!("{}/{}", namespace, name),
            )
        })
    }
}

#[async_trait]
impl ClusterReader for KubeReader {
    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Deployment> {
        self.get_namespaced(namespace, name).await
    }

    async fn list_replica_sets(
        &self,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<ReplicaSet>> {
        let api: Api<ReplicaSet> = Api::namespaced(self.client.clone(), namespace);
        let list = api
            .list(&ListParams::default().labels(label_selector))
            .await?;
        trace!(namespace, label_selector, count = list.items.len(), "listed replica sets");
        Ok(list.items)
    }

    async fn get_stateful_set(&self, namespace: &str, name: &str) -> Result<StatefulSet> {
        self.get_namespaced(namespace, name).await
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod> {
        self.get_namespaced(namespace, name).await
    }

    async fn get_daemon_set(&self, namespace: &str, name: &str) -> Result<DaemonSet> {
        self.get_namespaced(namespace, name).await
    }

    async fn get_job(&self, namespace: &str, name: &str) -> Result<Job> {
        self.get_namespaced(namespace, name).await
    }

    async fn get_object(&self, resource: &ResourceRef) -> Result<Option<DynamicObject>> {
        let ar = build_api_resource(&resource.api_version, &resource.kind);
        let api: Api<DynamicObject> = match &resource.namespace {
            Some(namespace) => Api::namespaced_with(self.client.clone(), namespace, &ar),
            None => Api::all_with(self.client.clone(), &ar),
        };
        Ok(api.get_opt(&resource.name).await?)
    }
}
