//! Resource readiness probe
//!
//! Decides whether a just-applied resource has converged. Each supported kind
//! has its own rule, selected by [`ReadinessRule::for_kind`]; kinds without a
//! dedicated rule count as ready once the object is observed to exist.
//!
//! The rule bodies are pure functions over the fetched objects so they can be
//! tested with literal inputs; [`ReadinessProbe`] only does the reads.

use std::sync::Arc;

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, ReplicaSet, StatefulSet};
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{Pod, PodTemplateSpec};
use tracing::debug;

use reconciler_common::kube_utils::label_selector_string;
use reconciler_common::{Result, POD_TEMPLATE_HASH_LABEL};

use crate::client::ClusterReader;
use crate::resource::ResourceRef;

/// Minimum ready replicas of the current ReplicaSet for a ready Deployment
const EXPECTED_READY_REPLICAS: i32 = 1;
/// Minimum ready pods for a ready DaemonSet
const EXPECTED_READY_DAEMON_SET: i32 = 1;

const POD_RUNNING: &str = "Running";
const CONDITION_TRUE: &str = "True";

/// Readiness rule selected by resource kind
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadinessRule {
    /// Current ReplicaSet has at least one ready replica
    Deployment,
    /// Updated and ready replica counts match the spec (respecting partitions)
    StatefulSet,
    /// Running, all conditions true and not terminating
    Pod,
    /// All pods updated and at least one ready
    DaemonSet,
    /// All reported conditions true
    Job,
    /// Ready once the object exists
    Default,
}

impl ReadinessRule {
    /// Look up the rule for a resource kind
    pub fn for_kind(kind: &str) -> Self {
        match kind {
            "Deployment" => Self::Deployment,
            "StatefulSet" => Self::StatefulSet,
            "Pod" => Self::Pod,
            "DaemonSet" => Self::DaemonSet,
            "Job" => Self::Job,
            _ => Self::Default,
        }
    }
}

/// Probe that reads live state and applies the kind-specific readiness rule
#[derive(Clone)]
pub struct ReadinessProbe {
    client: Arc<dyn ClusterReader>,
}

impl ReadinessProbe {
    /// Create a probe reading through the given client
    pub fn new(client: Arc<dyn ClusterReader>) -> Self {
        Self { client }
    }

    /// Check whether the resource has converged
    ///
    /// Read errors, including a missing object for the kinds with a dedicated
    /// rule, are returned as errors rather than a "not ready" verdict.
    pub async fn is_ready(&self, resource: &ResourceRef) -> Result<bool> {
        let namespace = resource.namespace_or_default();
        let name = resource.name.as_str();

        let ready = match ReadinessRule::for_kind(&resource.kind) {
            ReadinessRule::Deployment => {
                let deployment = self.client.get_deployment(namespace, name).await?;
                self.is_deployment_ready(&deployment).await?
            }
            ReadinessRule::StatefulSet => {
                is_stateful_set_ready(&self.client.get_stateful_set(namespace, name).await?)
            }
            ReadinessRule::Pod => is_pod_ready(&self.client.get_pod(namespace, name).await?),
            ReadinessRule::DaemonSet => {
                is_daemon_set_ready(&self.client.get_daemon_set(namespace, name).await?)
            }
            ReadinessRule::Job => is_job_ready(&self.client.get_job(namespace, name).await?),
            ReadinessRule::Default => self.client.get_object(resource).await?.is_some(),
        };

        debug!(resource = %resource, ready, "readiness probed");
        Ok(ready)
    }

    async fn is_deployment_ready(&self, deployment: &Deployment) -> Result<bool> {
        let replica_set = self.current_replica_set(deployment).await?;
        Ok(replica_set.as_ref().is_some_and(is_replica_set_ready))
    }

    /// Find the ReplicaSet the Deployment currently targets
    async fn current_replica_set(&self, deployment: &Deployment) -> Result<Option<ReplicaSet>> {
        let Some(spec) = deployment.spec.as_ref() else {
            return Ok(None);
        };
        let namespace = deployment.metadata.namespace.as_deref().unwrap_or("default");
        let selector = label_selector_string(&spec.selector)?;

        let owned: Vec<ReplicaSet> = self
            .client
            .list_replica_sets(namespace, &selector)
            .await?
            .into_iter()
            .filter(|rs| is_controlled_by(rs, deployment))
            .collect();

        Ok(find_new_replica_set(deployment, owned))
    }
}

/// Check whether the Deployment is the controller owner of the ReplicaSet
pub fn is_controlled_by(replica_set: &ReplicaSet, deployment: &Deployment) -> bool {
    let Some(uid) = deployment.metadata.uid.as_deref() else {
        return false;
    };
    replica_set
        .metadata
        .owner_references
        .iter()
        .flatten()
        .any(|owner| owner.controller == Some(true) && owner.uid == uid)
}

/// Pick the ReplicaSet whose pod template matches the Deployment's template
///
/// Candidates are ordered by creation time, ties broken by name, and the
/// oldest match wins. More than one match can exist after cluster upgrades.
pub fn find_new_replica_set(
    deployment: &Deployment,
    mut replica_sets: Vec<ReplicaSet>,
) -> Option<ReplicaSet> {
    let template = &deployment.spec.as_ref()?.template;

    replica_sets.sort_by(|a, b| {
        let key = |rs: &ReplicaSet| {
            (
                rs.metadata.creation_timestamp.as_ref().map(|t| t.0),
                rs.metadata.name.clone(),
            )
        };
        key(a).cmp(&key(b))
    });

    replica_sets.into_iter().find(|rs| {
        rs.spec
            .as_ref()
            .and_then(|spec| spec.template.as_ref())
            .is_some_and(|rs_template| equal_ignore_hash(rs_template, template))
    })
}

/// Compare pod templates ignoring the Deployment controller's hash label
pub fn equal_ignore_hash(a: &PodTemplateSpec, b: &PodTemplateSpec) -> bool {
    strip_hash_label(a) == strip_hash_label(b)
}

fn strip_hash_label(template: &PodTemplateSpec) -> PodTemplateSpec {
    let mut copy = template.clone();
    if let Some(metadata) = copy.metadata.as_mut() {
        if let Some(labels) = metadata.labels.as_mut() {
            labels.remove(POD_TEMPLATE_HASH_LABEL);
            if labels.is_empty() {
                metadata.labels = None;
            }
        }
    }
    copy
}

/// ReplicaSet has at least one ready replica
pub fn is_replica_set_ready(replica_set: &ReplicaSet) -> bool {
    let ready = replica_set
        .status
        .as_ref()
        .and_then(|s| s.ready_replicas)
        .unwrap_or(0);
    ready >= EXPECTED_READY_REPLICAS
}

/// StatefulSet rule
///
/// With a rolling-update partition only the pods at or above the partition
/// ordinal are updated, so `replicas - partition` updated replicas are
/// expected while all replicas must be ready.
pub fn is_stateful_set_ready(stateful_set: &StatefulSet) -> bool {
    let spec = stateful_set.spec.as_ref();
    let replicas = spec.and_then(|s| s.replicas).unwrap_or(1);
    let partition = spec
        .and_then(|s| s.update_strategy.as_ref())
        .and_then(|u| u.rolling_update.as_ref())
        .and_then(|r| r.partition)
        .unwrap_or(0);
    let expected_updated = replicas.saturating_sub(partition);

    let status = stateful_set.status.as_ref();
    let updated = status.and_then(|s| s.updated_replicas).unwrap_or(0);
    let ready = status.and_then(|s| s.ready_replicas).unwrap_or(0);

    updated == expected_updated && ready == replicas
}

/// Pod rule: running, every condition true, not terminating
pub fn is_pod_ready(pod: &Pod) -> bool {
    let Some(status) = pod.status.as_ref() else {
        return false;
    };
    if status.phase.as_deref() != Some(POD_RUNNING) {
        return false;
    }
    let all_true = status
        .conditions
        .iter()
        .flatten()
        .all(|c| c.status == CONDITION_TRUE);

    all_true && pod.metadata.deletion_timestamp.is_none()
}

/// DaemonSet rule: every scheduled pod updated and at least one ready
pub fn is_daemon_set_ready(daemon_set: &DaemonSet) -> bool {
    let Some(status) = daemon_set.status.as_ref() else {
        return false;
    };
    let updated = status.updated_number_scheduled.unwrap_or(0);
    updated == status.desired_number_scheduled && status.number_ready >= EXPECTED_READY_DAEMON_SET
}

/// Job rule: every reported condition true (no conditions means ready)
pub fn is_job_ready(job: &Job) -> bool {
    job.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .map(|conditions| conditions.iter().all(|c| c.status == CONDITION_TRUE))
        .unwrap_or(true)
}
