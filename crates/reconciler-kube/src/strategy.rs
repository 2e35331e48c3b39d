//! Update strategy resolution
//!
//! Before a resource is applied, the resolver looks at the live object and
//! decides whether to leave it alone, patch it in place, or replace it.

use std::fmt;
use std::sync::Arc;

use kube::api::DynamicObject;
use tracing::debug;

use reconciler_common::Result;

use crate::client::ClusterReader;
use crate::resource::ResourceRef;

/// How a desired resource is applied to the cluster
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateStrategy {
    /// Leave the live object untouched
    Skip,
    /// Patch the live object in place (creates it when missing)
    Patch,
    /// Replace the live object with the desired manifest
    Replace,
}

impl fmt::Display for UpdateStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Skip => write!(f, "Skip"),
            Self::Patch => write!(f, "Patch"),
            Self::Replace => write!(f, "Replace"),
        }
    }
}

/// Strategy rule selected by resource kind
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StrategyRule {
    /// Run-to-completion objects with an immutable spec (Pod, Job)
    RunToCompletion,
    /// Objects that are safe to reconcile in place (PVC, ServiceAccount)
    InPlace,
    /// StatefulSets: bound storage must never be replaced
    StatefulSet,
    /// Everything else is fully replaced
    Default,
}

impl StrategyRule {
    /// Look up the rule for a resource kind
    pub fn for_kind(kind: &str) -> Self {
        match kind {
            "Pod" | "Job" => Self::RunToCompletion,
            "PersistentVolumeClaim" | "ServiceAccount" => Self::InPlace,
            "StatefulSet" => Self::StatefulSet,
            _ => Self::Default,
        }
    }

    /// Decide the strategy given the live object, if any
    pub fn strategy(self, live: Option<&DynamicObject>) -> UpdateStrategy {
        let Some(live) = live else {
            return UpdateStrategy::Patch;
        };
        match self {
            Self::RunToCompletion => UpdateStrategy::Skip,
            Self::InPlace => UpdateStrategy::Patch,
            Self::StatefulSet if has_volume_claim_templates(live) => UpdateStrategy::Patch,
            Self::StatefulSet | Self::Default => UpdateStrategy::Replace,
        }
    }
}

/// Resolves the update strategy for desired resources
#[derive(Clone)]
pub struct UpdateStrategyResolver {
    client: Arc<dyn ClusterReader>,
}

impl UpdateStrategyResolver {
    /// Create a resolver reading through the given client
    pub fn new(client: Arc<dyn ClusterReader>) -> Self {
        Self { client }
    }

    /// Resolve the strategy for a desired resource
    pub async fn resolve(&self, resource: &ResourceRef) -> Result<UpdateStrategy> {
        let live = self.client.get_object(resource).await?;
        let strategy = StrategyRule::for_kind(&resource.kind).strategy(live.as_ref());
        debug!(resource = %resource, exists = live.is_some(), %strategy, "update strategy resolved");
        Ok(strategy)
    }
}

fn has_volume_claim_templates(object: &DynamicObject) -> bool {
    object
        .data
        .pointer("/spec/volumeClaimTemplates")
        .and_then(|v| v.as_array())
        .is_some_and(|templates| !templates.is_empty())
}
