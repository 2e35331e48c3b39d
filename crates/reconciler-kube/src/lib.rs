//! Cluster API side of the reconciler
//!
//! Everything here reads live cluster state and never writes it:
//!
//! - [`readiness`] - kind-specific readiness rules for just-applied resources
//! - [`strategy`] - skip / patch / replace decision before an apply
//! - [`progress`] - waits for a batch of resources to become ready or go away
//! - [`client`] - the read-only client trait and its kube-rs implementation

#![deny(missing_docs)]

pub mod client;
pub mod progress;
pub mod readiness;
pub mod resource;
pub mod strategy;

pub use client::{ClusterReader, KubeReader};
pub use progress::{ProgressConfig, ProgressTracker, TargetState};
pub use readiness::{ReadinessProbe, ReadinessRule};
pub use resource::ResourceRef;
pub use strategy::{StrategyRule, UpdateStrategy, UpdateStrategyResolver};
