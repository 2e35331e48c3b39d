//! Common types for the reconciler: errors, polling, telemetry and kube helpers

#![deny(missing_docs)]

pub mod error;
pub mod kube_utils;
pub mod poll;
pub mod telemetry;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Label set by the Deployment controller on the ReplicaSets and pods it owns
pub const POD_TEMPLATE_HASH_LABEL: &str = "pod-template-hash";
