//! Reconciler - drives clusters towards their desired component configuration
//!
//! The engine is split across the workspace crates:
//!
//! - `reconciler-scheduler` - cluster status transitions around a reconciliation
//!   run and the retention cleaner
//! - `reconciler-kube` - readiness probe, update strategy resolver and progress
//!   tracking against the cluster API
//! - `reconciler-common` - errors, polling, telemetry and kube helpers
//!
//! This crate holds the pieces the `reconciler` binary wires together:
//!
//! - [`compat`] - component version compatibility for in-place upgrades
//! - [`config`] - scheduler configuration file

#![deny(missing_docs)]

pub mod compat;
pub mod config;

pub use reconciler_common::{Error, Result};

/// Default time between progress polls of the `probe --wait` command
pub const DEFAULT_PROGRESS_INTERVAL: std::time::Duration = std::time::Duration::from_secs(5);

/// Default time the `probe --wait` command waits for readiness
pub const DEFAULT_PROGRESS_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(300);
