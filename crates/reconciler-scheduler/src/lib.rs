//! Reconciliation lifecycle of clusters
//!
//! - [`transition`] - moves a cluster in and out of a reconciliation run
//! - [`cleaner`] - removes reconciliation records past their retention
//! - [`memory`] - in-memory store implementing the collaborator contracts
//!
//! The collaborator contracts are [`Inventory`], [`ReconciliationRepository`]
//! and the transactional [`Connection`].

#![deny(missing_docs)]

pub mod cleaner;
pub mod db;
pub mod inventory;
pub mod memory;
pub mod model;
pub mod repository;
pub mod transition;

pub use cleaner::{Cleaner, CleanerConfig, PurgeSummary};
pub use db::{transaction, Connection, Transaction};
pub use inventory::Inventory;
pub use memory::MemoryStore;
pub use model::{ClusterState, ClusterStatus, ReconciliationEntity, StatusEntry};
pub use repository::{ReconciliationFilter, ReconciliationRepository};
pub use transition::ClusterStatusTransition;
