//! Error types for the reconciler
//!
//! Errors are structured with fields to aid debugging in production.
//! Each variant carries the identifiers needed to correlate a failure with
//! the cluster (runtime ID) or reconciliation run (scheduling ID) it belongs to.

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for reconciler operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// A resource or record does not exist
    #[error("{kind} '{name}' not found")]
    NotFound {
        /// Kind of the missing object (e.g. "Deployment", "reconciliation")
        kind: String,
        /// Identifier of the missing object
        name: String,
    },

    /// A non-finished reconciliation already exists for the runtime
    #[error(
        "cannot start reconciliation for cluster '{runtime_id}': cluster is already enqueued with schedulingID '{scheduling_id}'"
    )]
    AlreadyEnqueued {
        /// Runtime that is already being reconciled
        runtime_id: String,
        /// Scheduling ID of the run in flight
        scheduling_id: String,
    },

    /// The store rejected a second non-finished reconciliation for the runtime
    #[error("duplicate reconciliation for cluster '{runtime_id}': a non-finished reconciliation already exists")]
    DuplicateReconciliation {
        /// Runtime that already owns a non-finished reconciliation
        runtime_id: String,
    },

    /// A reconciliation was requested without any components
    #[error("cannot reconcile cluster '{runtime_id}': no components configured")]
    EmptyComponents {
        /// Runtime with the empty component set
        runtime_id: String,
    },

    /// The cluster status permits neither reconciliation nor deletion
    #[error("cannot start reconciliation of cluster '{runtime_id}' because cluster is in state '{status}'")]
    NotEligible {
        /// Runtime that was rejected
        runtime_id: String,
        /// Status the cluster was found in
        status: String,
    },

    /// The reconciliation was already marked as finished
    #[error("failed to finish reconciliation '{scheduling_id}': it is already finished")]
    AlreadyFinished {
        /// Scheduling ID of the finished run
        scheduling_id: String,
    },

    /// Invalid configuration or input
    #[error("validation error: {message}")]
    Validation {
        /// Description of what's invalid
        message: String,
        /// The invalid field (e.g., "cleaner.cleanerInterval")
        field: Option<String>,
    },

    /// Persistence layer error
    #[error("store error [{context}]: {message}")]
    Store {
        /// Operation that failed (e.g., "create_reconciliation")
        context: String,
        /// Description of what failed
        message: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// The resource kind being processed (if known)
        kind: Option<String>,
    },

    /// An operation did not complete within its deadline
    #[error("timeout [{context}]: {message}")]
    Timeout {
        /// Operation that timed out
        context: String,
        /// Description of what was still pending
        message: String,
    },

    /// An operation failed and so did the compensating action that followed it
    #[error("{original} (compensation failed: {revert})")]
    Compensation {
        /// The error that triggered the compensation
        #[source]
        original: Box<Error>,
        /// The error raised by the compensating action
        revert: Box<Error>,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Context where the error occurred
        context: String,
        /// Description of what failed
        message: String,
    },
}

impl Error {
    /// Create a not-found error for the given object kind and identifier
    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
            field: None,
        }
    }

    /// Create a validation error pointing at a specific field
    pub fn validation_for_field(field: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Create a store error with operation context
    pub fn store(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Store {
            context: context.into(),
            message: msg.into(),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: None,
        }
    }

    /// Create a serialization error with resource kind context
    pub fn serialization_for_kind(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: Some(kind.into()),
        }
    }

    /// Create a timeout error with operation context
    pub fn timeout(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Timeout {
            context: context.into(),
            message: msg.into(),
        }
    }

    /// Create an internal error with the given message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal {
            context: UNKNOWN_CONTEXT.to_string(),
            message: msg.into(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            context: context.into(),
            message: msg.into(),
        }
    }

    /// Wrap this error with the failure of the compensating action it triggered
    ///
    /// The original error stays the primary cause; the revert failure is
    /// attached for diagnostics.
    pub fn with_revert_failure(self, revert: Error) -> Self {
        Self::Compensation {
            original: Box::new(self),
            revert: Box::new(revert),
        }
    }

    /// The error that started the failure chain
    ///
    /// Unwraps compensation wrappers so callers can classify the original cause.
    pub fn root(&self) -> &Error {
        match self {
            Error::Compensation { original, .. } => original.root(),
            other => other,
        }
    }

    /// Check if this error means an object does not exist
    pub fn is_not_found(&self) -> bool {
        match self.root() {
            Error::NotFound { .. } => true,
            Error::Kube {
                source: kube::Error::Api(ae),
            } => ae.code == 404,
            _ => false,
        }
    }

    /// Check if this error means another run already owns the runtime
    pub fn is_conflict(&self) -> bool {
        matches!(
            self.root(),
            Error::AlreadyEnqueued { .. } | Error::DuplicateReconciliation { .. }
        )
    }

    /// Check if this error is caused by an empty component set
    pub fn is_empty_components(&self) -> bool {
        matches!(self.root(), Error::EmptyComponents { .. })
    }

    /// Check if this error is retryable
    ///
    /// Configuration and idempotence errors are not retryable (they require a
    /// config fix or are already settled). Conflicts are retryable once the
    /// run in flight finishes.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => !matches!(
                source,
                kube::Error::Api(ae) if (400..500).contains(&ae.code)
            ),
            Error::NotFound { .. } => false,
            Error::AlreadyEnqueued { .. } | Error::DuplicateReconciliation { .. } => true,
            Error::EmptyComponents { .. } => false,
            Error::NotEligible { .. } => false,
            Error::AlreadyFinished { .. } => false,
            Error::Validation { .. } => false,
            Error::Store { .. } => true,
            Error::Serialization { .. } => false,
            Error::Timeout { .. } => true,
            Error::Compensation { original, .. } => original.is_retryable(),
            Error::Internal { .. } => true,
        }
    }

    /// Get the runtime ID if this error is associated with a specific cluster
    pub fn runtime_id(&self) -> Option<&str> {
        match self {
            Error::AlreadyEnqueued { runtime_id, .. }
            | Error::DuplicateReconciliation { runtime_id }
            | Error::EmptyComponents { runtime_id }
            | Error::NotEligible { runtime_id, .. } => Some(runtime_id),
            Error::Compensation { original, .. } => original.runtime_id(),
            _ => None,
        }
    }
}
