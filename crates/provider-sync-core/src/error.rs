//! Reconciliation error types

use std::error::Error as StdError;
use std::fmt;

use thiserror::Error;

use crate::persist::PersistError;

/// Boxed error for wrapping adapter-specific errors
pub type BoxedError = Box<dyn StdError + Send + Sync>;

/// The lifecycle step that produced a remote failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Describe,
    Create,
    Update,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self {
            Operation::Describe => "describe",
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
        };
        f.write_str(verb)
    }
}

/// Error classification for retry behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Retried by the driver with backoff
    /// Examples: provider unavailable, rate limiting, write conflicts
    Transient,
    /// Will not recover without a change to the resource
    /// Examples: multiple matches for a unique lookup, malformed stored configuration
    Permanent,
}

/// Errors surfaced by the lifecycle engine and the reconciliation pass
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Provider call failed for a reason other than absence
    #[error("failed to {operation} {kind}: {source}")]
    Remote {
        kind: &'static str,
        operation: Operation,
        #[source]
        source: BoxedError,
    },

    /// A lookup by external name returned more than one resource
    #[error("retrieved {count} {kind} resources for external name {external_name}")]
    MultipleMatches {
        kind: &'static str,
        external_name: String,
        count: usize,
    },

    /// Desired and observed state could not be compared
    #[error("cannot compare desired and observed {kind}: {message}")]
    Malformed { kind: &'static str, message: String },

    /// A verb that needs the provider identifier was called without one
    #[error("{kind} has no external name")]
    MissingExternalName { kind: &'static str },

    /// The assigned external name could not be written back
    #[error("cannot persist external name {external_name}: {source}")]
    Persist {
        external_name: String,
        #[source]
        source: PersistError,
    },

    /// Status, spec or connection secret could not be written back
    #[error("cannot persist managed resource: {0}")]
    Store(#[source] PersistError),

    /// Mandatory post-create correction failed after the identifier was stored
    #[error("cannot complete post-create correction of {external_name}: {source}")]
    Correction {
        external_name: String,
        #[source]
        source: Box<ReconcileError>,
    },

    /// The call context was cancelled
    #[error("reconciliation cancelled")]
    Cancelled,

    /// The call context deadline elapsed
    #[error("{operation} timed out")]
    Timeout { operation: Operation },
}

impl ReconcileError {
    pub(crate) fn remote(
        kind: &'static str,
        operation: Operation,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::Remote {
            kind,
            operation,
            source: Box::new(source),
        }
    }

    /// Classify the error for the driver's retry policy
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReconcileError::Remote { .. }
            | ReconcileError::Persist { .. }
            | ReconcileError::Store(_)
            | ReconcileError::Correction { .. }
            | ReconcileError::Cancelled
            | ReconcileError::Timeout { .. } => ErrorKind::Transient,
            ReconcileError::MultipleMatches { .. }
            | ReconcileError::Malformed { .. }
            | ReconcileError::MissingExternalName { .. } => ErrorKind::Permanent,
        }
    }

    /// External name that was assigned before this error occurred
    ///
    /// When present the driver must write the name back even though the
    /// create step failed, otherwise the remote resource is orphaned.
    pub fn assigned_external_name(&self) -> Option<&str> {
        match self {
            ReconcileError::Persist { external_name, .. }
            | ReconcileError::Correction { external_name, .. } => Some(external_name),
            _ => None,
        }
    }
}
