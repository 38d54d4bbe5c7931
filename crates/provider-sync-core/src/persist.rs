//! Write-back of managed resource state

use async_trait::async_trait;
use thiserror::Error;

use crate::error::BoxedError;
use crate::managed::{ConnectionDetails, Managed};

/// Failure writing a managed resource back to its store
#[derive(Debug, Error)]
pub enum PersistError {
    /// Optimistic concurrency check failed; a re-read and retry may succeed
    #[error("conflict: {0}")]
    Conflict(#[source] BoxedError),

    #[error("{0}")]
    Failed(#[source] BoxedError),
}

impl PersistError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, PersistError::Conflict(_))
    }
}

/// Storage the driver writes managed resources to
#[async_trait]
pub trait Persister<M: Managed>: Send + Sync {
    /// Store the external name annotation; may fail with [`PersistError::Conflict`]
    async fn persist_external_name(&self, resource: &M) -> Result<(), PersistError>;

    /// Store late-initialized desired parameters
    async fn persist_spec(&self, resource: &M) -> Result<(), PersistError>;

    /// Store observation and conditions
    async fn persist_status(&self, resource: &M) -> Result<(), PersistError>;

    /// Publish one-time connection details to the resource's secret
    async fn publish_connection_details(
        &self,
        resource: &M,
        details: &ConnectionDetails,
    ) -> Result<(), PersistError>;
}
