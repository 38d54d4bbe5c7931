//! One reconciliation pass over a managed resource

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::condition::Condition;
use crate::context::CallContext;
use crate::error::ReconcileError;
use crate::lifecycle::ExternalClient;
use crate::managed::{DeletionPolicy, Managed};
use crate::persist::Persister;

/// What a pass did to the external resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// The external resource was created
    Created,
    /// A patch was applied
    Updated,
    /// Nothing to do
    UpToDate,
    /// Deletion was requested; the next pass confirms it is gone
    Deleted,
    /// The external resource is gone or orphaned; the finalizer may be released
    Finalized,
}

/// Sequences observe and at most one mutating verb per pass
pub struct Reconciler<M: Managed> {
    external: Arc<dyn ExternalClient<M>>,
}

impl<M: Managed> Clone for Reconciler<M> {
    fn clone(&self) -> Self {
        Self {
            external: Arc::clone(&self.external),
        }
    }
}

impl<M: Managed> Reconciler<M> {
    pub fn new(external: Arc<dyn ExternalClient<M>>) -> Self {
        Self { external }
    }

    /// Run a single pass and record its result in the `Synced` condition
    ///
    /// Status is written at the end of every pass except [`PassOutcome::Finalized`],
    /// where the object is about to disappear.
    #[instrument(skip_all, fields(external_name = resource.external_name().unwrap_or_default(), deleting = deleting))]
    pub async fn run_pass(
        &self,
        ctx: &CallContext,
        resource: &mut M,
        persister: &dyn Persister<M>,
        deleting: bool,
    ) -> Result<PassOutcome, ReconcileError> {
        let result = self.sequence(ctx, resource, persister, deleting).await;

        if matches!(result, Ok(PassOutcome::Finalized)) {
            return result;
        }

        match &result {
            Ok(outcome) => {
                debug!(?outcome, "Pass complete");
                resource.set_condition(Condition::reconcile_success());
            }
            Err(e) => resource.set_condition(Condition::reconcile_error(e)),
        }

        if let Err(e) = persister.persist_status(resource).await {
            if result.is_ok() {
                return Err(ReconcileError::Store(e));
            }
            warn!(error = %e, "Failed to persist status after failed pass");
        }

        result
    }

    async fn sequence(
        &self,
        ctx: &CallContext,
        resource: &mut M,
        persister: &dyn Persister<M>,
        deleting: bool,
    ) -> Result<PassOutcome, ReconcileError> {
        if deleting && resource.deletion_policy() == DeletionPolicy::Orphan {
            debug!("Orphaning external resource");
            return Ok(PassOutcome::Finalized);
        }

        let observation = self.external.observe(ctx, resource).await?;

        if deleting {
            if observation.resource_exists {
                self.external.delete(ctx, resource).await?;
                return Ok(PassOutcome::Deleted);
            }
            return Ok(PassOutcome::Finalized);
        }

        if !observation.connection_details.is_empty() {
            persister
                .publish_connection_details(resource, &observation.connection_details)
                .await
                .map_err(ReconcileError::Store)?;
        }

        if observation.resource_late_initialized {
            persister
                .persist_spec(resource)
                .await
                .map_err(ReconcileError::Store)?;
        }

        if !observation.resource_exists {
            return self.create(ctx, resource, persister).await;
        }

        if !observation.resource_up_to_date {
            let update = self.external.update(ctx, resource).await?;
            if !update.connection_details.is_empty() {
                persister
                    .publish_connection_details(resource, &update.connection_details)
                    .await
                    .map_err(ReconcileError::Store)?;
            }
            return Ok(PassOutcome::Updated);
        }

        Ok(PassOutcome::UpToDate)
    }

    async fn create(
        &self,
        ctx: &CallContext,
        resource: &mut M,
        persister: &dyn Persister<M>,
    ) -> Result<PassOutcome, ReconcileError> {
        let creation = match self.external.create(ctx, resource, persister).await {
            Ok(creation) => creation,
            Err(e) => {
                if let Some(external_name) = e.assigned_external_name() {
                    if let Err(persist_err) = persister.persist_external_name(resource).await {
                        warn!(external_name, error = %persist_err, "Failed to persist external name after failed create");
                    }
                }
                return Err(e);
            }
        };

        if creation.external_name_assigned {
            persister
                .persist_external_name(resource)
                .await
                .map_err(|source| ReconcileError::Persist {
                    external_name: resource.external_name().unwrap_or_default().to_string(),
                    source,
                })?;
        }

        if !creation.connection_details.is_empty() {
            persister
                .publish_connection_details(resource, &creation.connection_details)
                .await
                .map_err(ReconcileError::Store)?;
        }

        Ok(PassOutcome::Created)
    }
}
