//! The four-phase external resource lifecycle
//!
//! [`Lifecycle`] binds an [`Adapter`] (how to talk to the provider) to a
//! [`Differ`] (how to compare desired and observed state) and exposes the
//! result as an [`ExternalClient`] the reconciler drives.

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::adapter::Adapter;
use crate::condition::Condition;
use crate::context::CallContext;
use crate::diff::{DiffErrorPolicy, Differ};
use crate::error::{Operation, ReconcileError};
use crate::managed::{ConnectionDetails, Managed};
use crate::persist::{PersistError, Persister};
use crate::retry::{retry_with_backoff, RetryConfig};

/// Outcome of an observe call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExternalObservation {
    pub resource_exists: bool,
    pub resource_up_to_date: bool,
    /// Desired parameters were filled in from the observed resource
    pub resource_late_initialized: bool,
    /// Details derivable from the observed resource, such as an endpoint
    pub connection_details: ConnectionDetails,
}

impl ExternalObservation {
    /// The external resource does not exist (yet)
    pub fn absent() -> Self {
        Self::default()
    }
}

/// Outcome of a create call
#[derive(Debug, Clone, Default)]
pub struct ExternalCreation {
    /// The resource's external name was set and must be persisted
    pub external_name_assigned: bool,
    pub connection_details: ConnectionDetails,
}

/// Outcome of an update call
#[derive(Debug, Clone, Default)]
pub struct ExternalUpdate {
    pub connection_details: ConnectionDetails,
}

/// Lifecycle verbs invoked by the reconciler
#[async_trait]
pub trait ExternalClient<M: Managed>: Send + Sync {
    /// Fetch the external resource and record what was found on `resource`
    async fn observe(
        &self,
        ctx: &CallContext,
        resource: &mut M,
    ) -> Result<ExternalObservation, ReconcileError>;

    /// Create the external resource and assign its external name
    async fn create(
        &self,
        ctx: &CallContext,
        resource: &mut M,
        persister: &dyn Persister<M>,
    ) -> Result<ExternalCreation, ReconcileError>;

    /// Converge the external resource towards the desired parameters
    async fn update(&self, ctx: &CallContext, resource: &M)
        -> Result<ExternalUpdate, ReconcileError>;

    /// Delete the external resource; absence counts as success
    async fn delete(&self, ctx: &CallContext, resource: &mut M) -> Result<(), ReconcileError>;
}

/// Generic [`ExternalClient`] built from an adapter and a diff strategy
pub struct Lifecycle<A, D> {
    adapter: A,
    differ: D,
    retry: RetryConfig,
}

impl<A, D> Lifecycle<A, D>
where
    A: Adapter,
    D: Differ<Parameters = A::Parameters, State = A::State, Change = A::Change>,
{
    pub fn new(adapter: A, differ: D) -> Self {
        Self {
            adapter,
            differ,
            retry: RetryConfig::default(),
        }
    }

    /// Retry policy for persisting a freshly assigned external name
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Describe by external name, mapping not-found and zero matches to `None`
    async fn describe_one(
        &self,
        ctx: &CallContext,
        external_name: &str,
        params: &A::Parameters,
    ) -> Result<Option<A::State>, ReconcileError> {
        let mut matches = match ctx
            .run(
                Operation::Describe,
                self.adapter.describe(ctx, external_name, params),
            )
            .await?
        {
            Ok(matches) => matches,
            Err(e) if self.adapter.is_not_found(&e) => return Ok(None),
            Err(e) => return Err(ReconcileError::remote(A::KIND, Operation::Describe, e)),
        };

        if matches.len() > 1 {
            return Err(ReconcileError::MultipleMatches {
                kind: A::KIND,
                external_name: external_name.to_string(),
                count: matches.len(),
            });
        }
        Ok(matches.pop())
    }

    /// Apply one patch fragment, swallowing races the adapter tolerates
    async fn apply(
        &self,
        ctx: &CallContext,
        external_name: &str,
        params: &A::Parameters,
        change: &A::Change,
    ) -> Result<(), ReconcileError> {
        let result = ctx
            .run(
                Operation::Update,
                self.adapter.apply_change(ctx, external_name, params, change),
            )
            .await?;

        match result {
            Ok(()) => Ok(()),
            Err(e) if self.adapter.is_tolerable(change, &e) => {
                debug!(kind = A::KIND, external_name, ?change, error = %e, "Ignoring tolerable error");
                Ok(())
            }
            Err(e) => Err(ReconcileError::remote(A::KIND, Operation::Update, e)),
        }
    }
}

fn assigned_name<M: Managed>(resource: &M) -> Option<&str> {
    resource.external_name().filter(|name| !name.is_empty())
}

#[async_trait]
impl<M, A, D> ExternalClient<M> for Lifecycle<A, D>
where
    M: Managed,
    A: Adapter<Parameters = M::Parameters>,
    D: Differ<
        Parameters = M::Parameters,
        State = A::State,
        Observation = M::Observation,
        Change = A::Change,
    >,
{
    async fn observe(
        &self,
        ctx: &CallContext,
        resource: &mut M,
    ) -> Result<ExternalObservation, ReconcileError> {
        let Some(external_name) = assigned_name(resource).map(str::to_owned) else {
            return Ok(ExternalObservation::absent());
        };

        let current = resource.parameters().clone();
        let Some(observed) = self.describe_one(ctx, &external_name, &current).await? else {
            debug!(kind = A::KIND, %external_name, "External resource not found");
            return Ok(ExternalObservation::absent());
        };

        self.differ
            .late_initialize(resource.parameters_mut(), &observed);
        let late_initialized = *resource.parameters() != current;

        resource.set_observation(self.differ.observation(&observed));

        let up_to_date = match self.differ.is_up_to_date(resource.parameters(), &observed) {
            Ok(up_to_date) => up_to_date,
            Err(e) => match D::ERROR_POLICY {
                DiffErrorPolicy::Propagate => {
                    return Err(ReconcileError::Malformed {
                        kind: A::KIND,
                        message: e.to_string(),
                    })
                }
                DiffErrorPolicy::NotConverged => {
                    warn!(kind = A::KIND, %external_name, error = %e, "Cannot compare desired and observed state, assuming not up to date");
                    false
                }
            },
        };

        if let Some(condition) = self.differ.readiness(&observed, up_to_date) {
            resource.set_condition(condition);
        }

        Ok(ExternalObservation {
            resource_exists: true,
            resource_up_to_date: up_to_date,
            resource_late_initialized: late_initialized,
            connection_details: self.differ.connection_details(&observed),
        })
    }

    async fn create(
        &self,
        ctx: &CallContext,
        resource: &mut M,
        persister: &dyn Persister<M>,
    ) -> Result<ExternalCreation, ReconcileError> {
        resource.set_condition(Condition::creating());
        persister
            .persist_status(resource)
            .await
            .map_err(ReconcileError::Store)?;

        let params = resource.parameters().clone();
        let created = ctx
            .run(Operation::Create, self.adapter.create(ctx, &params))
            .await?
            .map_err(|e| ReconcileError::remote(A::KIND, Operation::Create, e))?;

        let external_name = created.external_name;
        resource.set_external_name(&external_name);
        info!(kind = A::KIND, %external_name, "Created external resource");

        let corrections = self.differ.corrections(&params);
        if !corrections.is_empty() {
            let snapshot: &M = resource;
            retry_with_backoff(
                ctx,
                &self.retry,
                "persist_external_name",
                |e: &PersistError| e.is_conflict(),
                move || persister.persist_external_name(snapshot),
            )
            .await
            .map_err(|source| ReconcileError::Persist {
                external_name: external_name.clone(),
                source,
            })?;

            for change in &corrections {
                self.apply(ctx, &external_name, &params, change)
                    .await
                    .map_err(|source| ReconcileError::Correction {
                        external_name: external_name.clone(),
                        source: Box::new(source),
                    })?;
            }
        }

        Ok(ExternalCreation {
            external_name_assigned: true,
            connection_details: created.connection_details,
        })
    }

    async fn update(
        &self,
        ctx: &CallContext,
        resource: &M,
    ) -> Result<ExternalUpdate, ReconcileError> {
        let external_name =
            assigned_name(resource).ok_or(ReconcileError::MissingExternalName { kind: A::KIND })?;
        let params = resource.parameters();

        let Some(observed) = self.describe_one(ctx, external_name, params).await? else {
            debug!(kind = A::KIND, external_name, "External resource vanished before update");
            return Ok(ExternalUpdate::default());
        };

        let patch = self.differ.patch(&observed, params);
        if patch.is_empty() {
            debug!(kind = A::KIND, external_name, "Nothing to update");
            return Ok(ExternalUpdate::default());
        }

        debug!(kind = A::KIND, external_name, changes = patch.len(), "Applying patch");
        for change in patch.iter() {
            self.apply(ctx, external_name, params, change).await?;
        }

        Ok(ExternalUpdate::default())
    }

    async fn delete(&self, ctx: &CallContext, resource: &mut M) -> Result<(), ReconcileError> {
        resource.set_condition(Condition::deleting());

        let Some(external_name) = assigned_name(resource) else {
            return Ok(());
        };
        let params = resource.parameters();

        match ctx
            .run(
                Operation::Delete,
                self.adapter.delete(ctx, external_name, params),
            )
            .await?
        {
            Ok(()) => {
                info!(kind = A::KIND, external_name, "Deleted external resource");
                Ok(())
            }
            Err(e) if self.adapter.is_not_found(&e) => Ok(()),
            Err(e) => Err(ReconcileError::remote(A::KIND, Operation::Delete, e)),
        }
    }
}
