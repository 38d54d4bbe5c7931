//! Kubernetes controllers for managed resources
//!
//! Every kind is driven by the same loop: ensure the finalizer, run one
//! [`Reconciler`] pass against the provider, persist what changed, and drop
//! the finalizer once the external resource is gone.

pub mod accesskey;
pub mod domain;
pub mod retry;
pub mod securitygroup;
pub mod stack;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::runtime::controller::Action;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Client, Resource, ResourceExt};
use provider_sync_core::{
    CallContext, ConnectionDetails, ErrorKind, PassOutcome, PersistError, Persister,
    ReconcileError, Reconciler,
};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::{ProviderConfigSpec, FINALIZER};
use crate::crd::{self, ManagedResource};

use retry::{compute_backoff, RetryTracker};

/// Field manager for server-side applied connection secrets
const FIELD_MANAGER: &str = "provider-sync-operator";

/// Requeue delay after a pass that changed the external resource
const SETTLE_DELAY: Duration = Duration::from_secs(5);

/// Shared state for all controllers
pub struct ControllerContext {
    /// Operator configuration
    pub config: Arc<ProviderConfigSpec>,
    /// Kubernetes API client (shared across controllers)
    pub kube_client: Client,
    /// Retry tracker for exponential backoff
    pub retry_tracker: Arc<RetryTracker>,
    /// Cancelled on shutdown; aborts in-flight provider calls
    pub shutdown: CancellationToken,
}

impl ControllerContext {
    /// Call context for one reconciliation pass
    fn call_context(&self) -> CallContext {
        CallContext::with_cancellation(self.shutdown.child_token())
            .timeout(self.config.request_timeout())
    }
}

/// Per-kind controller state
pub struct ManagedContext<K: ManagedResource> {
    pub shared: Arc<ControllerContext>,
    pub reconciler: Reconciler<K>,
}

#[derive(Debug, Error)]
pub enum ManagedError {
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
    #[error("Missing required field: {0}")]
    MissingField(String),
}

fn classify_error(error: &ManagedError) -> ErrorKind {
    match error {
        ManagedError::Reconcile(e) => e.kind(),
        ManagedError::Kube(_) => ErrorKind::Transient,
        ManagedError::MissingField(_) => ErrorKind::Permanent,
    }
}

fn persist_error(error: kube::Error) -> PersistError {
    match &error {
        kube::Error::Api(response) if response.code == 409 => {
            PersistError::Conflict(Box::new(error))
        }
        _ => PersistError::Failed(Box::new(error)),
    }
}

/// Writes managed resources back to the Kubernetes API
pub struct KubePersister<K> {
    api: Api<K>,
    client: Client,
    name: String,
}

impl<K: ManagedResource> KubePersister<K> {
    pub fn new(client: Client, name: &str) -> Self {
        Self {
            api: Api::all(client.clone()),
            client,
            name: name.to_string(),
        }
    }
}

#[async_trait]
impl<K: ManagedResource> Persister<K> for KubePersister<K> {
    /// Read-modify-write against the latest revision, so a concurrent
    /// writer surfaces as a conflict instead of being overwritten
    async fn persist_external_name(&self, resource: &K) -> Result<(), PersistError> {
        let Some(external_name) = resource.external_name() else {
            return Ok(());
        };

        let mut latest = self.api.get(&self.name).await.map_err(persist_error)?;
        if crd::external_name(latest.meta()) == Some(external_name) {
            return Ok(());
        }
        crd::set_external_name(latest.meta_mut(), external_name);
        self.api
            .replace(&self.name, &PostParams::default(), &latest)
            .await
            .map_err(persist_error)?;

        debug!(name = %self.name, external_name, "Persisted external name");
        Ok(())
    }

    async fn persist_spec(&self, resource: &K) -> Result<(), PersistError> {
        let patch = serde_json::json!({ "spec": resource.spec_value() });
        self.api
            .patch(&self.name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(persist_error)?;
        Ok(())
    }

    async fn persist_status(&self, resource: &K) -> Result<(), PersistError> {
        let patch = serde_json::json!({ "status": resource.status_value() });
        self.api
            .patch_status(&self.name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(persist_error)?;
        Ok(())
    }

    async fn publish_connection_details(
        &self,
        resource: &K,
        details: &ConnectionDetails,
    ) -> Result<(), PersistError> {
        let Some(target) = resource.connection_secret() else {
            debug!(name = %self.name, "No connection secret requested");
            return Ok(());
        };

        let secret = Secret {
            metadata: ObjectMeta {
                name: Some(target.name.clone()),
                namespace: Some(target.namespace.clone()),
                owner_references: resource.controller_owner_ref(&()).map(|r| vec![r]),
                ..Default::default()
            },
            data: Some(
                details
                    .iter()
                    .map(|(k, v)| (k.clone(), ByteString(v.clone())))
                    .collect(),
            ),
            ..Default::default()
        };

        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), &target.namespace);
        secrets
            .patch(
                &target.name,
                &PatchParams::apply(FIELD_MANAGER).force(),
                &Patch::Apply(&secret),
            )
            .await
            .map_err(persist_error)?;

        info!(
            name = %self.name,
            secret = %target.name,
            namespace = %target.namespace,
            keys = details.len(),
            "Published connection details"
        );
        Ok(())
    }
}

fn has_finalizer<K: Resource>(resource: &K) -> bool {
    resource.finalizers().iter().any(|f| f == FINALIZER)
}

async fn set_finalizers<K: ManagedResource>(
    api: &Api<K>,
    name: &str,
    finalizers: Vec<String>,
) -> Result<(), ManagedError> {
    let patch = serde_json::json!({
        "metadata": { "finalizers": finalizers }
    });
    api.patch(name, &PatchParams::default(), &Patch::Merge(&patch))
        .await?;
    Ok(())
}

/// Reconcile a single managed resource
#[instrument(
    skip(resource, ctx),
    fields(kind = %K::kind(&()), name = %resource.name_any())
)]
async fn reconcile<K: ManagedResource>(
    resource: Arc<K>,
    ctx: Arc<ManagedContext<K>>,
) -> Result<Action, ManagedError> {
    let name = resource
        .meta()
        .name
        .clone()
        .ok_or_else(|| ManagedError::MissingField("metadata.name".to_string()))?;
    let api: Api<K> = Api::all(ctx.shared.kube_client.clone());
    let deleting = resource.meta().deletion_timestamp.is_some();

    if !has_finalizer(resource.as_ref()) {
        if deleting {
            debug!("Deleted without finalizer, nothing to do");
            forget_retries(resource.as_ref(), &ctx);
            return Ok(Action::await_change());
        }
        let mut finalizers = resource.finalizers().to_vec();
        finalizers.push(FINALIZER.to_string());
        set_finalizers(&api, &name, finalizers).await?;
        debug!("Added finalizer");
    }

    let mut working = (*resource).clone();
    let persister = KubePersister::new(ctx.shared.kube_client.clone(), &name);
    let outcome = ctx
        .reconciler
        .run_pass(&ctx.shared.call_context(), &mut working, &persister, deleting)
        .await?;

    forget_retries(resource.as_ref(), &ctx);

    let action = match outcome {
        PassOutcome::Finalized => {
            let finalizers = resource
                .finalizers()
                .iter()
                .filter(|f| *f != FINALIZER)
                .cloned()
                .collect();
            set_finalizers(&api, &name, finalizers).await?;
            info!("Removed finalizer");
            Action::await_change()
        }
        PassOutcome::Created | PassOutcome::Updated | PassOutcome::Deleted => {
            Action::requeue(SETTLE_DELAY)
        }
        PassOutcome::UpToDate => Action::requeue(ctx.shared.config.poll_interval()),
    };

    debug!(?outcome, "Reconciliation pass complete");
    Ok(action)
}

fn forget_retries<K: ManagedResource>(resource: &K, ctx: &ManagedContext<K>) {
    if let Some(uid) = resource.meta().uid.as_deref() {
        ctx.shared.retry_tracker.reset(uid);
    }
}

fn error_policy<K: ManagedResource>(
    resource: Arc<K>,
    error: &ManagedError,
    ctx: Arc<ManagedContext<K>>,
) -> Action {
    // A released object will not be reconciled again; keep no count for it
    if resource.meta().deletion_timestamp.is_some() && !has_finalizer(resource.as_ref()) {
        warn!(
            kind = %K::kind(&()),
            name = %resource.name_any(),
            error = %error,
            "Reconciliation failed after finalizer was released"
        );
        forget_retries(resource.as_ref(), &ctx);
        return Action::await_change();
    }

    let uid = resource.meta().uid.as_deref().unwrap_or("unknown");
    let error_kind = classify_error(error);
    let attempt = ctx.shared.retry_tracker.increment(uid);

    warn!(
        kind = %K::kind(&()),
        name = %resource.name_any(),
        error = %error,
        attempt = attempt,
        error_kind = ?error_kind,
        "Reconciliation failed"
    );

    compute_backoff(attempt, error_kind)
}

/// Run the controller for one managed kind until shutdown
pub async fn run_managed<K: ManagedResource>(
    shared: Arc<ControllerContext>,
    reconciler: Reconciler<K>,
) {
    let resources: Api<K> = Api::all(shared.kube_client.clone());
    let kind = K::kind(&()).to_string();
    let shutdown = shared.shutdown.clone();
    let ctx = Arc::new(ManagedContext { shared, reconciler });

    info!(%kind, "Starting controller");

    Controller::new(resources, WatcherConfig::default())
        .graceful_shutdown_on(async move { shutdown.cancelled().await })
        .run(reconcile::<K>, error_policy::<K>, ctx)
        .for_each(|result| {
            let kind = kind.clone();
            async move {
                match result {
                    Ok((obj, _action)) => {
                        debug!(%kind, name = %obj.name, "Reconciled successfully");
                    }
                    Err(e) => {
                        warn!(%kind, error = %e, "Controller error");
                    }
                }
            }
        })
        .await;
}

/// Resolve the region of a request
pub(crate) fn region<'a>(requested: Option<&'a str>, default: &'a str) -> &'a str {
    requested.filter(|r| !r.is_empty()).unwrap_or(default)
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Fakes shared by the controller tests

    use std::sync::Mutex;

    use super::*;

    /// Kubernetes API stand-in that records requests and echoes a fixed object
    #[derive(Clone)]
    pub struct MockKubeService {
        pub body: serde_json::Value,
        pub status: u16,
        pub requests: Arc<Mutex<Vec<(String, String)>>>,
    }

    impl MockKubeService {
        pub fn new(body: serde_json::Value) -> Self {
            Self {
                body,
                status: 200,
                requests: Arc::new(Mutex::new(Vec::new())),
            }
        }

        pub fn with_status(mut self, status: u16) -> Self {
            self.status = status;
            self
        }

        /// `METHOD path` of every request received so far
        pub fn requests(&self) -> Vec<String> {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .map(|(method, path)| format!("{method} {path}"))
                .collect()
        }
    }

    impl tower::Service<http::Request<kube::client::Body>> for MockKubeService {
        type Response = http::Response<kube::client::Body>;
        type Error = std::convert::Infallible;
        type Future = std::pin::Pin<
            Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
        >;

        fn poll_ready(
            &mut self,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<Result<(), Self::Error>> {
            std::task::Poll::Ready(Ok(()))
        }

        fn call(&mut self, req: http::Request<kube::client::Body>) -> Self::Future {
            self.requests
                .lock()
                .unwrap()
                .push((req.method().to_string(), req.uri().path().to_string()));

            let status = self.status;
            let body = if status < 400 {
                self.body.clone()
            } else {
                serde_json::json!({
                    "apiVersion": "v1",
                    "kind": "Status",
                    "status": "Failure",
                    "message": "the object has been modified",
                    "reason": "Conflict",
                    "code": status
                })
            };
            Box::pin(async move {
                let body_bytes = serde_json::to_vec(&body).unwrap();
                let response = http::Response::builder()
                    .status(status)
                    .header("content-type", "application/json")
                    .body(kube::client::Body::from(body_bytes))
                    .unwrap();
                Ok(response)
            })
        }
    }

    /// In-memory persister recording every write
    #[derive(Default)]
    pub struct RecordingPersister {
        calls: Mutex<Vec<String>>,
    }

    impl RecordingPersister {
        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl<M: provider_sync_core::Managed> Persister<M> for RecordingPersister {
        async fn persist_external_name(&self, resource: &M) -> Result<(), PersistError> {
            self.record(format!(
                "external_name {}",
                resource.external_name().unwrap_or_default()
            ));
            Ok(())
        }

        async fn persist_spec(&self, _resource: &M) -> Result<(), PersistError> {
            self.record("spec".to_string());
            Ok(())
        }

        async fn persist_status(&self, _resource: &M) -> Result<(), PersistError> {
            self.record("status".to_string());
            Ok(())
        }

        async fn publish_connection_details(
            &self,
            _resource: &M,
            details: &ConnectionDetails,
        ) -> Result<(), PersistError> {
            let keys: Vec<&str> = details.keys().map(String::as_str).collect();
            self.record(format!("secret {}", keys.join(",")));
            Ok(())
        }
    }

    pub fn test_config() -> ProviderConfigSpec {
        serde_yaml::from_str("endpoint: http://gateway:8080\nregion: us-west-2").unwrap()
    }

    pub fn shared_context(service: MockKubeService) -> Arc<ControllerContext> {
        Arc::new(ControllerContext {
            config: Arc::new(test_config()),
            kube_client: Client::new(service, "default"),
            retry_tracker: retry::new_tracker(),
            shutdown: CancellationToken::new(),
        })
    }
}
