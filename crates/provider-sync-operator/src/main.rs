use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use k8s_openapi::api::core::v1::Secret;
use kube::api::ListParams;
use kube::{Api, Client};
use tokio::select;
use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinError;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use provider_sync_operator::client::ProviderClient;
use provider_sync_operator::config::{ProviderConfig, ProviderConfigSpec, SecretKeySelector};
use provider_sync_operator::controllers::{self, retry::RetryTracker, ControllerContext};
use provider_sync_operator::health::{run_health_server, HealthState, DEFAULT_HEALTH_PORT};

const SHUTDOWN_GRACE_SECS: u64 = 10;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
                .with_current_span(false),
        )
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    info!("provider-sync-operator starting");

    let kube_client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    info!("Connected to Kubernetes cluster");

    let config = load_config(&kube_client)
        .await
        .context("Failed to load ProviderConfig")?;

    info!(
        endpoint = %config.endpoint,
        region = %config.region,
        poll_interval_secs = config.poll_interval().as_secs(),
        "Loaded configuration"
    );

    let api_token = match &config.credentials_secret_ref {
        Some(selector) => Some(
            load_token(&kube_client, selector)
                .await
                .context("Failed to load provider credentials")?,
        ),
        None => {
            warn!("No credentials secret configured, calling the gateway unauthenticated");
            None
        }
    };

    let provider = Arc::new(
        ProviderClient::new(&config.endpoint, api_token, config.request_timeout())
            .context("Failed to create provider client")?,
    );

    let shutdown = CancellationToken::new();
    let ctx = Arc::new(ControllerContext {
        config: Arc::new(config),
        kube_client,
        retry_tracker: Arc::new(RetryTracker::new()),
        shutdown: shutdown.clone(),
    });

    let health_port = health_port()?;
    let health_state = Arc::new(HealthState::new(provider.clone()));
    let health = tokio::spawn(run_health_server(health_state, health_port));

    let mut sigterm = signal(SignalKind::terminate()).context("Failed to setup SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to setup SIGINT handler")?;

    info!("Starting controllers");

    select! {
        result = run_controllers(ctx.clone(), provider) => {
            return result.context("Controller failure");
        }
        result = health => {
            match result {
                Ok(Ok(())) => bail!("Health server exited unexpectedly"),
                Ok(Err(e)) => return Err(e).context("Health server failed"),
                Err(e) => bail!("Health server task failed: {e}"),
            }
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down gracefully");
        }
        _ = sigint.recv() => {
            info!("Received SIGINT, shutting down gracefully");
        }
    }

    // In-flight provider calls observe the token and return Cancelled
    shutdown.cancel();
    info!(
        grace_seconds = SHUTDOWN_GRACE_SECS,
        "Starting graceful shutdown"
    );
    sleep(Duration::from_secs(SHUTDOWN_GRACE_SECS)).await;
    info!("Shutdown complete");

    Ok(())
}

/// Load the singleton ProviderConfig from the cluster
async fn load_config(client: &Client) -> Result<ProviderConfigSpec> {
    let api: Api<ProviderConfig> = Api::all(client.clone());
    let configs = api.list(&ListParams::default()).await?;

    let Some(config) = configs.items.first() else {
        bail!("No ProviderConfig found in cluster - please create one");
    };

    if configs.items.len() > 1 {
        warn!(
            count = configs.items.len(),
            "Multiple ProviderConfig resources found, using first one"
        );
    }

    Ok(config.spec.clone())
}

/// Read the gateway bearer token from the referenced Secret key
async fn load_token(client: &Client, selector: &SecretKeySelector) -> Result<String> {
    let secrets: Api<Secret> = Api::namespaced(client.clone(), &selector.namespace);

    let secret = secrets.get(&selector.name).await.with_context(|| {
        format!("Secret {}/{} not found", selector.namespace, selector.name)
    })?;

    let value = secret
        .data
        .as_ref()
        .and_then(|data| data.get(&selector.key))
        .with_context(|| format!("Secret missing {}", selector.key))?;

    let token = String::from_utf8(value.0.clone())
        .with_context(|| format!("Secret key {} is not valid UTF-8", selector.key))?;

    info!(
        secret_name = %selector.name,
        secret_namespace = %selector.namespace,
        "Loaded provider credentials"
    );
    Ok(token.trim().to_string())
}

fn health_port() -> Result<u16> {
    match std::env::var("HEALTH_PORT") {
        Ok(port) => port
            .parse()
            .with_context(|| format!("Invalid HEALTH_PORT {port}")),
        Err(_) => Ok(DEFAULT_HEALTH_PORT),
    }
}

/// Run all controllers concurrently
///
/// Returns an error if any controller exits, which should trigger a pod
/// restart by Kubernetes.
async fn run_controllers(ctx: Arc<ControllerContext>, provider: Arc<ProviderClient>) -> Result<()> {
    info!("Starting SecurityGroup controller");
    let security_groups = tokio::spawn(controllers::securitygroup::run(
        ctx.clone(),
        provider.clone(),
    ));

    info!("Starting AccessKey controller");
    let access_keys = tokio::spawn(controllers::accesskey::run(ctx.clone(), provider.clone()));

    info!("Starting Stack controller");
    let stacks = tokio::spawn(controllers::stack::run(ctx.clone(), provider.clone()));

    info!("Starting ElasticsearchDomain controller");
    let domains = tokio::spawn(controllers::domain::run(ctx.clone(), provider));

    info!("All controllers spawned");

    select! {
        result = security_groups => handle_controller_exit("SecurityGroup", result),
        result = access_keys => handle_controller_exit("AccessKey", result),
        result = stacks => handle_controller_exit("Stack", result),
        result = domains => handle_controller_exit("ElasticsearchDomain", result),
    }
}

/// Turn a controller task exit into an error
fn handle_controller_exit(name: &str, result: std::result::Result<(), JoinError>) -> Result<()> {
    match result {
        Ok(()) => {
            error!(controller = name, "Controller exited unexpectedly");
            bail!("{} controller exited unexpectedly", name)
        }
        Err(e) if e.is_panic() => {
            error!(controller = name, "Controller panicked");
            bail!("{} controller panicked: {:?}", name, e.into_panic())
        }
        Err(e) => {
            error!(controller = name, error = ?e, "Controller task failed");
            bail!("{} controller task failed: {}", name, e)
        }
    }
}
