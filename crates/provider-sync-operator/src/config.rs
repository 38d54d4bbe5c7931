//! CRD and configuration types

use std::time::Duration;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Reference to a Kubernetes Secret
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecretReference {
    /// Secret name
    pub name: String,
    /// Secret namespace
    pub namespace: String,
}

/// Reference to a single key within a Secret
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecretKeySelector {
    /// Secret name
    pub name: String,
    /// Secret namespace
    pub namespace: String,
    /// Key holding the bearer token
    #[serde(default = "default_token_key")]
    pub key: String,
}

fn default_token_key() -> String {
    "token".to_string()
}

/// ProviderConfig spec
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "provider-sync.io",
    version = "v1alpha1",
    kind = "ProviderConfig",
    plural = "providerconfigs",
    shortname = "pc",
    namespaced = false
)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfigSpec {
    /// Base URL of the provider API gateway
    pub endpoint: String,
    /// Secret holding the API token
    pub credentials_secret_ref: Option<SecretKeySelector>,
    /// Region used when a resource does not name one
    #[serde(default = "default_region")]
    pub region: String,
    /// Interval between resyncs of converged resources (seconds)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,
    /// Timeout for a single provider API call (seconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_poll_interval() -> u64 {
    60
}

fn default_request_timeout() -> u64 {
    30
}

impl ProviderConfigSpec {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds.max(1))
    }
}

/// Annotations used by the operator
pub mod annotations {
    /// Provider-assigned identifier of the external resource
    pub const EXTERNAL_NAME: &str = "provider-sync.io/external-name";
}

/// Finalizer guarding deletion of the external resource
pub const FINALIZER: &str = "provider-sync.io/managed-resource";
