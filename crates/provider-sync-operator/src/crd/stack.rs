//! Stack CRD

use std::collections::BTreeMap;

use kube::CustomResource;
use provider_sync_core::{Condition, DeletionPolicy};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::impl_managed;
use crate::config::SecretReference;

/// Stack spec
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "cloudformation.provider-sync.io",
    version = "v1alpha1",
    kind = "Stack",
    plural = "stacks",
    namespaced = false,
    status = "StackStatus",
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type=='Ready')].status"}"#,
    printcolumn = r#"{"name":"Synced", "type":"string", "jsonPath":".status.conditions[?(@.type=='Synced')].status"}"#,
    printcolumn = r#"{"name":"Status", "type":"string", "jsonPath":".status.atProvider.stackStatus"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct StackSpec {
    #[serde(default)]
    pub deletion_policy: DeletionPolicy,
    /// Receives the stack outputs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_connection_secret_to_ref: Option<SecretReference>,
    pub for_provider: StackParameters,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StackParameters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    pub stack_name: String,
    /// Template document, JSON or YAML
    pub template_body: String,
    /// Template parameters; empty values are not sent
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StackObservation {
    pub stack_id: String,
    pub stack_status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_status_reason: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StackStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at_provider: Option<StackObservation>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl_managed!(Stack, StackParameters, StackObservation);
