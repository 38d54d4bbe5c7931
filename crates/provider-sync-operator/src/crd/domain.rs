//! ElasticsearchDomain CRD

use std::collections::BTreeMap;

use kube::CustomResource;
use provider_sync_core::{Condition, DeletionPolicy};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::impl_managed;
use crate::config::SecretReference;

/// ElasticsearchDomain spec
///
/// The domain name doubles as the external name.
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "elasticsearch.provider-sync.io",
    version = "v1alpha1",
    kind = "ElasticsearchDomain",
    plural = "elasticsearchdomains",
    shortname = "esd",
    namespaced = false,
    status = "ElasticsearchDomainStatus",
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type=='Ready')].status"}"#,
    printcolumn = r#"{"name":"Synced", "type":"string", "jsonPath":".status.conditions[?(@.type=='Synced')].status"}"#,
    printcolumn = r#"{"name":"Endpoint", "type":"string", "jsonPath":".status.atProvider.endpoint"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ElasticsearchDomainSpec {
    #[serde(default)]
    pub deletion_policy: DeletionPolicy,
    /// Receives the domain `endpoint`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_connection_secret_to_ref: Option<SecretReference>,
    pub for_provider: ElasticsearchDomainParameters,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ElasticsearchDomainParameters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    pub domain_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elasticsearch_version: Option<String>,
    /// IAM policy document (JSON); compared semantically
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_policies: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub advanced_options: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ebs_options: Option<EbsOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_config: Option<ClusterConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_options: Option<SnapshotOptions>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EbsOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ebs_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_type: Option<String>,
    /// GiB
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_size: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iops: Option<i64>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_count: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dedicated_master_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone_awareness_enabled: Option<bool>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotOptions {
    /// UTC hour of the daily automated snapshot
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub automated_snapshot_start_hour: Option<i64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ElasticsearchDomainObservation {
    pub arn: String,
    pub domain_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub created: bool,
    #[serde(default)]
    pub deleted: bool,
    /// A configuration change is being applied
    #[serde(default)]
    pub processing: bool,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ElasticsearchDomainStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at_provider: Option<ElasticsearchDomainObservation>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl_managed!(
    ElasticsearchDomain,
    ElasticsearchDomainParameters,
    ElasticsearchDomainObservation
);
