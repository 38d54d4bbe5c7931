//! Elasticsearch domain API

use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::client::{ClientError, ProviderClient};
use crate::crd::{ClusterConfig, EbsOptions, ElasticsearchDomainParameters, SnapshotOptions};

pub const RESOURCE_NOT_FOUND: &str = "ResourceNotFoundException";

pub fn is_domain_not_found(err: &ClientError) -> bool {
    err.has_code(RESOURCE_NOT_FOUND)
}

/// A domain as reported by the provider
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainStatus {
    pub arn: String,
    pub domain_id: String,
    pub domain_name: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub created: bool,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub processing: bool,
    #[serde(default)]
    pub elasticsearch_version: Option<String>,
    #[serde(default)]
    pub access_policies: Option<String>,
    #[serde(default)]
    pub advanced_options: BTreeMap<String, String>,
    #[serde(default)]
    pub ebs_options: Option<EbsOptions>,
    #[serde(default)]
    pub cluster_config: Option<ClusterConfig>,
    #[serde(default)]
    pub snapshot_options: Option<SnapshotOptions>,
}

/// Mutable domain configuration; unset fields are left alone
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_policies: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub advanced_options: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ebs_options: Option<EbsOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_config: Option<ClusterConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_options: Option<SnapshotOptions>,
}

impl DomainConfig {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDomainRequest {
    pub domain_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elasticsearch_version: Option<String>,
    #[serde(flatten)]
    pub config: DomainConfig,
}

impl From<&ElasticsearchDomainParameters> for CreateDomainRequest {
    fn from(params: &ElasticsearchDomainParameters) -> Self {
        Self {
            domain_name: params.domain_name.clone(),
            elasticsearch_version: params.elasticsearch_version.clone(),
            config: DomainConfig {
                access_policies: params.access_policies.clone(),
                advanced_options: params.advanced_options.clone(),
                ebs_options: params.ebs_options.clone(),
                cluster_config: params.cluster_config.clone(),
                snapshot_options: params.snapshot_options.clone(),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DomainStatusResponse {
    domain_status: DomainStatus,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DomainApi: Send + Sync {
    async fn describe_domain(&self, region: &str, domain_name: &str)
        -> Result<DomainStatus, ClientError>;

    async fn create_domain(
        &self,
        region: &str,
        request: &CreateDomainRequest,
    ) -> Result<DomainStatus, ClientError>;

    async fn update_domain_config(
        &self,
        region: &str,
        domain_name: &str,
        config: &DomainConfig,
    ) -> Result<(), ClientError>;

    async fn delete_domain(&self, region: &str, domain_name: &str) -> Result<(), ClientError>;
}

#[async_trait]
impl DomainApi for ProviderClient {
    #[instrument(skip(self))]
    async fn describe_domain(
        &self,
        region: &str,
        domain_name: &str,
    ) -> Result<DomainStatus, ClientError> {
        let response: DomainStatusResponse = self
            .get_json(Some(region), &["v1", "es", "domains", domain_name])
            .await?;
        Ok(response.domain_status)
    }

    #[instrument(skip(self, request), fields(domain_name = %request.domain_name))]
    async fn create_domain(
        &self,
        region: &str,
        request: &CreateDomainRequest,
    ) -> Result<DomainStatus, ClientError> {
        let response: DomainStatusResponse = self
            .send_json(Some(region), Method::POST, &["v1", "es", "domains"], request)
            .await?;
        Ok(response.domain_status)
    }

    #[instrument(skip(self, config))]
    async fn update_domain_config(
        &self,
        region: &str,
        domain_name: &str,
        config: &DomainConfig,
    ) -> Result<(), ClientError> {
        self.send_unit(
            Some(region),
            Method::POST,
            &["v1", "es", "domains", domain_name, "config"],
            config,
        )
        .await
    }

    #[instrument(skip(self))]
    async fn delete_domain(&self, region: &str, domain_name: &str) -> Result<(), ClientError> {
        self.delete(Some(region), &["v1", "es", "domains", domain_name])
            .await
    }
}
