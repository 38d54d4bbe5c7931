//! ElasticsearchDomain controller
//!
//! The domain name is the external name. Configuration drift is pushed as a
//! single config update carrying only the fields that differ. The engine
//! version is set at creation and late-initialized; upgrades are not driven
//! from here.

use std::sync::Arc;

use async_trait::async_trait;
use provider_sync_core::{
    late_init, late_init_map, Adapter, CallContext, Condition, ConnectionDetails, Created,
    DiffError, Differ, Lifecycle, Patch, Reconciler, CONNECTION_ENDPOINT_KEY,
};

use crate::client::ClientError;
use crate::crd::{
    ClusterConfig, EbsOptions, ElasticsearchDomain, ElasticsearchDomainObservation,
    ElasticsearchDomainParameters, SnapshotOptions,
};
use crate::services::elasticsearch::{
    self, CreateDomainRequest, DomainApi, DomainConfig, DomainStatus,
};

use super::{region, run_managed, ControllerContext};

#[derive(Clone, Debug, PartialEq)]
pub enum DomainChange {
    UpdateConfig(DomainConfig),
}

pub struct DomainAdapter {
    api: Arc<dyn DomainApi>,
    default_region: String,
}

impl DomainAdapter {
    pub fn new(api: Arc<dyn DomainApi>, default_region: &str) -> Self {
        Self {
            api,
            default_region: default_region.to_string(),
        }
    }

    fn region<'a>(&'a self, params: &'a ElasticsearchDomainParameters) -> &'a str {
        region(params.region.as_deref(), &self.default_region)
    }
}

#[async_trait]
impl Adapter for DomainAdapter {
    const KIND: &'static str = "ElasticsearchDomain";

    type Parameters = ElasticsearchDomainParameters;
    type State = DomainStatus;
    type Change = DomainChange;
    type Error = ClientError;

    async fn describe(
        &self,
        _ctx: &CallContext,
        external_name: &str,
        params: &ElasticsearchDomainParameters,
    ) -> Result<Vec<DomainStatus>, ClientError> {
        let domain = self
            .api
            .describe_domain(self.region(params), external_name)
            .await?;
        Ok(vec![domain])
    }

    async fn create(
        &self,
        _ctx: &CallContext,
        params: &ElasticsearchDomainParameters,
    ) -> Result<Created, ClientError> {
        let domain = self
            .api
            .create_domain(self.region(params), &CreateDomainRequest::from(params))
            .await?;
        Ok(Created::new(domain.domain_name))
    }

    async fn apply_change(
        &self,
        _ctx: &CallContext,
        external_name: &str,
        params: &ElasticsearchDomainParameters,
        change: &DomainChange,
    ) -> Result<(), ClientError> {
        match change {
            DomainChange::UpdateConfig(config) => {
                self.api
                    .update_domain_config(self.region(params), external_name, config)
                    .await
            }
        }
    }

    async fn delete(
        &self,
        _ctx: &CallContext,
        external_name: &str,
        params: &ElasticsearchDomainParameters,
    ) -> Result<(), ClientError> {
        self.api
            .delete_domain(self.region(params), external_name)
            .await
    }

    fn is_not_found(&self, err: &ClientError) -> bool {
        elasticsearch::is_domain_not_found(err)
    }
}

/// Fill unset fields of a nested options struct, field by field
fn late_init_options<T: Clone>(
    desired: &mut Option<T>,
    observed: Option<&T>,
    fill: impl FnOnce(&mut T, &T),
) {
    match (desired.as_mut(), observed) {
        (None, Some(observed)) => *desired = Some(observed.clone()),
        (Some(desired), Some(observed)) => fill(desired, observed),
        _ => {}
    }
}

fn late_init_ebs(desired: &mut EbsOptions, observed: &EbsOptions) {
    late_init(&mut desired.ebs_enabled, observed.ebs_enabled.as_ref());
    late_init(&mut desired.volume_type, observed.volume_type.as_ref());
    late_init(&mut desired.volume_size, observed.volume_size.as_ref());
    late_init(&mut desired.iops, observed.iops.as_ref());
}

fn late_init_cluster(desired: &mut ClusterConfig, observed: &ClusterConfig) {
    late_init(&mut desired.instance_type, observed.instance_type.as_ref());
    late_init(&mut desired.instance_count, observed.instance_count.as_ref());
    late_init(
        &mut desired.dedicated_master_enabled,
        observed.dedicated_master_enabled.as_ref(),
    );
    late_init(
        &mut desired.zone_awareness_enabled,
        observed.zone_awareness_enabled.as_ref(),
    );
}

fn late_init_snapshot(desired: &mut SnapshotOptions, observed: &SnapshotOptions) {
    late_init(
        &mut desired.automated_snapshot_start_hour,
        observed.automated_snapshot_start_hour.as_ref(),
    );
}

fn parse_policy(policy: &str) -> Result<serde_json::Value, DiffError> {
    serde_json::from_str(policy)
        .map_err(|e| DiffError::new(format!("access policies are not valid JSON: {e}")))
}

/// Compare access policy documents, ignoring formatting and key order
fn policies_match(
    desired: Option<&str>,
    observed: Option<&str>,
) -> Result<bool, DiffError> {
    match (desired, observed) {
        (None, _) => Ok(true),
        (Some(_), None) => Ok(false),
        (Some(desired), Some(observed)) => Ok(parse_policy(desired)? == parse_policy(observed)?),
    }
}

/// Desired value when it differs from the observed one
fn drifted<T: Clone + PartialEq>(desired: &Option<T>, observed: &Option<T>) -> Option<T> {
    desired
        .as_ref()
        .filter(|d| observed.as_ref() != Some(*d))
        .cloned()
}

/// Configuration fields that differ; access policies are included when
/// `policies_in_sync` is false
fn config_drift(
    desired: &ElasticsearchDomainParameters,
    observed: &DomainStatus,
    policies_in_sync: bool,
) -> DomainConfig {
    // Only keys the resource sets are compared; the provider adds its own defaults
    let advanced_options = desired
        .advanced_options
        .iter()
        .filter(|(key, value)| observed.advanced_options.get(*key) != Some(*value))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    DomainConfig {
        access_policies: if policies_in_sync {
            None
        } else {
            desired.access_policies.clone()
        },
        advanced_options,
        ebs_options: drifted(&desired.ebs_options, &observed.ebs_options),
        cluster_config: drifted(&desired.cluster_config, &observed.cluster_config),
        snapshot_options: drifted(&desired.snapshot_options, &observed.snapshot_options),
    }
}

pub struct DomainDiffer;

impl Differ for DomainDiffer {
    type Parameters = ElasticsearchDomainParameters;
    type State = DomainStatus;
    type Observation = ElasticsearchDomainObservation;
    type Change = DomainChange;

    fn late_initialize(&self, desired: &mut ElasticsearchDomainParameters, observed: &DomainStatus) {
        late_init(
            &mut desired.elasticsearch_version,
            observed.elasticsearch_version.as_ref(),
        );
        late_init(&mut desired.access_policies, observed.access_policies.as_ref());
        late_init_map(&mut desired.advanced_options, &observed.advanced_options);
        late_init_options(
            &mut desired.ebs_options,
            observed.ebs_options.as_ref(),
            late_init_ebs,
        );
        late_init_options(
            &mut desired.cluster_config,
            observed.cluster_config.as_ref(),
            late_init_cluster,
        );
        late_init_options(
            &mut desired.snapshot_options,
            observed.snapshot_options.as_ref(),
            late_init_snapshot,
        );
    }

    fn is_up_to_date(
        &self,
        desired: &ElasticsearchDomainParameters,
        observed: &DomainStatus,
    ) -> Result<bool, DiffError> {
        let policies_in_sync = policies_match(
            desired.access_policies.as_deref(),
            observed.access_policies.as_deref(),
        )?;
        Ok(config_drift(desired, observed, policies_in_sync).is_empty())
    }

    fn patch(
        &self,
        observed: &DomainStatus,
        desired: &ElasticsearchDomainParameters,
    ) -> Patch<DomainChange> {
        let policies_in_sync = policies_match(
            desired.access_policies.as_deref(),
            observed.access_policies.as_deref(),
        )
        .unwrap_or(false);

        let config = config_drift(desired, observed, policies_in_sync);
        if config.is_empty() {
            return Patch::new();
        }
        vec![DomainChange::UpdateConfig(config)].into()
    }

    fn observation(&self, observed: &DomainStatus) -> ElasticsearchDomainObservation {
        ElasticsearchDomainObservation {
            arn: observed.arn.clone(),
            domain_id: observed.domain_id.clone(),
            endpoint: observed.endpoint.clone(),
            created: observed.created,
            deleted: observed.deleted,
            processing: observed.processing,
        }
    }

    fn readiness(&self, observed: &DomainStatus, _up_to_date: bool) -> Option<Condition> {
        Some(if observed.deleted {
            Condition::deleting()
        } else if observed.created && !observed.processing {
            Condition::available()
        } else {
            Condition::creating()
        })
    }

    fn connection_details(&self, observed: &DomainStatus) -> ConnectionDetails {
        observed
            .endpoint
            .iter()
            .map(|endpoint| {
                (
                    CONNECTION_ENDPOINT_KEY.to_string(),
                    endpoint.clone().into_bytes(),
                )
            })
            .collect()
    }
}

pub fn reconciler(api: Arc<dyn DomainApi>, default_region: &str) -> Reconciler<ElasticsearchDomain> {
    Reconciler::new(Arc::new(Lifecycle::new(
        DomainAdapter::new(api, default_region),
        DomainDiffer,
    )))
}

/// Start the ElasticsearchDomain controller
pub async fn run(shared: Arc<ControllerContext>, api: Arc<dyn DomainApi>) {
    let reconciler = reconciler(api, &shared.config.region);
    run_managed::<ElasticsearchDomain>(shared, reconciler).await;
}
