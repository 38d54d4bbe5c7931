//! SecurityGroup controller
//!
//! Rules and tags are reconciled incrementally: missing rules are authorized,
//! extraneous ones revoked, and tags added or removed by key. A new group
//! comes with an allow-all egress rule which is revoked right after creation
//! unless the resource lists it among its egress rules.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use provider_sync_core::{
    diff_tags, late_init, Adapter, CallContext, Created, DiffError, Differ, Lifecycle, Patch,
    Reconciler,
};

use crate::client::ClientError;
use crate::crd::{
    group_entries, rule_entries, IpPermission, SecurityGroup, SecurityGroupObservation,
    SecurityGroupParameters,
};
use crate::services::ec2::{
    self, CreateSecurityGroupRequest, RuleDirection, SecurityGroupApi, SecurityGroupDescription,
    Tag,
};

use super::{region, run_managed, ControllerContext};

/// One incremental change to a security group
#[derive(Clone, Debug, PartialEq)]
pub enum SecurityGroupChange {
    CreateTags(BTreeMap<String, String>),
    DeleteTags(Vec<String>),
    Authorize(RuleDirection, Vec<IpPermission>),
    Revoke(RuleDirection, Vec<IpPermission>),
}

pub struct SecurityGroupAdapter {
    api: Arc<dyn SecurityGroupApi>,
    default_region: String,
}

impl SecurityGroupAdapter {
    pub fn new(api: Arc<dyn SecurityGroupApi>, default_region: &str) -> Self {
        Self {
            api,
            default_region: default_region.to_string(),
        }
    }

    fn region<'a>(&'a self, params: &'a SecurityGroupParameters) -> &'a str {
        region(params.region.as_deref(), &self.default_region)
    }
}

fn to_tags(tags: &BTreeMap<String, String>) -> Vec<Tag> {
    tags.iter()
        .map(|(key, value)| Tag {
            key: key.clone(),
            value: value.clone(),
        })
        .collect()
}

#[async_trait]
impl Adapter for SecurityGroupAdapter {
    const KIND: &'static str = "SecurityGroup";

    type Parameters = SecurityGroupParameters;
    type State = SecurityGroupDescription;
    type Change = SecurityGroupChange;
    type Error = ClientError;

    async fn describe(
        &self,
        _ctx: &CallContext,
        external_name: &str,
        params: &SecurityGroupParameters,
    ) -> Result<Vec<SecurityGroupDescription>, ClientError> {
        self.api
            .describe_security_groups(self.region(params), external_name)
            .await
    }

    async fn create(
        &self,
        _ctx: &CallContext,
        params: &SecurityGroupParameters,
    ) -> Result<Created, ClientError> {
        let request = CreateSecurityGroupRequest {
            group_name: params.group_name.clone(),
            description: params.description.clone(),
            vpc_id: params.vpc_id.clone(),
            tags: to_tags(&params.tags),
        };
        let group_id = self
            .api
            .create_security_group(self.region(params), &request)
            .await?;
        Ok(Created::new(group_id))
    }

    async fn apply_change(
        &self,
        _ctx: &CallContext,
        external_name: &str,
        params: &SecurityGroupParameters,
        change: &SecurityGroupChange,
    ) -> Result<(), ClientError> {
        let region = self.region(params);
        match change {
            SecurityGroupChange::CreateTags(tags) => {
                self.api
                    .create_tags(region, external_name, &to_tags(tags))
                    .await
            }
            SecurityGroupChange::DeleteTags(keys) => {
                self.api.delete_tags(region, external_name, keys).await
            }
            SecurityGroupChange::Authorize(direction, rules) => {
                self.api
                    .authorize_rules(region, external_name, *direction, rules)
                    .await
            }
            SecurityGroupChange::Revoke(direction, rules) => {
                self.api
                    .revoke_rules(region, external_name, *direction, rules)
                    .await
            }
        }
    }

    async fn delete(
        &self,
        _ctx: &CallContext,
        external_name: &str,
        params: &SecurityGroupParameters,
    ) -> Result<(), ClientError> {
        self.api
            .delete_security_group(self.region(params), external_name)
            .await
    }

    fn is_not_found(&self, err: &ClientError) -> bool {
        ec2::is_group_not_found(err)
    }

    fn is_tolerable(&self, change: &SecurityGroupChange, err: &ClientError) -> bool {
        match change {
            SecurityGroupChange::Authorize(..) => ec2::is_duplicate_permission(err),
            SecurityGroupChange::Revoke(..) => ec2::is_permission_not_found(err),
            _ => false,
        }
    }
}

/// Whether two rule lists grant the same entries, however they are grouped
fn same_rules(a: &[IpPermission], b: &[IpPermission]) -> bool {
    rule_entries(a).keys().eq(rule_entries(b).keys())
}

/// Entries of `from` that are absent from `other`, regrouped per port range
fn rules_missing(from: &[IpPermission], other: &[IpPermission]) -> Vec<IpPermission> {
    let other = rule_entries(other);
    group_entries(
        rule_entries(from)
            .into_iter()
            .filter(|(entry, _)| !other.contains_key(entry)),
    )
}

pub struct SecurityGroupDiffer;

impl SecurityGroupDiffer {
    fn rule_changes(
        patch: &mut Patch<SecurityGroupChange>,
        direction: RuleDirection,
        desired: &[IpPermission],
        observed: &[IpPermission],
    ) {
        let authorize = rules_missing(desired, observed);
        if !authorize.is_empty() {
            patch.push(SecurityGroupChange::Authorize(direction, authorize));
        }
        let revoke = rules_missing(observed, desired);
        if !revoke.is_empty() {
            patch.push(SecurityGroupChange::Revoke(direction, revoke));
        }
    }
}

impl Differ for SecurityGroupDiffer {
    type Parameters = SecurityGroupParameters;
    type State = SecurityGroupDescription;
    type Observation = SecurityGroupObservation;
    type Change = SecurityGroupChange;

    fn late_initialize(&self, desired: &mut SecurityGroupParameters, observed: &SecurityGroupDescription) {
        late_init(&mut desired.vpc_id, observed.vpc_id.as_ref());
    }

    fn is_up_to_date(
        &self,
        desired: &SecurityGroupParameters,
        observed: &SecurityGroupDescription,
    ) -> Result<bool, DiffError> {
        let (add, remove) = diff_tags(&desired.tags, &observed.tag_map());
        Ok(add.is_empty()
            && remove.is_empty()
            && same_rules(&desired.ingress, &observed.ip_permissions)
            && same_rules(&desired.egress, &observed.ip_permissions_egress))
    }

    fn patch(
        &self,
        observed: &SecurityGroupDescription,
        desired: &SecurityGroupParameters,
    ) -> Patch<SecurityGroupChange> {
        let mut patch = Patch::new();

        let (add, remove) = diff_tags(&desired.tags, &observed.tag_map());
        if !remove.is_empty() {
            patch.push(SecurityGroupChange::DeleteTags(remove));
        }
        if !add.is_empty() {
            patch.push(SecurityGroupChange::CreateTags(add));
        }

        Self::rule_changes(
            &mut patch,
            RuleDirection::Ingress,
            &desired.ingress,
            &observed.ip_permissions,
        );
        Self::rule_changes(
            &mut patch,
            RuleDirection::Egress,
            &desired.egress,
            &observed.ip_permissions_egress,
        );
        patch
    }

    fn observation(&self, observed: &SecurityGroupDescription) -> SecurityGroupObservation {
        SecurityGroupObservation {
            security_group_id: observed.group_id.clone(),
            owner_id: observed.owner_id.clone(),
            vpc_id: observed.vpc_id.clone(),
        }
    }

    fn corrections(&self, desired: &SecurityGroupParameters) -> Vec<SecurityGroupChange> {
        if desired.egress.iter().any(IpPermission::is_allow_all_egress) {
            return Vec::new();
        }
        vec![SecurityGroupChange::Revoke(
            RuleDirection::Egress,
            vec![IpPermission::allow_all_egress()],
        )]
    }
}

pub fn reconciler(api: Arc<dyn SecurityGroupApi>, default_region: &str) -> Reconciler<SecurityGroup> {
    let lifecycle = Lifecycle::new(
        SecurityGroupAdapter::new(api, default_region),
        SecurityGroupDiffer,
    );
    Reconciler::new(Arc::new(lifecycle))
}

/// Start the SecurityGroup controller
pub async fn run(shared: Arc<ControllerContext>, api: Arc<dyn SecurityGroupApi>) {
    let reconciler = reconciler(api, &shared.config.region);
    run_managed::<SecurityGroup>(shared, reconciler).await;
}
