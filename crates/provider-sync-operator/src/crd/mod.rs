//! Managed resource CRDs
//!
//! Every kind follows the same shape:
//!
//! - `spec.forProvider` - desired provider parameters
//! - `spec.deletionPolicy` - `Delete` (default) or `Orphan`
//! - `spec.writeConnectionSecretToRef` - where one-time credentials are published
//! - `status.atProvider` - last observed provider attributes
//! - `status.conditions` - `Ready` and `Synced`
//!
//! The external name lives in the `provider-sync.io/external-name` annotation.

mod accesskey;
mod domain;
mod securitygroup;
mod stack;

use std::collections::BTreeMap;
use std::fmt::Debug;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::core::ClusterResourceScope;
use kube::Resource;
use provider_sync_core::Managed;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::{annotations, SecretReference};

pub use accesskey::{
    AccessKey, AccessKeyObservation, AccessKeyParameters, AccessKeySpec, AccessKeyStatus,
    AccessKeyStatusType,
};
pub use domain::{
    ClusterConfig, EbsOptions, ElasticsearchDomain, ElasticsearchDomainObservation,
    ElasticsearchDomainParameters, ElasticsearchDomainSpec, ElasticsearchDomainStatus,
    SnapshotOptions,
};
pub use securitygroup::{
    group_entries, rule_entries, IpPermission, IpRange, RuleEntry, SecurityGroup,
    SecurityGroupObservation, SecurityGroupParameters, SecurityGroupSpec, SecurityGroupStatus,
};
pub use stack::{Stack, StackObservation, StackParameters, StackSpec, StackStatus};

/// Kubernetes side of a managed resource
pub trait ManagedResource:
    Managed
    + Resource<DynamicType = (), Scope = ClusterResourceScope>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    /// Secret that receives connection details, if requested
    fn connection_secret(&self) -> Option<&SecretReference>;

    /// `spec` as JSON, for merge patches
    fn spec_value(&self) -> serde_json::Value;

    /// `status` as JSON, for status patches
    fn status_value(&self) -> serde_json::Value;
}

/// Read the external name annotation
pub fn external_name(meta: &ObjectMeta) -> Option<&str> {
    meta.annotations
        .as_ref()?
        .get(annotations::EXTERNAL_NAME)
        .map(String::as_str)
}

/// Set the external name annotation
pub fn set_external_name(meta: &mut ObjectMeta, name: &str) {
    meta.annotations
        .get_or_insert_with(BTreeMap::new)
        .insert(annotations::EXTERNAL_NAME.to_string(), name.to_string());
}

/// Implements [`Managed`] and [`ManagedResource`] for a CRD whose spec has
/// `for_provider`, `deletion_policy` and `write_connection_secret_to_ref`, and
/// whose status has `conditions` and `at_provider`.
macro_rules! impl_managed {
    ($kind:ty, $params:ty, $observation:ty) => {
        impl ::provider_sync_core::Managed for $kind {
            type Parameters = $params;
            type Observation = $observation;

            fn parameters(&self) -> &$params {
                &self.spec.for_provider
            }

            fn parameters_mut(&mut self) -> &mut $params {
                &mut self.spec.for_provider
            }

            fn set_observation(&mut self, observation: $observation) {
                self.status.get_or_insert_with(Default::default).at_provider = Some(observation);
            }

            fn external_name(&self) -> Option<&str> {
                $crate::crd::external_name(&self.metadata)
            }

            fn set_external_name(&mut self, name: &str) {
                $crate::crd::set_external_name(&mut self.metadata, name);
            }

            fn conditions(&self) -> &[::provider_sync_core::Condition] {
                self.status
                    .as_ref()
                    .map(|s| s.conditions.as_slice())
                    .unwrap_or(&[])
            }

            fn conditions_mut(&mut self) -> &mut Vec<::provider_sync_core::Condition> {
                &mut self.status.get_or_insert_with(Default::default).conditions
            }

            fn deletion_policy(&self) -> ::provider_sync_core::DeletionPolicy {
                self.spec.deletion_policy
            }
        }

        impl $crate::crd::ManagedResource for $kind {
            fn connection_secret(&self) -> Option<&$crate::config::SecretReference> {
                self.spec.write_connection_secret_to_ref.as_ref()
            }

            fn spec_value(&self) -> ::serde_json::Value {
                ::serde_json::to_value(&self.spec).unwrap_or_default()
            }

            fn status_value(&self) -> ::serde_json::Value {
                ::serde_json::to_value(&self.status).unwrap_or_default()
            }
        }
    };
}

pub(crate) use impl_managed;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_external_name_annotation() {
        let mut meta = ObjectMeta::default();
        assert!(external_name(&meta).is_none());

        set_external_name(&mut meta, "sg-0abc");
        assert_eq!(external_name(&meta), Some("sg-0abc"));
        assert_eq!(
            meta.annotations.unwrap().get("provider-sync.io/external-name"),
            Some(&"sg-0abc".to_string())
        );
    }
}
