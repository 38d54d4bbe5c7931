//! AccessKey CRD

use std::fmt;

use kube::CustomResource;
use provider_sync_core::{Condition, DeletionPolicy};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::impl_managed;
use crate::config::SecretReference;

/// AccessKey spec
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "iam.provider-sync.io",
    version = "v1alpha1",
    kind = "AccessKey",
    plural = "accesskeys",
    namespaced = false,
    status = "AccessKeyStatus",
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type=='Ready')].status"}"#,
    printcolumn = r#"{"name":"Synced", "type":"string", "jsonPath":".status.conditions[?(@.type=='Synced')].status"}"#,
    printcolumn = r#"{"name":"User", "type":"string", "jsonPath":".spec.forProvider.userName"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct AccessKeySpec {
    #[serde(default)]
    pub deletion_policy: DeletionPolicy,
    /// Receives `username` (access key id) and `password` (secret access key)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_connection_secret_to_ref: Option<SecretReference>,
    pub for_provider: AccessKeyParameters,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AccessKeyParameters {
    /// User that owns the key
    pub user_name: String,
    /// Desired key status; filled in from the provider when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<AccessKeyStatusType>,
}

/// Whether a key can be used to sign requests
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum AccessKeyStatusType {
    #[default]
    Active,
    Inactive,
}

impl fmt::Display for AccessKeyStatusType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AccessKeyObservation {
    pub access_key_id: String,
    pub status: AccessKeyStatusType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_date: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AccessKeyStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at_provider: Option<AccessKeyObservation>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl_managed!(AccessKey, AccessKeyParameters, AccessKeyObservation);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_access_key() {
        let yaml = r#"
writeConnectionSecretToRef:
  name: ci-key
  namespace: ci
forProvider:
  userName: ci-bot
  status: Inactive
"#;
        let spec: AccessKeySpec = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(spec.for_provider.user_name, "ci-bot");
        assert_eq!(spec.for_provider.status, Some(AccessKeyStatusType::Inactive));
        assert_eq!(
            spec.write_connection_secret_to_ref,
            Some(SecretReference {
                name: "ci-key".to_string(),
                namespace: "ci".to_string(),
            })
        );
    }

    #[test]
    fn test_status_is_optional() {
        let yaml = r#"
forProvider:
  userName: ci-bot
"#;
        let spec: AccessKeySpec = serde_yaml::from_str(yaml).unwrap();
        assert!(spec.for_provider.status.is_none());
    }

    #[test]
    fn test_unknown_status_is_rejected() {
        let yaml = r#"
forProvider:
  userName: ci-bot
  status: Expired
"#;
        assert!(serde_yaml::from_str::<AccessKeySpec>(yaml).is_err());
    }
}
