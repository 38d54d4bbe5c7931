//! SecurityGroup CRD

use std::collections::BTreeMap;

use kube::CustomResource;
use provider_sync_core::{Condition, DeletionPolicy};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::impl_managed;
use crate::config::SecretReference;

/// SecurityGroup spec
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "ec2.provider-sync.io",
    version = "v1alpha1",
    kind = "SecurityGroup",
    plural = "securitygroups",
    shortname = "sg",
    namespaced = false,
    status = "SecurityGroupStatus",
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type=='Ready')].status"}"#,
    printcolumn = r#"{"name":"Synced", "type":"string", "jsonPath":".status.conditions[?(@.type=='Synced')].status"}"#,
    printcolumn = r#"{"name":"ID", "type":"string", "jsonPath":".metadata.annotations.provider-sync\\.io/external-name"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct SecurityGroupSpec {
    #[serde(default)]
    pub deletion_policy: DeletionPolicy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_connection_secret_to_ref: Option<SecretReference>,
    pub for_provider: SecurityGroupParameters,
}

/// Desired security group
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecurityGroupParameters {
    /// Region; the ProviderConfig default applies when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Group name, immutable after creation
    pub group_name: String,
    /// Description, immutable after creation
    pub description: String,
    /// VPC the group belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vpc_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ingress: Vec<IpPermission>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub egress: Vec<IpPermission>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
}

/// A traffic rule
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IpPermission {
    /// Protocol name or number; "-1" means all protocols
    pub ip_protocol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_port: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_port: Option<i32>,
    #[serde(default)]
    pub ip_ranges: Vec<IpRange>,
}

/// IPv4 CIDR block of a rule
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IpRange {
    pub cidr_ip: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl IpPermission {
    /// The allow-all egress rule the provider adds to every new group
    pub fn allow_all_egress() -> Self {
        Self {
            ip_protocol: "-1".to_string(),
            from_port: None,
            to_port: None,
            ip_ranges: vec![IpRange {
                cidr_ip: "0.0.0.0/0".to_string(),
                description: None,
            }],
        }
    }

    /// One entry per CIDR block
    pub fn entries(&self) -> impl Iterator<Item = (RuleEntry, Option<String>)> + '_ {
        self.ip_ranges.iter().map(move |range| {
            (
                RuleEntry {
                    ip_protocol: self.ip_protocol.clone(),
                    from_port: self.from_port,
                    to_port: self.to_port,
                    cidr_ip: range.cidr_ip.clone(),
                },
                range.description.clone(),
            )
        })
    }

    /// Whether the rule opens every protocol to 0.0.0.0/0
    pub fn is_allow_all_egress(&self) -> bool {
        let allow_all = allow_all_entry();
        self.entries().any(|(entry, _)| entry == allow_all)
    }
}

fn allow_all_entry() -> RuleEntry {
    RuleEntry {
        ip_protocol: "-1".to_string(),
        from_port: None,
        to_port: None,
        cidr_ip: "0.0.0.0/0".to_string(),
    }
}

/// A single protocol, port range and CIDR
///
/// Providers merge rules sharing a protocol and port range into one
/// permission with several ranges, so rule lists are compared at this grain.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct RuleEntry {
    pub ip_protocol: String,
    pub from_port: Option<i32>,
    pub to_port: Option<i32>,
    pub cidr_ip: String,
}

/// Flatten rules into entries, keeping the first description seen per entry
pub fn rule_entries(rules: &[IpPermission]) -> BTreeMap<RuleEntry, Option<String>> {
    let mut entries = BTreeMap::new();
    for (entry, description) in rules.iter().flat_map(IpPermission::entries) {
        entries.entry(entry).or_insert(description);
    }
    entries
}

/// Regroup entries into one permission per protocol and port range
pub fn group_entries<I>(entries: I) -> Vec<IpPermission>
where
    I: IntoIterator<Item = (RuleEntry, Option<String>)>,
{
    let mut grouped: BTreeMap<(String, Option<i32>, Option<i32>), Vec<IpRange>> = BTreeMap::new();
    for (entry, description) in entries {
        grouped
            .entry((entry.ip_protocol, entry.from_port, entry.to_port))
            .or_default()
            .push(IpRange {
                cidr_ip: entry.cidr_ip,
                description,
            });
    }
    grouped
        .into_iter()
        .map(|((ip_protocol, from_port, to_port), mut ip_ranges)| {
            ip_ranges.sort();
            IpPermission {
                ip_protocol,
                from_port,
                to_port,
                ip_ranges,
            }
        })
        .collect()
}

/// Observed security group attributes
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecurityGroupObservation {
    pub security_group_id: String,
    #[serde(default)]
    pub owner_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vpc_id: Option<String>,
}

/// SecurityGroup status
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecurityGroupStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at_provider: Option<SecurityGroupObservation>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl_managed!(SecurityGroup, SecurityGroupParameters, SecurityGroupObservation);
