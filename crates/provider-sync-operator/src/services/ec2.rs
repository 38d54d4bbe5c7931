//! EC2 security group API

use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::client::{ClientError, ProviderClient};
use crate::crd::IpPermission;

/// The group does not exist
pub const INVALID_GROUP_NOT_FOUND: &str = "InvalidGroup.NotFound";
/// An authorized rule is already present
pub const INVALID_PERMISSION_DUPLICATE: &str = "InvalidPermission.Duplicate";
/// A revoked rule is already gone
pub const INVALID_PERMISSION_NOT_FOUND: &str = "InvalidPermission.NotFound";

pub fn is_group_not_found(err: &ClientError) -> bool {
    err.has_code(INVALID_GROUP_NOT_FOUND)
}

pub fn is_duplicate_permission(err: &ClientError) -> bool {
    err.has_code(INVALID_PERMISSION_DUPLICATE)
}

pub fn is_permission_not_found(err: &ClientError) -> bool {
    err.has_code(INVALID_PERMISSION_NOT_FOUND)
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub key: String,
    pub value: String,
}

/// A security group as reported by the provider
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityGroupDescription {
    pub group_id: String,
    pub group_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub owner_id: String,
    #[serde(default)]
    pub vpc_id: Option<String>,
    #[serde(default)]
    pub ip_permissions: Vec<IpPermission>,
    #[serde(default)]
    pub ip_permissions_egress: Vec<IpPermission>,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

impl SecurityGroupDescription {
    pub fn tag_map(&self) -> BTreeMap<String, String> {
        self.tags
            .iter()
            .map(|t| (t.key.clone(), t.value.clone()))
            .collect()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSecurityGroupRequest {
    pub group_name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vpc_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Tag>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DescribeSecurityGroupsResponse {
    #[serde(default)]
    security_groups: Vec<SecurityGroupDescription>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateSecurityGroupResponse {
    group_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PermissionsBody<'a> {
    ip_permissions: &'a [IpPermission],
}

#[derive(Debug, Serialize)]
struct TagsBody<'a> {
    tags: &'a [Tag],
}

#[derive(Debug, Serialize)]
struct TagKeysBody<'a> {
    keys: &'a [String],
}

/// Direction of a rule change
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RuleDirection {
    Ingress,
    Egress,
}

impl RuleDirection {
    fn segment(self) -> &'static str {
        match self {
            RuleDirection::Ingress => "ingress",
            RuleDirection::Egress => "egress",
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SecurityGroupApi: Send + Sync {
    /// Look up a group by id; the provider may report several matches
    async fn describe_security_groups(
        &self,
        region: &str,
        group_id: &str,
    ) -> Result<Vec<SecurityGroupDescription>, ClientError>;

    /// Create a group and return its id
    async fn create_security_group(
        &self,
        region: &str,
        request: &CreateSecurityGroupRequest,
    ) -> Result<String, ClientError>;

    async fn authorize_rules(
        &self,
        region: &str,
        group_id: &str,
        direction: RuleDirection,
        rules: &[IpPermission],
    ) -> Result<(), ClientError>;

    async fn revoke_rules(
        &self,
        region: &str,
        group_id: &str,
        direction: RuleDirection,
        rules: &[IpPermission],
    ) -> Result<(), ClientError>;

    async fn create_tags(&self, region: &str, group_id: &str, tags: &[Tag])
        -> Result<(), ClientError>;

    async fn delete_tags(&self, region: &str, group_id: &str, keys: &[String])
        -> Result<(), ClientError>;

    async fn delete_security_group(&self, region: &str, group_id: &str)
        -> Result<(), ClientError>;
}

const SECURITY_GROUPS: [&str; 3] = ["v1", "ec2", "security-groups"];

fn group_path<'a>(group_id: &'a str, rest: &[&'a str]) -> Vec<&'a str> {
    let mut path: Vec<&'a str> = SECURITY_GROUPS.to_vec();
    path.push(group_id);
    path.extend_from_slice(rest);
    path
}

#[async_trait]
impl SecurityGroupApi for ProviderClient {
    #[instrument(skip(self))]
    async fn describe_security_groups(
        &self,
        region: &str,
        group_id: &str,
    ) -> Result<Vec<SecurityGroupDescription>, ClientError> {
        let response: DescribeSecurityGroupsResponse = self
            .get_json(Some(region), &group_path(group_id, &[]))
            .await?;
        Ok(response.security_groups)
    }

    #[instrument(skip(self, request), fields(group_name = %request.group_name))]
    async fn create_security_group(
        &self,
        region: &str,
        request: &CreateSecurityGroupRequest,
    ) -> Result<String, ClientError> {
        let response: CreateSecurityGroupResponse = self
            .send_json(Some(region), Method::POST, &SECURITY_GROUPS, request)
            .await?;
        Ok(response.group_id)
    }

    #[instrument(skip(self, rules), fields(rules = rules.len()))]
    async fn authorize_rules(
        &self,
        region: &str,
        group_id: &str,
        direction: RuleDirection,
        rules: &[IpPermission],
    ) -> Result<(), ClientError> {
        self.send_unit(
            Some(region),
            Method::POST,
            &group_path(group_id, &[direction.segment(), "authorize"]),
            &PermissionsBody {
                ip_permissions: rules,
            },
        )
        .await
    }

    #[instrument(skip(self, rules), fields(rules = rules.len()))]
    async fn revoke_rules(
        &self,
        region: &str,
        group_id: &str,
        direction: RuleDirection,
        rules: &[IpPermission],
    ) -> Result<(), ClientError> {
        self.send_unit(
            Some(region),
            Method::POST,
            &group_path(group_id, &[direction.segment(), "revoke"]),
            &PermissionsBody {
                ip_permissions: rules,
            },
        )
        .await
    }

    #[instrument(skip(self, tags))]
    async fn create_tags(
        &self,
        region: &str,
        group_id: &str,
        tags: &[Tag],
    ) -> Result<(), ClientError> {
        self.send_unit(
            Some(region),
            Method::PUT,
            &group_path(group_id, &["tags"]),
            &TagsBody { tags },
        )
        .await
    }

    #[instrument(skip(self))]
    async fn delete_tags(
        &self,
        region: &str,
        group_id: &str,
        keys: &[String],
    ) -> Result<(), ClientError> {
        self.send_unit(
            Some(region),
            Method::POST,
            &group_path(group_id, &["tags", "delete"]),
            &TagKeysBody { keys },
        )
        .await
    }

    #[instrument(skip(self))]
    async fn delete_security_group(
        &self,
        region: &str,
        group_id: &str,
    ) -> Result<(), ClientError> {
        self.delete(Some(region), &group_path(group_id, &[])).await
    }
}
