//! CloudFormation stack API

use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::client::{ClientError, ProviderClient};

pub const STACK_INSTANCE_NOT_FOUND: &str = "StackInstanceNotFoundException";
pub const VALIDATION_ERROR: &str = "ValidationError";

/// Capability acknowledged on every create and update
pub const CAPABILITY_IAM: &str = "CAPABILITY_IAM";

/// Terminal status of a deleted stack; such stacks are still listed
pub const DELETE_COMPLETE: &str = "DELETE_COMPLETE";

/// The stack does not exist
///
/// Describing an unknown stack id is reported as a validation error.
pub fn is_stack_not_found(err: &ClientError) -> bool {
    err.has_code(STACK_INSTANCE_NOT_FOUND)
        || (err.has_code(VALIDATION_ERROR)
            && err.message().is_some_and(|m| m.contains("does not exist")))
}

/// An update that would not change anything
pub fn is_no_op_update(err: &ClientError) -> bool {
    err.has_code(VALIDATION_ERROR)
        && err
            .message()
            .is_some_and(|m| m.contains("No updates are to be performed"))
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackParameter {
    pub parameter_key: String,
    pub parameter_value: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackOutput {
    pub output_key: String,
    pub output_value: String,
}

/// A stack as reported by the provider
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackDescription {
    pub stack_id: String,
    pub stack_name: String,
    pub stack_status: String,
    #[serde(default)]
    pub stack_status_reason: Option<String>,
    #[serde(default)]
    pub parameters: Vec<StackParameter>,
    #[serde(default)]
    pub outputs: Vec<StackOutput>,
}

impl StackDescription {
    pub fn parameter_map(&self) -> BTreeMap<String, String> {
        self.parameters
            .iter()
            .map(|p| (p.parameter_key.clone(), p.parameter_value.clone()))
            .collect()
    }

    pub fn output_map(&self) -> BTreeMap<String, String> {
        self.outputs
            .iter()
            .map(|o| (o.output_key.clone(), o.output_value.clone()))
            .collect()
    }
}

/// Template and parameters sent on create and update
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackTemplate {
    pub template_body: String,
    #[serde(default)]
    pub parameters: Vec<StackParameter>,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

impl StackTemplate {
    /// Build a request body; parameters with empty values are dropped
    pub fn new(template_body: &str, parameters: &BTreeMap<String, String>) -> Self {
        Self {
            template_body: template_body.to_string(),
            parameters: non_empty_parameters(parameters)
                .map(|(k, v)| StackParameter {
                    parameter_key: k.clone(),
                    parameter_value: v.clone(),
                })
                .collect(),
            capabilities: vec![CAPABILITY_IAM.to_string()],
        }
    }
}

pub fn non_empty_parameters(
    parameters: &BTreeMap<String, String>,
) -> impl Iterator<Item = (&String, &String)> {
    parameters.iter().filter(|(_, v)| !v.is_empty())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateStackBody<'a> {
    stack_name: &'a str,
    #[serde(flatten)]
    template: &'a StackTemplate,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateStackResponse {
    stack_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DescribeStacksResponse {
    #[serde(default)]
    stacks: Vec<StackDescription>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetTemplateResponse {
    template_body: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StackApi: Send + Sync {
    /// Create a stack and return its id
    async fn create_stack(
        &self,
        region: &str,
        stack_name: &str,
        template: &StackTemplate,
    ) -> Result<String, ClientError>;

    async fn describe_stacks(
        &self,
        region: &str,
        stack_id: &str,
    ) -> Result<Vec<StackDescription>, ClientError>;

    async fn get_template(&self, region: &str, stack_id: &str) -> Result<String, ClientError>;

    async fn update_stack(
        &self,
        region: &str,
        stack_id: &str,
        template: &StackTemplate,
    ) -> Result<(), ClientError>;

    async fn delete_stack(&self, region: &str, stack_id: &str) -> Result<(), ClientError>;
}

#[async_trait]
impl StackApi for ProviderClient {
    #[instrument(skip(self, template))]
    async fn create_stack(
        &self,
        region: &str,
        stack_name: &str,
        template: &StackTemplate,
    ) -> Result<String, ClientError> {
        let response: CreateStackResponse = self
            .send_json(
                Some(region),
                Method::POST,
                &["v1", "cloudformation", "stacks"],
                &CreateStackBody {
                    stack_name,
                    template,
                },
            )
            .await?;
        Ok(response.stack_id)
    }

    #[instrument(skip(self))]
    async fn describe_stacks(
        &self,
        region: &str,
        stack_id: &str,
    ) -> Result<Vec<StackDescription>, ClientError> {
        let response: DescribeStacksResponse = self
            .get_json(Some(region), &["v1", "cloudformation", "stacks", stack_id])
            .await?;
        Ok(response.stacks)
    }

    #[instrument(skip(self))]
    async fn get_template(&self, region: &str, stack_id: &str) -> Result<String, ClientError> {
        let response: GetTemplateResponse = self
            .get_json(
                Some(region),
                &["v1", "cloudformation", "stacks", stack_id, "template"],
            )
            .await?;
        Ok(response.template_body)
    }

    #[instrument(skip(self, template))]
    async fn update_stack(
        &self,
        region: &str,
        stack_id: &str,
        template: &StackTemplate,
    ) -> Result<(), ClientError> {
        self.send_unit(
            Some(region),
            Method::PUT,
            &["v1", "cloudformation", "stacks", stack_id],
            template,
        )
        .await
    }

    #[instrument(skip(self))]
    async fn delete_stack(&self, region: &str, stack_id: &str) -> Result<(), ClientError> {
        self.delete(Some(region), &["v1", "cloudformation", "stacks", stack_id])
            .await
    }
}
