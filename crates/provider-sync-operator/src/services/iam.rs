//! IAM access key API
//!
//! IAM is global, so requests carry no region.

use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::client::{ClientError, ProviderClient};
use crate::crd::AccessKeyStatusType;

/// The user or key does not exist
pub const NO_SUCH_ENTITY: &str = "NoSuchEntity";

pub fn is_no_such_entity(err: &ClientError) -> bool {
    err.has_code(NO_SUCH_ENTITY)
}

/// Key metadata; never contains the secret
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessKeyMetadata {
    pub access_key_id: String,
    pub user_name: String,
    pub status: AccessKeyStatusType,
    #[serde(default)]
    pub create_date: Option<String>,
}

/// A freshly minted key; the only time the secret is returned
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAccessKey {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub status: AccessKeyStatusType,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListAccessKeysResponse {
    #[serde(default)]
    access_key_metadata: Vec<AccessKeyMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateAccessKeyResponse {
    access_key: NewAccessKey,
}

#[derive(Debug, Serialize)]
struct UpdateAccessKeyBody {
    status: AccessKeyStatusType,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AccessKeyApi: Send + Sync {
    async fn list_access_keys(&self, user_name: &str)
        -> Result<Vec<AccessKeyMetadata>, ClientError>;

    async fn create_access_key(&self, user_name: &str) -> Result<NewAccessKey, ClientError>;

    async fn update_access_key(
        &self,
        user_name: &str,
        access_key_id: &str,
        status: AccessKeyStatusType,
    ) -> Result<(), ClientError>;

    async fn delete_access_key(&self, user_name: &str, access_key_id: &str)
        -> Result<(), ClientError>;
}

#[async_trait]
impl AccessKeyApi for ProviderClient {
    #[instrument(skip(self))]
    async fn list_access_keys(
        &self,
        user_name: &str,
    ) -> Result<Vec<AccessKeyMetadata>, ClientError> {
        let response: ListAccessKeysResponse = self
            .get_json(None, &["v1", "iam", "users", user_name, "access-keys"])
            .await?;
        Ok(response.access_key_metadata)
    }

    #[instrument(skip(self))]
    async fn create_access_key(&self, user_name: &str) -> Result<NewAccessKey, ClientError> {
        let response: CreateAccessKeyResponse = self
            .send_json(
                None,
                Method::POST,
                &["v1", "iam", "users", user_name, "access-keys"],
                &serde_json::json!({}),
            )
            .await?;
        Ok(response.access_key)
    }

    #[instrument(skip(self))]
    async fn update_access_key(
        &self,
        user_name: &str,
        access_key_id: &str,
        status: AccessKeyStatusType,
    ) -> Result<(), ClientError> {
        self.send_unit(
            None,
            Method::PUT,
            &["v1", "iam", "users", user_name, "access-keys", access_key_id],
            &UpdateAccessKeyBody { status },
        )
        .await
    }

    #[instrument(skip(self))]
    async fn delete_access_key(
        &self,
        user_name: &str,
        access_key_id: &str,
    ) -> Result<(), ClientError> {
        self.delete(
            None,
            &["v1", "iam", "users", user_name, "access-keys", access_key_id],
        )
        .await
    }
}
