//! AccessKey controller
//!
//! The secret access key is only returned when the key is minted, so it is
//! published as connection details from create and never observed again.

use std::sync::Arc;

use async_trait::async_trait;
use provider_sync_core::{
    late_init, Adapter, CallContext, Condition, ConnectionDetails, Created, DiffError, Differ,
    Lifecycle, Patch, Reconciler, CONNECTION_PASSWORD_KEY, CONNECTION_USERNAME_KEY,
};

use crate::client::ClientError;
use crate::crd::{AccessKey, AccessKeyObservation, AccessKeyParameters, AccessKeyStatusType};
use crate::services::iam::{self, AccessKeyApi, AccessKeyMetadata};

use super::{run_managed, ControllerContext};

#[derive(Clone, Debug, PartialEq)]
pub enum AccessKeyChange {
    SetStatus(AccessKeyStatusType),
}

pub struct AccessKeyAdapter {
    api: Arc<dyn AccessKeyApi>,
}

impl AccessKeyAdapter {
    pub fn new(api: Arc<dyn AccessKeyApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl Adapter for AccessKeyAdapter {
    const KIND: &'static str = "AccessKey";

    type Parameters = AccessKeyParameters;
    type State = AccessKeyMetadata;
    type Change = AccessKeyChange;
    type Error = ClientError;

    /// Keys can only be listed per user; the external name picks one out
    async fn describe(
        &self,
        _ctx: &CallContext,
        external_name: &str,
        params: &AccessKeyParameters,
    ) -> Result<Vec<AccessKeyMetadata>, ClientError> {
        let keys = self.api.list_access_keys(&params.user_name).await?;
        Ok(keys
            .into_iter()
            .filter(|key| key.access_key_id == external_name)
            .collect())
    }

    async fn create(
        &self,
        _ctx: &CallContext,
        params: &AccessKeyParameters,
    ) -> Result<Created, ClientError> {
        let key = self.api.create_access_key(&params.user_name).await?;
        let details = ConnectionDetails::from([
            (
                CONNECTION_USERNAME_KEY.to_string(),
                key.access_key_id.clone().into_bytes(),
            ),
            (
                CONNECTION_PASSWORD_KEY.to_string(),
                key.secret_access_key.into_bytes(),
            ),
        ]);
        Ok(Created::new(key.access_key_id).with_connection_details(details))
    }

    async fn apply_change(
        &self,
        _ctx: &CallContext,
        external_name: &str,
        params: &AccessKeyParameters,
        change: &AccessKeyChange,
    ) -> Result<(), ClientError> {
        match change {
            AccessKeyChange::SetStatus(status) => {
                self.api
                    .update_access_key(&params.user_name, external_name, *status)
                    .await
            }
        }
    }

    async fn delete(
        &self,
        _ctx: &CallContext,
        external_name: &str,
        params: &AccessKeyParameters,
    ) -> Result<(), ClientError> {
        self.api
            .delete_access_key(&params.user_name, external_name)
            .await
    }

    fn is_not_found(&self, err: &ClientError) -> bool {
        iam::is_no_such_entity(err)
    }
}

pub struct AccessKeyDiffer;

impl Differ for AccessKeyDiffer {
    type Parameters = AccessKeyParameters;
    type State = AccessKeyMetadata;
    type Observation = AccessKeyObservation;
    type Change = AccessKeyChange;

    fn late_initialize(&self, desired: &mut AccessKeyParameters, observed: &AccessKeyMetadata) {
        late_init(&mut desired.status, Some(&observed.status));
    }

    fn is_up_to_date(
        &self,
        desired: &AccessKeyParameters,
        observed: &AccessKeyMetadata,
    ) -> Result<bool, DiffError> {
        Ok(desired.status.map_or(true, |status| status == observed.status))
    }

    fn patch(
        &self,
        observed: &AccessKeyMetadata,
        desired: &AccessKeyParameters,
    ) -> Patch<AccessKeyChange> {
        match desired.status {
            Some(status) if status != observed.status => {
                vec![AccessKeyChange::SetStatus(status)].into()
            }
            _ => Patch::new(),
        }
    }

    fn observation(&self, observed: &AccessKeyMetadata) -> AccessKeyObservation {
        AccessKeyObservation {
            access_key_id: observed.access_key_id.clone(),
            status: observed.status,
            create_date: observed.create_date.clone(),
        }
    }

    /// Follows the provider's key status, not the desired one
    fn readiness(&self, observed: &AccessKeyMetadata, _up_to_date: bool) -> Option<Condition> {
        Some(match observed.status {
            AccessKeyStatusType::Active => Condition::available(),
            AccessKeyStatusType::Inactive => Condition::unavailable(),
        })
    }
}

pub fn reconciler(api: Arc<dyn AccessKeyApi>) -> Reconciler<AccessKey> {
    Reconciler::new(Arc::new(Lifecycle::new(
        AccessKeyAdapter::new(api),
        AccessKeyDiffer,
    )))
}

/// Start the AccessKey controller
pub async fn run(shared: Arc<ControllerContext>, api: Arc<dyn AccessKeyApi>) {
    run_managed::<AccessKey>(shared, reconciler(api)).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SecretReference;
    use crate::controllers::test_support::RecordingPersister;
    use crate::crd::AccessKeySpec;
    use crate::services::iam::{MockAccessKeyApi, NewAccessKey};
    use provider_sync_core::{ConditionReason, DeletionPolicy, Managed, PassOutcome};

    fn metadata(id: &str, status: AccessKeyStatusType) -> AccessKeyMetadata {
        AccessKeyMetadata {
            access_key_id: id.to_string(),
            user_name: "ci-bot".to_string(),
            status,
            create_date: Some("2024-01-01T00:00:00Z".to_string()),
        }
    }

    fn access_key(external_name: Option<&str>, status: Option<AccessKeyStatusType>) -> AccessKey {
        let mut key = AccessKey::new(
            "ci-bot",
            AccessKeySpec {
                deletion_policy: DeletionPolicy::Delete,
                write_connection_secret_to_ref: Some(SecretReference {
                    name: "ci-key".to_string(),
                    namespace: "ci".to_string(),
                }),
                for_provider: AccessKeyParameters {
                    user_name: "ci-bot".to_string(),
                    status,
                },
            },
        );
        if let Some(name) = external_name {
            key.set_external_name(name);
        }
        key
    }

    #[tokio::test]
    async fn test_pass_creates_key_and_publishes_secret() {
        let mut api = MockAccessKeyApi::new();
        api.expect_create_access_key()
            .withf(|user| user == "ci-bot")
            .times(1)
            .returning(|_| {
                Ok(NewAccessKey {
                    access_key_id: "AKIA1".to_string(),
                    secret_access_key: "s3cr3t".to_string(),
                    status: AccessKeyStatusType::Active,
                })
            });

        let persister = RecordingPersister::default();
        let mut key = access_key(None, None);
        let outcome = reconciler(Arc::new(api))
            .run_pass(&CallContext::new(), &mut key, &persister, false)
            .await
            .unwrap();

        assert_eq!(outcome, PassOutcome::Created);
        assert_eq!(key.external_name(), Some("AKIA1"));
        assert_eq!(
            persister.calls(),
            vec![
                "status".to_string(),
                "external_name AKIA1".to_string(),
                "secret password,username".to_string(),
                "status".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_observe_picks_key_by_id_and_late_inits_status() {
        let mut api = MockAccessKeyApi::new();
        api.expect_list_access_keys().returning(|_| {
            Ok(vec![
                metadata("AKIA0", AccessKeyStatusType::Active),
                metadata("AKIA1", AccessKeyStatusType::Inactive),
            ])
        });

        let lifecycle = Lifecycle::new(AccessKeyAdapter::new(Arc::new(api)), AccessKeyDiffer);
        let mut key = access_key(Some("AKIA1"), None);
        let observation =
            provider_sync_core::ExternalClient::observe(&lifecycle, &CallContext::new(), &mut key)
                .await
                .unwrap();

        assert!(observation.resource_exists);
        assert!(observation.resource_up_to_date);
        assert!(observation.resource_late_initialized);
        assert_eq!(
            key.spec.for_provider.status,
            Some(AccessKeyStatusType::Inactive)
        );
        assert_eq!(key.conditions()[0].reason, ConditionReason::Unavailable);
    }

    #[tokio::test]
    async fn test_observe_unknown_key_is_absent() {
        let mut api = MockAccessKeyApi::new();
        api.expect_list_access_keys()
            .returning(|_| Ok(vec![metadata("AKIA0", AccessKeyStatusType::Active)]));

        let lifecycle = Lifecycle::new(AccessKeyAdapter::new(Arc::new(api)), AccessKeyDiffer);
        let mut key = access_key(Some("AKIA9"), None);
        let observation =
            provider_sync_core::ExternalClient::observe(&lifecycle, &CallContext::new(), &mut key)
                .await
                .unwrap();
        assert!(!observation.resource_exists);
    }

    #[tokio::test]
    async fn test_pass_deactivates_key() {
        let mut api = MockAccessKeyApi::new();
        api.expect_list_access_keys()
            .returning(|_| Ok(vec![metadata("AKIA1", AccessKeyStatusType::Active)]));
        api.expect_update_access_key()
            .withf(|user, id, status| {
                user == "ci-bot" && id == "AKIA1" && *status == AccessKeyStatusType::Inactive
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let persister = RecordingPersister::default();
        let mut key = access_key(Some("AKIA1"), Some(AccessKeyStatusType::Inactive));
        let outcome = reconciler(Arc::new(api))
            .run_pass(&CallContext::new(), &mut key, &persister, false)
            .await
            .unwrap();

        assert_eq!(outcome, PassOutcome::Updated);
        // Readiness reflects the provider until the change is observed
        assert_eq!(key.conditions()[0].reason, ConditionReason::Available);
    }

    #[tokio::test]
    async fn test_delete_for_missing_user_succeeds() {
        let mut api = MockAccessKeyApi::new();
        api.expect_list_access_keys()
            .returning(|_| Ok(vec![metadata("AKIA1", AccessKeyStatusType::Active)]));
        api.expect_delete_access_key()
            .times(1)
            .returning(|_, _| Err(ClientError::api(404, iam::NO_SUCH_ENTITY, "no user")));

        let persister = RecordingPersister::default();
        let mut key = access_key(Some("AKIA1"), None);
        let outcome = reconciler(Arc::new(api))
            .run_pass(&CallContext::new(), &mut key, &persister, true)
            .await
            .unwrap();
        assert_eq!(outcome, PassOutcome::Deleted);
    }

    #[test]
    fn test_patch_only_when_status_differs() {
        let observed = metadata("AKIA1", AccessKeyStatusType::Active);
        let mut desired = AccessKeyParameters {
            user_name: "ci-bot".to_string(),
            status: None,
        };
        assert!(AccessKeyDiffer.patch(&observed, &desired).is_empty());

        desired.status = Some(AccessKeyStatusType::Active);
        assert!(AccessKeyDiffer.patch(&observed, &desired).is_empty());

        desired.status = Some(AccessKeyStatusType::Inactive);
        assert_eq!(AccessKeyDiffer.patch(&observed, &desired).len(), 1);
        assert!(!AccessKeyDiffer.is_up_to_date(&desired, &observed).unwrap());
    }
}
