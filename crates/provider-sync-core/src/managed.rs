//! The managed resource contract

use std::collections::BTreeMap;
use std::fmt::Debug;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::condition::{set_condition, Condition};

/// Secret material minted at creation time, keyed by secret data key
pub type ConnectionDetails = BTreeMap<String, Vec<u8>>;

/// Connection secret key for the principal (e.g. access key id)
pub const CONNECTION_USERNAME_KEY: &str = "username";
/// Connection secret key for the credential (e.g. secret access key)
pub const CONNECTION_PASSWORD_KEY: &str = "password";
/// Connection secret key for a service endpoint
pub const CONNECTION_ENDPOINT_KEY: &str = "endpoint";

/// What happens to the external resource when the managed resource is deleted
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum DeletionPolicy {
    /// Delete the external resource
    #[default]
    Delete,
    /// Leave the external resource in place
    Orphan,
}

/// A desired/observed pair reconciled against a remote provider
///
/// Implementations own the storage of the external name, the desired
/// parameters, the last observation and the status conditions. The engine
/// only mutates the value it is handed; persisting it is the driver's job.
pub trait Managed: Send + Sync {
    /// Desired provider parameters (`spec.forProvider`)
    type Parameters: Clone + PartialEq + Debug + Send + Sync;
    /// Observed provider attributes (`status.atProvider`)
    type Observation: Send + Sync;

    fn parameters(&self) -> &Self::Parameters;

    fn parameters_mut(&mut self) -> &mut Self::Parameters;

    fn set_observation(&mut self, observation: Self::Observation);

    /// Provider-assigned identifier; `None` until the resource is created
    fn external_name(&self) -> Option<&str>;

    fn set_external_name(&mut self, name: &str);

    fn conditions(&self) -> &[Condition];

    fn conditions_mut(&mut self) -> &mut Vec<Condition>;

    fn set_condition(&mut self, condition: Condition) {
        set_condition(self.conditions_mut(), condition);
    }

    fn deletion_policy(&self) -> DeletionPolicy {
        DeletionPolicy::Delete
    }
}
