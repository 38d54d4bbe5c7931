//! Provider capability interface
//!
//! An adapter exposes the handful of resource-shaped verbs the lifecycle
//! engine needs and hides provider-specific error encodings behind two
//! classifiers.

use std::error::Error as StdError;
use std::fmt::Debug;

use async_trait::async_trait;

use crate::context::CallContext;
use crate::managed::ConnectionDetails;

/// Result of a successful create call
#[derive(Debug, Clone, Default)]
pub struct Created {
    /// Identifier assigned by the provider
    pub external_name: String,
    /// One-time secret material returned by the provider
    pub connection_details: ConnectionDetails,
}

impl Created {
    pub fn new(external_name: impl Into<String>) -> Self {
        Self {
            external_name: external_name.into(),
            connection_details: ConnectionDetails::new(),
        }
    }

    pub fn with_connection_details(mut self, details: ConnectionDetails) -> Self {
        self.connection_details = details;
        self
    }
}

/// Remote provider operations for one resource type
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Resource kind used in error messages and logs
    const KIND: &'static str;

    /// Desired parameters of the resource
    type Parameters: Send + Sync;
    /// Provider-native observed state
    type State: Send + Sync;
    /// A single patch fragment applied by [`Adapter::apply_change`]
    type Change: Debug + Send + Sync;
    /// Provider error
    type Error: StdError + Send + Sync + 'static;

    /// Look up the resource by its external name
    ///
    /// Returns every match; the engine treats zero as absent and more than
    /// one as a structural inconsistency.
    async fn describe(
        &self,
        ctx: &CallContext,
        external_name: &str,
        params: &Self::Parameters,
    ) -> Result<Vec<Self::State>, Self::Error>;

    async fn create(
        &self,
        ctx: &CallContext,
        params: &Self::Parameters,
    ) -> Result<Created, Self::Error>;

    async fn apply_change(
        &self,
        ctx: &CallContext,
        external_name: &str,
        params: &Self::Parameters,
        change: &Self::Change,
    ) -> Result<(), Self::Error>;

    async fn delete(
        &self,
        ctx: &CallContext,
        external_name: &str,
        params: &Self::Parameters,
    ) -> Result<(), Self::Error>;

    /// Whether `err` means the resource does not exist
    fn is_not_found(&self, err: &Self::Error) -> bool;

    /// Whether `err` is an expected concurrent-mutation race for `change`
    fn is_tolerable(&self, _change: &Self::Change, _err: &Self::Error) -> bool {
        false
    }
}
