//! Provider service APIs
//!
//! One trait per provider service, implemented for [`ProviderClient`] over
//! the gateway routes. Controllers depend on the traits so they can be
//! exercised against mocks.
//!
//! [`ProviderClient`]: crate::client::ProviderClient

pub mod cloudformation;
pub mod ec2;
pub mod elasticsearch;
pub mod iam;
