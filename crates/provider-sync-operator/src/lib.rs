//! provider-sync-operator: Kubernetes controllers that keep cloud resources in
//! line with their managed resource spec

pub mod client;
pub mod config;
pub mod controllers;
pub mod crd;
pub mod health;
pub mod services;

pub use client::ProviderClient;
pub use config::ProviderConfig;
