//! Generic lifecycle engine for externally managed resources
//!
//! A managed resource pairs a desired spec with the observed state of its
//! counterpart in a remote provider. This crate converges the two:
//!
//! - [`Adapter`] - resource-shaped verbs against the provider (describe, create,
//!   apply a change, delete) plus a not-found classifier
//! - [`Differ`] - pure late-initialization, up-to-date and patch computation
//! - [`Lifecycle`] - the four-phase engine (observe, create, update, delete)
//!   built from an adapter and a differ, exposed through [`ExternalClient`]
//! - [`Reconciler`] - one reconciliation pass: observe, then at most one
//!   mutating verb, then status persistence through a [`Persister`]
//!
//! # Example
//!
//! ```ignore
//! use provider_sync_core::{CallContext, Lifecycle, Reconciler};
//!
//! let lifecycle = Lifecycle::new(adapter, differ);
//! let reconciler = Reconciler::new(std::sync::Arc::new(lifecycle));
//! let outcome = reconciler
//!     .run_pass(&CallContext::new(), &mut resource, &persister, false)
//!     .await?;
//! ```

mod adapter;
mod condition;
mod context;
mod diff;
mod error;
mod lifecycle;
mod managed;
mod persist;
mod reconciler;

pub mod retry;

// Re-exports
pub use adapter::{Adapter, Created};
pub use condition::{set_condition, Condition, ConditionReason, ConditionType};
pub use context::CallContext;
pub use diff::{
    diff_tags, equal_as_sets, late_init, late_init_map, late_init_vec, DiffError,
    DiffErrorPolicy, Differ, Patch,
};
pub use error::{BoxedError, ErrorKind, Operation, ReconcileError};
pub use lifecycle::{
    ExternalClient, ExternalCreation, ExternalObservation, ExternalUpdate, Lifecycle,
};
pub use managed::{
    ConnectionDetails, DeletionPolicy, Managed, CONNECTION_ENDPOINT_KEY, CONNECTION_PASSWORD_KEY,
    CONNECTION_USERNAME_KEY,
};
pub use persist::{PersistError, Persister};
pub use reconciler::{PassOutcome, Reconciler};
