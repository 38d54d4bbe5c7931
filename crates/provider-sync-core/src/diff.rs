//! Late initialization, convergence checks and patch computation
//!
//! Everything here is pure: no provider calls, no mutation beyond the
//! desired parameters handed to [`Differ::late_initialize`].

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

use crate::condition::Condition;
use crate::managed::ConnectionDetails;

/// The comparison between desired and observed state could not be computed
#[derive(Debug, Error)]
#[error("{0}")]
pub struct DiffError(pub String);

impl DiffError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// How the engine treats a [`DiffError`] from [`Differ::is_up_to_date`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffErrorPolicy {
    /// Fail the observation; the operator must fix the stored configuration
    Propagate,
    /// Log and report the resource as not converged so an update is issued
    NotConverged,
}

/// Ordered list of patch fragments, each applied by one provider call
#[derive(Debug, Clone, PartialEq)]
pub struct Patch<C> {
    changes: Vec<C>,
}

impl<C> Default for Patch<C> {
    fn default() -> Self {
        Self {
            changes: Vec::new(),
        }
    }
}

impl<C> Patch<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, change: C) {
        self.changes.push(change);
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, C> {
        self.changes.iter()
    }
}

impl<C> From<Vec<C>> for Patch<C> {
    fn from(changes: Vec<C>) -> Self {
        Self { changes }
    }
}

impl<C> IntoIterator for Patch<C> {
    type Item = C;
    type IntoIter = std::vec::IntoIter<C>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.into_iter()
    }
}

/// Resource-specific comparison strategy
pub trait Differ: Send + Sync {
    type Parameters;
    type State;
    type Observation;
    type Change;

    /// Policy applied when [`Differ::is_up_to_date`] fails
    const ERROR_POLICY: DiffErrorPolicy = DiffErrorPolicy::Propagate;

    /// Copy observed values into unset desired fields; set fields are never touched
    fn late_initialize(&self, desired: &mut Self::Parameters, observed: &Self::State);

    /// Whether the observed state already matches the desired parameters
    fn is_up_to_date(
        &self,
        desired: &Self::Parameters,
        observed: &Self::State,
    ) -> Result<bool, DiffError>;

    /// Patch fragments that move `observed` towards `desired`
    fn patch(&self, observed: &Self::State, desired: &Self::Parameters) -> Patch<Self::Change>;

    /// Attributes recorded under `status.atProvider`
    fn observation(&self, observed: &Self::State) -> Self::Observation;

    /// Ready condition for an observed resource
    ///
    /// The default reports `Available` once converged and leaves the prior
    /// condition untouched otherwise.
    fn readiness(&self, _observed: &Self::State, up_to_date: bool) -> Option<Condition> {
        up_to_date.then(Condition::available)
    }

    /// Connection details published on every pass where the resource exists
    fn connection_details(&self, _observed: &Self::State) -> ConnectionDetails {
        ConnectionDetails::new()
    }

    /// Changes that must follow every successful create
    fn corrections(&self, _desired: &Self::Parameters) -> Vec<Self::Change> {
        Vec::new()
    }
}

/// Fill an unset optional field from the observed value
pub fn late_init<T: Clone>(desired: &mut Option<T>, observed: Option<&T>) {
    if desired.is_none() {
        *desired = observed.cloned();
    }
}

/// Fill an empty list from the observed list
pub fn late_init_vec<T: Clone>(desired: &mut Vec<T>, observed: &[T]) {
    if desired.is_empty() {
        desired.extend_from_slice(observed);
    }
}

/// Fill an empty map from the observed map
pub fn late_init_map<K: Ord + Clone, V: Clone>(
    desired: &mut BTreeMap<K, V>,
    observed: &BTreeMap<K, V>,
) {
    if desired.is_empty() {
        desired.extend(observed.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
}

/// Compare two lists regardless of order or duplicates
pub fn equal_as_sets<T: Ord>(a: &[T], b: &[T]) -> bool {
    let a: BTreeSet<&T> = a.iter().collect();
    let b: BTreeSet<&T> = b.iter().collect();
    a == b
}

/// Tags to add (new keys or changed values) and tag keys to remove
pub fn diff_tags(
    desired: &BTreeMap<String, String>,
    observed: &BTreeMap<String, String>,
) -> (BTreeMap<String, String>, Vec<String>) {
    let add = desired
        .iter()
        .filter(|(k, v)| observed.get(*k) != Some(*v))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    let remove = observed
        .keys()
        .filter(|k| !desired.contains_key(*k))
        .cloned()
        .collect();
    (add, remove)
}
