//! Kubernetes-style status conditions for managed resources

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Condition types tracked on every managed resource
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ConditionType {
    /// Whether the external resource is usable
    Ready,
    /// Whether the last reconciliation pass succeeded
    Synced,
}

/// Machine-readable reasons for the two condition types
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ConditionReason {
    Available,
    Unavailable,
    Creating,
    Deleting,
    ReconcileSuccess,
    ReconcileError,
}

impl fmt::Display for ConditionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Kubernetes-style condition
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition ("Ready" or "Synced")
    #[serde(rename = "type")]
    pub type_: ConditionType,
    /// Status: "True", "False", or "Unknown"
    pub status: String,
    /// Last time the condition transitioned
    pub last_transition_time: String,
    /// Machine-readable reason for the condition
    pub reason: ConditionReason,
    /// Human-readable message
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

impl Condition {
    fn new(type_: ConditionType, status: bool, reason: ConditionReason, message: &str) -> Self {
        Self {
            type_,
            status: if status { "True" } else { "False" }.to_string(),
            last_transition_time: chrono::Utc::now().to_rfc3339(),
            reason,
            message: message.to_string(),
        }
    }

    /// The external resource exists and matches the desired state
    pub fn available() -> Self {
        Self::new(ConditionType::Ready, true, ConditionReason::Available, "")
    }

    /// The external resource exists but reports itself unusable
    pub fn unavailable() -> Self {
        Self::new(ConditionType::Ready, false, ConditionReason::Unavailable, "")
    }

    /// Creation of the external resource was attempted
    pub fn creating() -> Self {
        Self::new(ConditionType::Ready, false, ConditionReason::Creating, "")
    }

    /// Deletion of the external resource was requested
    pub fn deleting() -> Self {
        Self::new(ConditionType::Ready, false, ConditionReason::Deleting, "")
    }

    pub fn reconcile_success() -> Self {
        Self::new(
            ConditionType::Synced,
            true,
            ConditionReason::ReconcileSuccess,
            "",
        )
    }

    pub fn reconcile_error(err: &dyn std::error::Error) -> Self {
        Self::new(
            ConditionType::Synced,
            false,
            ConditionReason::ReconcileError,
            &err.to_string(),
        )
    }

    pub fn is_true(&self) -> bool {
        self.status == "True"
    }

    /// Same type, status, reason and message; timestamps are ignored
    pub fn equivalent(&self, other: &Condition) -> bool {
        self.type_ == other.type_
            && self.status == other.status
            && self.reason == other.reason
            && self.message == other.message
    }
}

/// Replace the condition of the same type, keeping the transition time when
/// nothing but the timestamp changed
pub fn set_condition(conditions: &mut Vec<Condition>, condition: Condition) {
    match conditions.iter_mut().find(|c| c.type_ == condition.type_) {
        Some(existing) if existing.equivalent(&condition) => {}
        Some(existing) => *existing = condition,
        None => conditions.push(condition),
    }
}
