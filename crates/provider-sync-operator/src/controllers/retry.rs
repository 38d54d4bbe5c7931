//! Requeue policy with exponential backoff for failed reconciliations
//!
//! Errors carry an [`ErrorKind`]: transient failures are retried with growing
//! delays, permanent ones wait for the resource to change.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use kube::runtime::controller::Action;
use provider_sync_core::ErrorKind;
use tracing::{debug, warn};

/// Maximum number of retries before giving up
const MAX_RETRIES: u32 = 10;

/// Base delay for exponential backoff (seconds)
const BASE_DELAY_SECS: u64 = 5;

/// Maximum delay between retries (1 hour)
const MAX_DELAY_SECS: u64 = 3600;

/// Tracks consecutive failures per resource
///
/// Uses a std mutex so the synchronous `error_policy` can record attempts.
#[derive(Debug, Default)]
pub struct RetryTracker {
    /// Map of resource UID to retry count
    attempts: Mutex<HashMap<String, u32>>,
}

impl RetryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment retry count for a resource and return the new count
    pub fn increment(&self, uid: &str) -> u32 {
        let mut attempts = self.attempts.lock().unwrap_or_else(PoisonError::into_inner);
        let count = attempts.entry(uid.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    /// Forget a resource (successful pass or finalized)
    pub fn reset(&self, uid: &str) {
        let mut attempts = self.attempts.lock().unwrap_or_else(PoisonError::into_inner);
        attempts.remove(uid);
    }

    pub fn get(&self, uid: &str) -> u32 {
        let attempts = self.attempts.lock().unwrap_or_else(PoisonError::into_inner);
        attempts.get(uid).copied().unwrap_or(0)
    }
}

/// Delay before the next attempt, or `None` once retries are exhausted
fn backoff_delay(attempt: u32) -> Option<Duration> {
    if attempt >= MAX_RETRIES {
        return None;
    }
    // 5s, 10s, 20s, 40s, ... up to 1 hour
    let delay_secs = BASE_DELAY_SECS.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)));
    Some(Duration::from_secs(delay_secs.min(MAX_DELAY_SECS)))
}

/// Determine the requeue action for a failed reconciliation
pub fn compute_backoff(attempt: u32, kind: ErrorKind) -> Action {
    match kind {
        ErrorKind::Transient => match backoff_delay(attempt) {
            Some(delay) => {
                debug!(
                    attempt,
                    delay_secs = delay.as_secs(),
                    "Scheduling retry with exponential backoff"
                );
                Action::requeue(delay)
            }
            None => {
                warn!(
                    attempt,
                    max_retries = MAX_RETRIES,
                    "Max retries exceeded, waiting for resource change"
                );
                Action::await_change()
            }
        },
        ErrorKind::Permanent => {
            warn!("Permanent error, waiting for resource change");
            Action::await_change()
        }
    }
}

pub fn new_tracker() -> Arc<RetryTracker> {
    Arc::new(RetryTracker::new())
}
