//! Per-pass call context: cancellation and deadline for remote calls

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::{Operation, ReconcileError};

/// Carried unmodified through every adapter call of a reconciliation pass
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    cancel: CancellationToken,
    timeout: Option<Duration>,
}

impl CallContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context that is cancelled together with `token`
    pub fn with_cancellation(token: CancellationToken) -> Self {
        Self {
            cancel: token,
            timeout: None,
        }
    }

    /// Bound every remote call made under this context
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn call_timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Drive `fut` unless the context is cancelled or the deadline elapses first
    pub async fn run<F, T>(&self, operation: Operation, fut: F) -> Result<T, ReconcileError>
    where
        F: Future<Output = T>,
    {
        if self.cancel.is_cancelled() {
            return Err(ReconcileError::Cancelled);
        }

        let guarded = async {
            match self.timeout {
                Some(limit) => tokio::time::timeout(limit, fut)
                    .await
                    .map_err(|_| ReconcileError::Timeout { operation }),
                None => Ok(fut.await),
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ReconcileError::Cancelled),
            result = guarded => result,
        }
    }
}
