//! Per-operation cancellation and deadline

use crate::error::{CloudError, Result};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Ambient context for one lifecycle operation
///
/// Waits inside the poller and the create-retry wrapper go through
/// [`OperationContext::sleep`], so a cancelled token or an expired deadline
/// aborts them at the next sleep boundary.
#[derive(Debug, Clone, Default)]
pub struct OperationContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl OperationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an externally owned token (e.g. one cancelled on Ctrl-C).
    pub fn with_token(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Deadline `timeout` from now; a timeout past the clock's range means none.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self,
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Fail with `Cancelled` if the token fired or the deadline has passed.
    pub fn check(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(CloudError::Cancelled("cancellation requested".to_string()));
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(CloudError::Cancelled("operation deadline exceeded".to_string()));
            }
        }
        Ok(())
    }

    /// Sleep for `duration` unless cancelled or the deadline arrives first.
    pub async fn sleep(&self, duration: Duration) -> Result<()> {
        self.check()?;

        let wake = Instant::now().checked_add(duration);
        let (until, hits_deadline) = match (self.deadline, wake) {
            (Some(deadline), Some(wake)) if deadline < wake => (Some(deadline), true),
            (Some(deadline), None) => (Some(deadline), true),
            (_, wake) => (wake, false),
        };
        let timer = match until {
            Some(until) => tokio::time::sleep_until(until),
            None => tokio::time::sleep(duration),
        };

        tokio::select! {
            _ = self.cancel.cancelled() => {
                Err(CloudError::Cancelled("cancellation requested".to_string()))
            }
            _ = timer => {
                if hits_deadline {
                    Err(CloudError::Cancelled("operation deadline exceeded".to_string()))
                } else {
                    Ok(())
                }
            }
        }
    }
}
