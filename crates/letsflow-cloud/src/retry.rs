//! Bounded retry around create calls
//!
//! Separate from readiness polling: this only gets the create request
//! acknowledged. It returns as soon as one attempt succeeds.

use crate::context::OperationContext;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// Which create failures are worth another attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryScope {
    /// Retry every failure, including permanent validation errors echoed
    /// back by the control plane
    #[default]
    AnyError,
    /// Retry only transient (network / 5xx-class) failures
    TransientOnly,
}

/// Retry configuration for create operations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts, including the first one
    pub max_attempts: u32,

    /// Fixed delay between attempts
    #[serde(with = "crate::serde_secs")]
    pub delay: Duration,

    #[serde(default)]
    pub scope: RetryScope,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(5),
            scope: RetryScope::AnyError,
        }
    }
}

impl RetryConfig {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
            scope: RetryScope::AnyError,
        }
    }

    pub fn with_scope(mut self, scope: RetryScope) -> Self {
        self.scope = scope;
        self
    }

    /// Run `operation` until it succeeds or the budget is spent.
    ///
    /// `what` names the request in logs. The last error is returned on
    /// exhaustion; cancellation during a delay returns `Cancelled`.
    pub async fn run<T, F, Fut>(
        &self,
        ctx: &OperationContext,
        what: &str,
        mut operation: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            ctx.check()?;
            attempt += 1;

            tracing::info!(
                target_resource = what,
                attempt,
                max_attempts,
                "Attempting create request"
            );

            let error = match operation().await {
                Ok(value) => {
                    tracing::info!(target_resource = what, attempt, "Create request accepted");
                    return Ok(value);
                }
                Err(e) => e,
            };

            if self.scope == RetryScope::TransientOnly && !error.is_transient() {
                tracing::error!(
                    target_resource = what,
                    attempt,
                    error = %error,
                    "Create request failed with a non-retryable error"
                );
                return Err(error);
            }

            if attempt >= max_attempts {
                tracing::error!(
                    target_resource = what,
                    attempts = attempt,
                    error = %error,
                    "Create request failed after retries"
                );
                return Err(error);
            }

            tracing::warn!(
                target_resource = what,
                retry_count = attempt,
                max_attempts,
                error = %error,
                "Create request failed, retrying in {}s",
                self.delay.as_secs()
            );

            ctx.sleep(self.delay).await?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CloudError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_exhausts_budget_with_fixed_delay() {
        let retry = RetryConfig::default();
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let start = Instant::now();

        let result: Result<()> = retry
            .run(&OperationContext::new(), "t1", move || async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                Err(CloudError::Permanent(format!("rejected #{}", n)))
            })
            .await;

        let err = result.unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(err.to_string(), "API error: rejected #3");
        // two gaps between three attempts
        assert_eq!(start.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_returns_on_first_success() {
        let retry = RetryConfig::default();
        let calls = AtomicU32::new(0);
        let counter = &calls;

        let value = retry
            .run(&OperationContext::new(), "t1", move || async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(CloudError::Transient("connection reset".into()))
                } else {
                    Ok(42)
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_only_scope_stops_on_permanent() {
        let retry = RetryConfig::default().with_scope(RetryScope::TransientOnly);
        let calls = AtomicU32::new(0);
        let counter = &calls;

        let err = retry
            .run(&OperationContext::new(), "t1", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(CloudError::Permanent("invalid plan".into()))
            })
            .await
            .unwrap_err();

        assert!(matches!(err, CloudError::Permanent(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_during_delay() {
        let retry = RetryConfig::new(10, Duration::from_secs(60));
        let ctx = OperationContext::new();
        let canceller = ctx.clone();
        let calls = AtomicU32::new(0);
        let counter = &calls;

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(90)).await;
            canceller.cancel();
        });

        let err = retry
            .run(&ctx, "t1", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(CloudError::Transient("timeout".into()))
            })
            .await
            .unwrap_err();

        assert!(matches!(err, CloudError::Cancelled(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
