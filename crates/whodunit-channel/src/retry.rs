//! Bounded retry with exponential backoff

use crate::channel::{ChannelError, ChannelResult};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub factor: f64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            factor: 2.0,
            max_delay_ms: 8000,
        }
    }
}

impl RetryPolicy {
    /// Policy without waits between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay_ms: 0,
            factor: 1.0,
            max_delay_ms: 0,
        }
    }

    /// Delay after the `attempt`-th failure (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1) as i32;
        let ms = self.base_delay_ms as f64 * self.factor.max(1.0).powi(exp);
        Duration::from_millis((ms as u64).min(self.max_delay_ms.max(self.base_delay_ms)))
    }
}

/// Run `f` until it succeeds, returns a non-transient error, or the attempt
/// budget is spent. Cancellation interrupts the backoff sleep.
pub async fn retry<T, F, Fut>(
    policy: &RetryPolicy,
    op: &str,
    cancel: &CancellationToken,
    mut f: F,
) -> ChannelResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ChannelResult<T>>,
{
    let max = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        if cancel.is_cancelled() {
            return Err(ChannelError::Cancelled);
        }
        attempt += 1;
        let err = match f().await {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_transient() => return Err(e),
            Err(e) => e,
        };

        if attempt >= max {
            error!(op, attempts = attempt, error = %err, "retry budget exhausted");
            return Err(ChannelError::Exhausted {
                attempts: attempt,
                last: Box::new(err),
            });
        }

        let delay = policy.delay_for(attempt);
        warn!(op, attempt, delay_ms = delay.as_millis() as u64, error = %err, "retrying");
        tokio::select! {
            _ = cancel.cancelled() => return Err(ChannelError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn delays_grow_and_cap() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(4000));
        assert_eq!(policy.delay_for(10), Duration::from_millis(8000));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_after_max_attempts() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let cancel = CancellationToken::new();
        let res: ChannelResult<()> = retry(&RetryPolicy::default(), "test", &cancel, move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ChannelError::RequestFailed("down".into()))
        })
        .await;
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert!(matches!(res, Err(ChannelError::Exhausted { attempts: 3, .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_error_is_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let cancel = CancellationToken::new();
        let res: ChannelResult<()> = retry(&RetryPolicy::default(), "test", &cancel, move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ChannelError::SessionNotFound("s1".into()))
        })
        .await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(matches!(res, Err(ChannelError::SessionNotFound(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_second_attempt() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let cancel = CancellationToken::new();
        let res = retry(&RetryPolicy::default(), "test", &cancel, move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(ChannelError::Timeout(Duration::from_secs(1)))
            } else {
                Ok(42)
            }
        })
        .await;
        assert_eq!(res.unwrap(), 42);
    }
}
