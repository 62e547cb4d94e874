//! Bounded retry schedules and the result-driven retry loop.

use std::future::Future;
use std::time::Duration;

use crate::error::TransportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Backoff {
    Fixed,
    Exponential,
}

/// Retry budget for one operation: `max_retries` total attempts, with either
/// a fixed delay between attempts (connect path) or a delay that doubles
/// after every failed attempt (publish path).
#[derive(Debug, Clone)]
pub struct RetryBudget {
    attempt: u32,
    max_retries: u32,
    delay: Duration,
    backoff: Backoff,
}

impl RetryBudget {
    pub fn fixed(max_retries: u32, delay: Duration) -> Self {
        Self {
            attempt: 0,
            max_retries,
            delay,
            backoff: Backoff::Fixed,
        }
    }

    pub fn exponential(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            attempt: 0,
            max_retries,
            delay: base_delay,
            backoff: Backoff::Exponential,
        }
    }

    /// Record a failed attempt. Returns the delay to sleep before the next
    /// attempt, or `None` once all `max_retries` attempts are spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        self.attempt += 1;
        if self.attempt >= self.max_retries {
            return None;
        }
        let current = self.delay;
        if self.backoff == Backoff::Exponential {
            self.delay *= 2;
        }
        Some(current)
    }

    /// Failed attempts recorded so far.
    pub fn attempts(&self) -> u32 {
        self.attempt
    }
}

/// Drive `op` under a retry budget. Transient errors consume budget and
/// sleep the scheduled delay; a permanent error or an exhausted budget
/// returns the last error as-is. `op` receives the 1-based attempt number.
pub async fn run_with_retry<T, F, Fut>(mut budget: RetryBudget, mut op: F) -> Result<T, TransportError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, TransportError>>,
{
    loop {
        let attempt = budget.attempts() + 1;
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() => match budget.next_delay() {
                Some(delay) => {
                    tracing::warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                None => return Err(err),
            },
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[test]
    fn test_fixed_budget_attempt_ceiling() {
        let mut budget = RetryBudget::fixed(3, Duration::from_millis(100));
        assert_eq!(budget.next_delay(), Some(Duration::from_millis(100)));
        assert_eq!(budget.next_delay(), Some(Duration::from_millis(100)));
        assert_eq!(budget.next_delay(), None);
        assert_eq!(budget.attempts(), 3);
    }

    #[test]
    fn test_exponential_budget_doubles() {
        let mut budget = RetryBudget::exponential(5, Duration::from_millis(100));
        assert_eq!(budget.next_delay(), Some(Duration::from_millis(100)));
        assert_eq!(budget.next_delay(), Some(Duration::from_millis(200)));
        assert_eq!(budget.next_delay(), Some(Duration::from_millis(400)));
        assert_eq!(budget.next_delay(), Some(Duration::from_millis(800)));
        assert_eq!(budget.next_delay(), None);
    }

    #[test]
    fn test_single_attempt_budget_never_sleeps() {
        let mut budget = RetryBudget::fixed(1, Duration::from_secs(1));
        assert_eq!(budget.next_delay(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_succeeds_without_consuming_budget() {
        let calls = AtomicU32::new(0);
        let result = run_with_retry(RetryBudget::fixed(3, Duration::from_secs(1)), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(42u32) }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_recovers_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = run_with_retry(RetryBudget::fixed(5, Duration::from_secs(1)), |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt <= 2 {
                    Err(TransportError::ConnectionFailed("refused".into()))
                } else {
                    Ok(())
                }
            }
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhaustion_attempts_exactly_max() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> =
            run_with_retry(RetryBudget::fixed(4, Duration::from_secs(1)), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(TransportError::ConnectionFailed("refused".into())) }
            })
            .await;

        assert!(matches!(result, Err(TransportError::ConnectionFailed(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_error_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> =
            run_with_retry(RetryBudget::fixed(4, Duration::from_secs(1)), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(TransportError::NotConnected) }
            })
            .await;

        assert!(matches!(result, Err(TransportError::NotConnected)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
