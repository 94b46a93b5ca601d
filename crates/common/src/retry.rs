//! Bounded retry with fixed backoff
//!
//! One policy object drives both the listing fetch and the credential
//! refresh. The attempt count, not elapsed time, bounds total latency: each
//! attempt carries its own request timeout and the policy sleeps a constant
//! delay between attempts (never after the last one).

use std::future::Future;
use std::time::Duration;

use tracing::trace;

/// Position of one attempt within a retry run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attempt {
    /// 1-based attempt number
    pub number: u32,
    /// Total attempts the policy allows
    pub max: u32,
}

impl Attempt {
    /// True for every attempt after the first.
    pub fn is_retry(&self) -> bool {
        self.number > 1
    }

    /// Attempts still allowed after this one.
    pub fn remaining(&self) -> u32 {
        self.max - self.number
    }
}

/// Every attempt failed; carries the last error seen.
#[derive(Debug)]
pub struct Exhausted<E> {
    pub attempts: u32,
    pub last_error: E,
}

/// Retry policy parameterized by attempt count and a constant delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
}

impl RetryPolicy {
    /// Create a policy. `max_attempts` is clamped to at least one.
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Run `op` until it succeeds or the attempts are used up.
    ///
    /// `op` receives the current [`Attempt`] so it can log with the attempt
    /// count. Failures are returned to the caller only once, wrapped in
    /// [`Exhausted`]; what that means (absent result or fatal) is the caller's
    /// decision.
    pub async fn run<T, E, F, Fut>(&self, mut op: F) -> std::result::Result<T, Exhausted<E>>
    where
        F: FnMut(Attempt) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        let mut number = 1;
        loop {
            let attempt = Attempt {
                number,
                max: self.max_attempts,
            };
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(last_error) if attempt.remaining() == 0 => {
                    return Err(Exhausted {
                        attempts: number,
                        last_error,
                    });
                }
                Err(_) => {
                    trace!(
                        attempt = number,
                        delay_ms = self.delay.as_millis() as u64,
                        "attempt failed, backing off"
                    );
                    tokio::time::sleep(self.delay).await;
                    number += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn always_failing_op_runs_exactly_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::new(4, Duration::from_secs(2));

        let counter = calls.clone();
        let result: Result<(), Exhausted<&str>> = policy
            .run(|_| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err("status 500")
                }
            })
            .await;

        let exhausted = result.unwrap_err();
        assert_eq!(exhausted.attempts, 4);
        assert_eq!(exhausted.last_error, "status 500");
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn success_stops_the_loop() {
        let policy = RetryPolicy::new(5, Duration::from_secs(2));
        let mut seen = Vec::new();

        let result = policy
            .run(|attempt| {
                seen.push(attempt);
                async move {
                    if attempt.number < 3 {
                        Err("timeout")
                    } else {
                        Ok(attempt.number)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(seen.len(), 3);
        assert!(!seen[0].is_retry());
        assert!(seen[2].is_retry());
        assert_eq!(seen[2].remaining(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_is_fixed_and_skipped_after_last_attempt() {
        let policy = RetryPolicy::new(3, Duration::from_secs(2));
        let start = tokio::time::Instant::now();

        let _ = policy
            .run(|_| async { Err::<(), _>("connection refused") })
            .await;

        // Two sleeps between three attempts, none after the final one
        assert_eq!(start.elapsed(), Duration::from_secs(4));
    }

    #[test]
    fn zero_attempts_clamped_to_one() {
        let policy = RetryPolicy::new(0, Duration::ZERO);
        assert_eq!(policy.max_attempts(), 1);
    }
}
