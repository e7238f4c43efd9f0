// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Retry loop for background pushes.
//!
//! # Example
//!
//! ```
//! use finance_sync::RetryPolicy;
//! use std::time::Duration;
//!
//! // Background push: fixed 2s interval, retry while writes are queued
//! let push = RetryPolicy::fixed(Duration::from_secs(2), None);
//! assert_eq!(push.multiplier, 1.0);
//! assert!(push.attempts_remain(1_000));
//!
//! // Bounded variant
//! let bounded = RetryPolicy::fixed(Duration::from_millis(500), Some(10));
//! assert!(!bounded.attempts_remain(10));
//! ```

use std::future::Future;
use std::time::Duration;
use tracing::{error, info, warn};

/// Wait schedule and attempt cap for [`retry`].
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Wait after the first failure
    pub interval: Duration,
    /// Ceiling for a growing wait
    pub max_interval: Duration,
    /// Growth applied to the wait after each failure (1.0 = fixed)
    pub multiplier: f64,
    /// Total attempts before giving up (None = never give up)
    pub max_attempts: Option<usize>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(Duration::from_secs(2), None)
    }
}

impl RetryPolicy {
    /// Fixed-interval schedule used by the background push worker.
    #[must_use]
    pub fn fixed(interval: Duration, max_attempts: Option<usize>) -> Self {
        Self {
            interval,
            max_interval: interval,
            multiplier: 1.0,
            max_attempts,
        }
    }

    /// Whether another attempt follows `failed` failed ones.
    #[must_use]
    pub fn attempts_remain(&self, failed: usize) -> bool {
        self.max_attempts.map_or(true, |max| failed < max)
    }

    /// Wait that follows `wait` in this schedule.
    #[inline]
    #[must_use]
    pub fn grow(&self, wait: Duration) -> Duration {
        wait.mul_f64(self.multiplier).min(self.max_interval)
    }
}

/// Run `attempt` until it succeeds or the policy gives up.
///
/// Returns the last error when attempts are exhausted.
pub async fn retry<F, Fut, T, E>(label: &str, policy: &RetryPolicy, mut attempt: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut wait = policy.interval;
    let mut failed = 0usize;

    loop {
        let err = match attempt().await {
            Ok(value) => {
                if failed > 0 {
                    info!(operation = label, failed, "Succeeded after retrying");
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        failed += 1;
        if !policy.attempts_remain(failed) {
            error!(operation = label, attempts = failed, error = %err, "Giving up after repeated failures");
            return Err(err);
        }
        warn!(
            operation = label,
            attempt = failed,
            max_attempts = ?policy.max_attempts,
            error = %err,
            next_retry = ?wait,
            "Attempt failed, retrying"
        );

        tokio::time::sleep(wait).await;
        wait = policy.grow(wait);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn quick(max_attempts: Option<usize>) -> RetryPolicy {
        RetryPolicy::fixed(Duration::from_millis(1), max_attempts)
    }

    /// Scripted outcomes consumed one per attempt; `Ok` once the script runs out.
    fn scripted(outcomes: Vec<&'static str>) -> (Arc<Mutex<Vec<&'static str>>>, Arc<Mutex<usize>>) {
        let mut reversed = outcomes;
        reversed.reverse();
        (Arc::new(Mutex::new(reversed)), Arc::new(Mutex::new(0)))
    }

    #[tokio::test]
    async fn test_success_needs_no_retry() {
        let calls = Arc::new(Mutex::new(0));
        let counter = calls.clone();
        let result: Result<&str, String> = retry("push", &quick(Some(3)), || {
            *counter.lock() += 1;
            async { Ok("pushed") }
        })
        .await;

        assert_eq!(result, Ok("pushed"));
        assert_eq!(*calls.lock(), 1);
    }

    #[tokio::test]
    async fn test_recovers_once_backend_returns() {
        let (script, calls) = scripted(vec!["503", "timeout"]);
        let (s, c) = (script.clone(), calls.clone());
        let result: Result<(), String> = retry("push", &quick(None), || {
            *c.lock() += 1;
            let next = s.lock().pop();
            async move {
                match next {
                    Some(reason) => Err(reason.to_string()),
                    None => Ok(()),
                }
            }
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(*calls.lock(), 3);
    }

    #[tokio::test]
    async fn test_cap_returns_last_error() {
        let (script, calls) = scripted(vec!["offline", "offline", "still offline", "never reached"]);
        let (s, c) = (script.clone(), calls.clone());
        let result: Result<(), String> = retry("push", &quick(Some(3)), || {
            *c.lock() += 1;
            let next = s.lock().pop();
            async move { Err(next.unwrap_or("drained").to_string()) }
        })
        .await;

        assert_eq!(result, Err("still offline".to_string()));
        assert_eq!(*calls.lock(), 3);
        assert_eq!(script.lock().len(), 1);
    }

    #[test]
    fn test_fixed_schedule_never_grows() {
        let policy = RetryPolicy::fixed(Duration::from_secs(2), None);
        assert_eq!(policy.grow(Duration::from_secs(2)), Duration::from_secs(2));
        assert_eq!(policy, RetryPolicy::default());
    }

    #[test]
    fn test_growing_schedule_is_capped() {
        let policy = RetryPolicy {
            interval: Duration::from_millis(250),
            max_interval: Duration::from_secs(1),
            multiplier: 3.0,
            max_attempts: None,
        };
        let second = policy.grow(policy.interval);
        assert_eq!(second, Duration::from_millis(750));
        assert_eq!(policy.grow(second), Duration::from_secs(1));
    }

    #[test]
    fn test_attempts_remain() {
        assert!(quick(None).attempts_remain(usize::MAX - 1));
        assert!(quick(Some(2)).attempts_remain(1));
        assert!(!quick(Some(2)).attempts_remain(2));
    }
}
