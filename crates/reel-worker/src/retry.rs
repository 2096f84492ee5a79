//! Backoff for transient collaborator failures, and log throttling for
//! periodic background work.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

/// Exponential backoff: `base * 2^(n-1)`, capped at `cap`.
#[derive(Debug, Clone)]
pub struct Backoff {
    pub retries: u32,
    pub base: Duration,
    pub cap: Duration,
    pub label: &'static str,
}

impl Backoff {
    pub fn new(label: &'static str, retries: u32) -> Self {
        Self {
            retries,
            base: Duration::from_millis(200),
            cap: Duration::from_secs(5),
            label,
        }
    }

    pub fn with_base(mut self, base: Duration) -> Self {
        self.base = base;
        self
    }

    fn delay(&self, retry: u32) -> Duration {
        let shift = retry.saturating_sub(1).min(16);
        self.base.saturating_mul(1 << shift).min(self.cap)
    }
}

/// Run `op` until it succeeds, fails with a non-transient error, or the
/// retry budget is spent. The last error is returned as-is.
pub async fn retry_transient<T, E, F, Fut>(
    backoff: &Backoff,
    is_transient: impl Fn(&E) -> bool,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut retry = 0;
    loop {
        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        if retry >= backoff.retries || !is_transient(&err) {
            if retry > 0 {
                warn!(op = backoff.label, attempts = retry + 1, "Giving up: {}", err);
            }
            return Err(err);
        }
        retry += 1;
        let wait = backoff.delay(retry);
        debug!(op = backoff.label, retry, ?wait, "Transient failure: {}", err);
        tokio::time::sleep(wait).await;
    }
}

/// Logs the first `limit` consecutive failures of a periodic task, then goes
/// quiet until a success.
#[derive(Debug)]
pub struct LogThrottle {
    streak: u32,
    limit: u32,
}

impl LogThrottle {
    pub fn new(limit: u32) -> Self {
        Self { streak: 0, limit }
    }

    pub fn success(&mut self) {
        if self.streak > self.limit {
            debug!(failures = self.streak, "Recovered after suppressed failures");
        }
        self.streak = 0;
    }

    /// Returns whether this failure should be logged.
    pub fn failure(&mut self) -> bool {
        self.streak += 1;
        if self.streak == self.limit + 1 {
            warn!(failures = self.streak, "Further failures suppressed until recovery");
        }
        self.streak <= self.limit
    }

    pub fn streak(&self) -> u32 {
        self.streak
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_backoff_doubles_and_caps() {
        let backoff = Backoff::new("t", 10).with_base(Duration::from_millis(100));
        assert_eq!(backoff.delay(1), Duration::from_millis(100));
        assert_eq!(backoff.delay(3), Duration::from_millis(400));
        assert_eq!(backoff.delay(12), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let backoff = Backoff::new("t", 3).with_base(Duration::from_millis(1));
        let calls = AtomicU32::new(0);

        let result: Result<u32, &str> = retry_transient(&backoff, |_| true, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move { if n < 2 { Err("flaky") } else { Ok(n) } }
        })
        .await;

        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_stops_immediately() {
        let backoff = Backoff::new("t", 5).with_base(Duration::from_millis(1));
        let calls = AtomicU32::new(0);

        let result: Result<(), &str> = retry_transient(&backoff, |e| *e != "denied", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("denied") }
        })
        .await;

        assert_eq!(result, Err("denied"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_budget_exhausted() {
        let backoff = Backoff::new("t", 2).with_base(Duration::from_millis(1));
        let calls = AtomicU32::new(0);

        let result: Result<(), &str> = retry_transient(&backoff, |_| true, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("down") }
        })
        .await;

        assert_eq!(result, Err("down"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_log_throttle() {
        let mut throttle = LogThrottle::new(2);
        assert!(throttle.failure());
        assert!(throttle.failure());
        assert!(!throttle.failure());
        assert_eq!(throttle.streak(), 3);

        throttle.success();
        assert_eq!(throttle.streak(), 0);
        assert!(throttle.failure());
    }
}
