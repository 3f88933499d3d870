//! Retry for side-effect-free chain reads. Writes never go through here.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// Linear backoff: the n-th retry sleeps `base_delay * n`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self { max_retries, base_delay }
    }

    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Run `operation` until it succeeds or retries are exhausted. The last
    /// error is returned.
    pub async fn run<T, E, F, Fut>(&self, what: &str, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        "{} failed: {}, retrying... (attempt {}/{})",
                        what, e, attempt, self.max_retries
                    );
                    tokio::time::sleep(self.base_delay * attempt).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let policy = RetryPolicy::new(3, Duration::from_millis(1));

        let result: Result<u32, String> = policy
            .run("flaky read", move || async move {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(format!("transient {}", n))
                } else {
                    Ok(n)
                }
            })
            .await;

        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let policy = RetryPolicy::new(2, Duration::from_millis(1));

        let result: Result<(), String> = policy
            .run("broken read", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err("down".to_string())
            })
            .await;

        assert_eq!(result, Err("down".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_no_retry_policy_calls_once() {
        let calls = AtomicU32::new(0);
        let counter = &calls;

        let result: Result<(), String> = RetryPolicy::none()
            .run("single read", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err("nope".to_string())
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
