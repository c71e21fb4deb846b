//! Generic exponential-backoff retry, shared by `providers` and `llm`.
//!
//! Both surfaces need the same shape (retry transient failures, honor a
//! server-supplied `retry-after`, cap attempts) so it lives here once
//! instead of being duplicated per client.

use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(10),
        }
    }
}

/// An error a retry loop can classify.
pub trait RetryableError {
    /// Should this error be retried at all.
    fn is_retryable(&self) -> bool;
    /// A server-supplied delay override (e.g. `Retry-After`), if present.
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// Run `op`, retrying on [`RetryableError::is_retryable`] errors up to
/// `cfg.max_attempts` with exponential backoff (`base_delay * 2^attempt`,
/// capped at `max_delay`), or the error's own `retry_after` if supplied.
pub async fn retry<T, E, F, Fut>(cfg: RetryConfig, mut op: F) -> Result<T, E>
where
    E: RetryableError,
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
{
    let mut attempt = 0;
    loop {
        match op(attempt).await {
            Ok(v) => return Ok(v),
            Err(e) if attempt + 1 < cfg.max_attempts && e.is_retryable() => {
                let delay = e.retry_after().unwrap_or_else(|| {
                    let exp = cfg.base_delay * 2u32.pow(attempt);
                    exp.min(cfg.max_delay)
                });
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct Flaky(bool);
    impl RetryableError for Flaky {
        fn is_retryable(&self) -> bool {
            self.0
        }
    }

    #[tokio::test]
    async fn retries_until_success() {
        let calls = AtomicU32::new(0);
        let cfg = RetryConfig {
            max_attempts: 5,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        };
        let result: Result<&str, Flaky> = retry(cfg, |attempt| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(Flaky(true))
                } else {
                    Ok("ok")
                }
                .map_err(|e| {
                    let _ = attempt;
                    e
                })
            }
        })
        .await;
        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_fails_immediately() {
        let calls = AtomicU32::new(0);
        let cfg = RetryConfig::default();
        let result: Result<(), Flaky> = retry(cfg, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Flaky(false)) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausts_max_attempts() {
        let calls = AtomicU32::new(0);
        let cfg = RetryConfig {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        };
        let result: Result<(), Flaky> = retry(cfg, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Flaky(true)) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
