//! Retry wrapper for transient SQLite errors (lock contention under
//! concurrent upserts). Mirrors the backoff shape used for provider/LLM
//! calls elsewhere in this crate, scaled down for local disk I/O.

use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct DbRetryConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for DbRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(20),
        }
    }
}

fn is_retryable(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = db_err.message();
            msg.contains("locked") || msg.contains("busy")
        }
        sqlx::Error::PoolTimedOut => true,
        _ => false,
    }
}

/// Run `op` up to `cfg.max_attempts` times, retrying only on lock/busy/pool
/// errors with linear backoff.
pub async fn retry_db<T, F, Fut>(cfg: DbRetryConfig, mut op: F) -> Result<T, sqlx::Error>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, sqlx::Error>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if attempt + 1 < cfg.max_attempts && is_retryable(&e) => {
                attempt += 1;
                tokio::time::sleep(cfg.base_delay * attempt).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, sqlx::Error> = retry_db(DbRetryConfig::default(), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(sqlx::Error::PoolTimedOut)
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
