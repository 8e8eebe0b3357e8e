use std::time::Duration;

/// Backoff policy for idempotent calls to external services.
#[derive(Clone, Debug)]
pub struct RetryConfig {
    pub max_attempts: usize,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    pub jitter_max: Option<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(2),
            jitter_max: Some(Duration::from_millis(100)),
        }
    }
}

impl RetryConfig {
    /// Single attempt, no waiting. Used by tests and by callers that
    /// already run inside a retry loop of their own.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            base_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            jitter_max: None,
        }
    }
}

/// Runs `f` until it succeeds, `should_retry` rejects the error, or the
/// attempts are exhausted. Backoff doubles up to `max_backoff`.
pub async fn retry_async_with_config<F, Fut, T, E, P>(
    config: &RetryConfig,
    mut should_retry: P,
    mut f: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    P: FnMut(&E) -> bool,
{
    let mut attempts_left = config.max_attempts.max(1);
    let mut backoff = config.base_backoff;

    loop {
        match f().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                attempts_left -= 1;
                if attempts_left == 0 || !should_retry(&e) {
                    return Err(e);
                }

                let extra = match config.jitter_max {
                    Some(jitter_max) if !jitter_max.is_zero() => {
                        let jitter_ms = jitter_max.as_millis() as u64;
                        Duration::from_millis(rand::random::<u64>() % (jitter_ms + 1))
                    }
                    _ => Duration::ZERO,
                };
                tokio::time::sleep(backoff + extra).await;

                backoff = std::cmp::min(backoff * 2, config.max_backoff);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast_config(max_attempts: usize) -> RetryConfig {
        RetryConfig {
            max_attempts,
            base_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(10),
            jitter_max: None,
        }
    }

    #[tokio::test]
    async fn retry_succeeds_after_retries() {
        let counter = AtomicUsize::new(0);

        let res: Result<usize, &'static str> =
            retry_async_with_config(&fast_config(3), |_| true, || async {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err("fail")
                } else {
                    Ok(n)
                }
            })
            .await;

        assert_eq!(res, Ok(2));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_stops_on_permanent_error() {
        let counter = AtomicUsize::new(0);

        let res: Result<(), &'static str> =
            retry_async_with_config(&fast_config(5), |e| *e != "permanent", || async {
                counter.fetch_add(1, Ordering::SeqCst);
                Err("permanent")
            })
            .await;

        assert!(res.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retry_fails_after_max_attempts() {
        let counter = AtomicUsize::new(0);

        let res: Result<(), &'static str> =
            retry_async_with_config(&fast_config(2), |_| true, || async {
                counter.fetch_add(1, Ordering::SeqCst);
                Err("always fail")
            })
            .await;

        assert!(res.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }
}
