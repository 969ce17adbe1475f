use std::time::Duration;

/// Backoff policy for re-running an operation that lost a race.
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
            max_attempts: 5,
            base_backoff: Duration::from_millis(20),
            max_backoff: Duration::from_millis(500),
            jitter_max: Some(Duration::from_millis(50)),
        }
    }
}

impl RetryConfig {
    pub fn with_max_attempts(max_attempts: usize) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }
}

/// Runs `f` until it succeeds, returns an error `should_retry` rejects, or
/// `max_attempts` runs are used up. The last error is returned.
pub async fn retry_async_with_config<F, Fut, T, E, P>(
    config: RetryConfig,
    should_retry: P,
    mut f: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let mut attempts_left = config.max_attempts;
    let mut backoff = config.base_backoff;

    loop {
        match f().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                attempts_left = attempts_left.saturating_sub(1);
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
