use std::future::Future;
use std::time::Duration;

/// Decides whether and how long to wait before the next attempt.
pub trait RetryPolicy: Send + Sync {
    fn name(&self) -> &str;

    /// Delay before retry number `attempt` (0-based), or `None` to give up.
    fn next_delay(&self, attempt: u32) -> Option<Duration>;

    fn max_retries(&self) -> u32;
}

/// `base * 2^attempt`, capped at `max_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExponentialBackoff {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_retries: u32,
}

impl ExponentialBackoff {
    pub fn new(base_delay: Duration, max_delay: Duration, max_retries: u32) -> Self {
        Self {
            base_delay,
            max_delay,
            max_retries,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

impl Default for ExponentialBackoff {
    /// 0.5s, 1s, 2s, 4s, 8s.
    fn default() -> Self {
        Self::new(Duration::from_millis(500), Duration::from_secs(30), 5)
    }
}

impl RetryPolicy for ExponentialBackoff {
    fn name(&self) -> &str {
        "exponential-backoff"
    }

    fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_retries {
            return None;
        }
        let exp = 1u32 << attempt.min(30);
        Some(self.base_delay.saturating_mul(exp).min(self.max_delay))
    }

    fn max_retries(&self) -> u32 {
        self.max_retries
    }
}

/// Runs `op` until it succeeds, `retryable` says no, or the policy gives up.
/// The last error is returned.
pub async fn retry_async<T, E, F, Fut>(
    policy: &dyn RetryPolicy,
    retryable: impl Fn(&E) -> bool,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                let delay = match policy.next_delay(attempt) {
                    Some(d) if retryable(&e) => d,
                    _ => return Err(e),
                };
                tracing::warn!(
                    target: "imgtask.retry",
                    stage = "retry.wait",
                    policy = %policy.name(),
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %e
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
