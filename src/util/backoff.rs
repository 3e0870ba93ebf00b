/// Exponential backoff with jitter, shared by the graph adapters (C2) and
/// the embedding provider (E1) retry loops.
use std::time::Duration;

use rand::{distributions::Uniform, thread_rng, Rng};

#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    pub max_retries: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            max_retries: 3,
        }
    }
}

impl BackoffPolicy {
    /// Delay before retry attempt `attempt` (0-indexed), including jitter of
    /// up to 50% of the computed delay.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let scaled = self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        let capped = scaled.min(self.max_delay.as_secs_f64());
        let jitter_fraction = thread_rng().sample(Uniform::new(0.0, 0.5));
        let jittered = capped * (1.0 + jitter_fraction);
        Duration::from_secs_f64(jittered)
    }
}

/// Runs `op` up to `policy.max_retries` additional times, calling
/// `is_retryable` on each error to decide whether to keep going. The final
/// error (retryable or not) is returned if every attempt failed.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: &BackoffPolicy,
    is_retryable: impl Fn(&E) -> bool,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt >= policy.max_retries || !is_retryable(&err) {
                    return Err(err);
                }
                let delay = policy.delay_for_attempt(attempt);
                tracing::debug!(attempt, ?delay, "retrying after transient failure");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn delay_never_exceeds_max_plus_jitter() {
        let policy = BackoffPolicy {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
            multiplier: 3.0,
            max_retries: 5,
        };
        for attempt in 0..10 {
            let delay = policy.delay_for_attempt(attempt);
            assert!(delay <= Duration::from_millis(750), "delay {:?} too large", delay);
        }
    }

    #[tokio::test]
    async fn retries_until_success_then_stops() {
        let calls = AtomicU32::new(0);
        let policy = BackoffPolicy {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            multiplier: 1.0,
            max_retries: 5,
        };
        let result: Result<u32, &str> = retry_with_backoff(&policy, |_| true, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err("transient")
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_error_stops_immediately() {
        let calls = AtomicU32::new(0);
        let policy = BackoffPolicy::default();
        let result: Result<(), &str> = retry_with_backoff(&policy, |_| false, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("fatal") }
        })
        .await;
        assert_eq!(result, Err("fatal"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
