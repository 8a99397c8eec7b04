use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tokio::time::timeout;
use tracing::warn;

use crate::BackoffPolicy;
use crate::Result;
use crate::TransportError;

/// Retry `task` with a per-attempt timeout and exponential backoff.
///
/// `policy.max_retries == 0` retries until the task succeeds. Each attempt is
/// bounded by `policy.timeout_ms`; the delay between attempts starts at
/// `base_delay_ms`, doubles, is capped at `max_delay_ms` and carries up to 10%
/// random jitter. A timed-out attempt fails with [`TransportError::Timeout`]
/// naming `target`.
pub(crate) async fn task_with_timeout_and_exponential_backoff<F, T, P>(
    target: &str,
    task: F,
    policy: BackoffPolicy,
) -> Result<P>
where
    F: Fn() -> T,
    T: std::future::Future<Output = Result<P>>,
{
    let mut retries = 0;
    let mut delay = Duration::from_millis(policy.base_delay_ms);
    let max_delay = Duration::from_millis(policy.max_delay_ms);
    let timeout_duration = Duration::from_millis(policy.timeout_ms);

    loop {
        let last_error = match timeout(timeout_duration, task()).await {
            Ok(Ok(r)) => return Ok(r),
            Ok(Err(error)) => {
                warn!("task attempt {} failed: {:?}", retries + 1, &error);
                error
            }
            Err(_) => {
                warn!(
                    "task attempt {} timed out after {:?}",
                    retries + 1,
                    timeout_duration
                );
                TransportError::Timeout {
                    endpoint: target.to_string(),
                    duration: timeout_duration,
                }
                .into()
            }
        };

        retries += 1;
        if policy.max_retries != 0 && retries >= policy.max_retries {
            warn!("Task failed after {} retries", retries);
            return Err(last_error);
        }

        sleep(with_jitter(delay)).await;
        delay = (delay * 2).min(max_delay);
    }
}

fn with_jitter(delay: Duration) -> Duration {
    let max_jitter = delay.as_millis() as u64 / 10;
    if max_jitter == 0 {
        return delay;
    }
    delay + Duration::from_millis(rand::thread_rng().gen_range(0..=max_jitter))
}
