use std::future::Future;
use std::time::Duration;

/// Retry/time-limit settings for a deferred pipeline run. Defaults match
/// the scheduled sync: three retries, one minute apart, five minutes per
/// attempt.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
    pub time_limit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: Duration::from_secs(60),
            time_limit: Duration::from_secs(300),
        }
    }
}

impl RetryPolicy {
    /// Policy whose soft time limit follows the resolved fetch timeout, so
    /// an environment override of the timeout also bounds each attempt.
    pub fn for_timeout(seconds: i64) -> Self {
        Self {
            time_limit: Duration::from_secs(seconds.max(1) as u64),
            ..Self::default()
        }
    }
}

/// Run an operation under a soft time limit, retrying on error or timeout
/// with fixed backoff up to the policy's retry budget. The final error is
/// surfaced once the budget is spent.
pub async fn run_with_retry<T, F, Fut>(
    name: &str,
    policy: &RetryPolicy,
    mut op: F,
) -> anyhow::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        let result = match tokio::time::timeout(policy.time_limit, op()).await {
            Ok(result) => result,
            Err(_) => Err(anyhow::anyhow!(
                "{} timed out after {:?}",
                name,
                policy.time_limit
            )),
        };
        match result {
            Ok(value) => return Ok(value),
            Err(e) if attempt <= policy.max_retries => {
                log::warn!(
                    "{} failed (attempt {}/{}): {}, retrying in {:?}",
                    name,
                    attempt,
                    policy.max_retries + 1,
                    e,
                    policy.backoff
                );
                tokio::time::sleep(policy.backoff).await;
            }
            Err(e) => return Err(e),
        }
    }
}
