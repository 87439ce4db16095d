// Bounded retry and hard timeouts over the host's timer

use futures::future::{self, Either};
use std::future::Future;
use std::time::Duration;

use crate::error::{GuardError, GuardResult};
use crate::host::Timer;

/// Fixed-delay retry budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }
}

/// Run `op` until it succeeds or the policy is exhausted.
///
/// Sleeps `policy.delay` between attempts (never after the last one) and
/// returns the last error on exhaustion.
pub async fn retry<T, E, F, Fut>(policy: RetryPolicy, timer: &dyn Timer, mut op: F) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if attempt >= policy.max_attempts => return Err(e),
            Err(e) => {
                log::debug!("Attempt {}/{} failed: {}", attempt, policy.max_attempts, e);
                timer.sleep(policy.delay).await;
                attempt += 1;
            }
        }
    }
}

/// Bound `fut` by `limit`, turning a hang into `GuardError::Timeout`
pub async fn with_timeout<T, Fut>(timer: &dyn Timer, limit: Duration, fut: Fut) -> GuardResult<T>
where
    Fut: Future<Output = GuardResult<T>>,
{
    let fut = Box::pin(fut);
    let deadline = timer.sleep(limit);
    match future::select(fut, deadline).await {
        Either::Left((result, _)) => result,
        Either::Right(((), _)) => Err(GuardError::Timeout(limit)),
    }
}
