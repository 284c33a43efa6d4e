use std::{fmt::Display, future::Future, time::Duration};

use tracing::warn;

/// Fixed-delay retry: `attempts` tries in total, `delay` between two tries
/// and none after the last one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: usize,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: usize, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum RetryError<E> {
    Exhausted { attempts: usize, last: E },
    Cancelled,
}

/// Runs `op` until it succeeds or the policy is exhausted.
///
/// `cancel` is raced against every attempt and every delay; once it
/// resolves no further attempt is started.
pub async fn retry_fixed<T, E, Op, Fut, C>(
    policy: RetryPolicy,
    cancel: C,
    mut op: Op,
) -> Result<T, RetryError<E>>
where
    Op: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Future<Output = ()>,
    E: Display,
{
    tokio::pin!(cancel);
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;

    loop {
        let outcome = tokio::select! {
            biased;
            _ = &mut cancel => return Err(RetryError::Cancelled),
            outcome = op(attempt) => outcome,
        };

        let err = match outcome {
            Ok(value) => return Ok(value),
            Err(err) if attempt >= attempts => {
                return Err(RetryError::Exhausted {
                    attempts,
                    last: err,
                })
            }
            Err(err) => err,
        };

        warn!(
            attempt,
            max_attempts = attempts,
            error = %err,
            "attempt failed; retrying"
        );
        tokio::select! {
            biased;
            _ = &mut cancel => return Err(RetryError::Cancelled),
            _ = tokio::time::sleep(policy.delay) => {}
        }
        attempt += 1;
    }
}

#[cfg(test)]
#[path = "tests/retry_tests.rs"]
mod tests;
