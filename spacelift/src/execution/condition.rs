//! Re-execution of a unit of work until its result satisfies a condition.

use super::TaskContext;
use crate::errors::{ExecutionError, Result, TimeoutError};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::debug;

/// Decides whether the result of a polled unit of work is acceptable.
pub trait ExecutionCondition<T>: Send {
    /// Returns true once `value` is the awaited result.
    fn satisfied_by(&self, value: &T) -> std::result::Result<bool, ExecutionError>;
}

impl<T, F> ExecutionCondition<T> for F
where
    F: Fn(&T) -> bool + Send,
{
    fn satisfied_by(&self, value: &T) -> std::result::Result<bool, ExecutionError> {
        Ok(self(value))
    }
}

/// How often and for how long a unit of work is re-executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollPolicy {
    /// Pause between two attempts.
    pub interval: Duration,
    /// Overall deadline, measured from the first attempt.
    pub timeout: Duration,
}

impl PollPolicy {
    /// Creates a new policy.
    #[must_use]
    pub const fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::new(Duration::from_millis(500), Duration::from_secs(60))
    }
}

pub(crate) fn poll<T, W, C>(
    ctx: &TaskContext,
    mut work: W,
    condition: &C,
    policy: PollPolicy,
) -> Result<T>
where
    W: FnMut(&TaskContext) -> std::result::Result<T, ExecutionError>,
    C: ExecutionCondition<T> + ?Sized,
{
    let deadline = Instant::now().checked_add(policy.timeout);
    let mut attempts = 0_u32;

    loop {
        ctx.check_cancelled()?;
        attempts += 1;

        let value = work(ctx)?;
        if condition.satisfied_by(&value)? {
            debug!(execution_id = %ctx.execution_id(), attempts, "Polling condition satisfied");
            return Ok(value);
        }

        let next_attempt = Instant::now().checked_add(policy.interval);
        let expired = match (next_attempt, deadline) {
            (_, None) => false,
            (None, Some(_)) => true,
            (Some(next), Some(deadline)) => next > deadline,
        };
        if expired {
            // Timeout kinds are reserved for bounded waits on running executions.
            let elapsed = TimeoutError::new(
                format!("Condition was not satisfied after {attempts} attempts"),
                policy.timeout,
            );
            return Err(ExecutionError::from_cause(elapsed).into());
        }
        if ctx.token().wait_timeout(policy.interval) {
            return Err(ExecutionError::terminated().into());
        }
    }
}
