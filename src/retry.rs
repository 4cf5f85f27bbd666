//! Fixed-delay retry policy.
//!
//! A [`RetryPolicy`] re-executes a task until it exits 0 or the attempt budget
//! is spent. Failure is reported through the returned [`RetryOutcome`]; the
//! policy itself never errors.

use crate::error::{Result, RunkitError};
use crate::task::{Task, TaskResult};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Attempts made by [`RetryPolicy::default`].
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// Delay between attempts for [`RetryPolicy::default`].
pub const DEFAULT_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Result<Self> {
        if max_attempts == 0 {
            return Err(RunkitError::validation("max_attempts must be at least 1"));
        }
        Ok(Self {
            max_attempts,
            delay,
        })
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Run `task` until it succeeds or the attempts are exhausted.
    pub fn run(&self, task: &Task) -> RetryOutcome {
        self.run_with(&task.command_line(), || {
            let start = Instant::now();
            let code = crate::task::run_to_exit_code(task);
            TaskResult::new(task.command_line(), code, start.elapsed())
        })
    }

    /// Same loop as [`run`](Self::run) over an arbitrary invocation.
    pub fn run_with<F>(&self, label: &str, mut attempt: F) -> RetryOutcome
    where
        F: FnMut() -> TaskResult,
    {
        let mut attempts = 0;
        loop {
            attempts += 1;
            debug!("Attempt {}/{}: {}", attempts, self.max_attempts, label);
            let result = attempt();

            if result.success() {
                if attempts > 1 {
                    info!("`{}` succeeded on attempt {}", label, attempts);
                }
                return RetryOutcome {
                    attempts,
                    result,
                    succeeded: true,
                };
            }

            warn!(
                "Attempt {}/{} of `{}` failed with status {}",
                attempts, self.max_attempts, label, result.exit_code
            );

            if attempts >= self.max_attempts {
                return RetryOutcome {
                    attempts,
                    result,
                    succeeded: false,
                };
            }

            if !self.delay.is_zero() {
                debug!("Retrying `{}` in {:.3}s", label, self.delay.as_secs_f64());
                std::thread::sleep(self.delay);
            }
        }
    }
}

/// Final state of a retried task.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryOutcome {
    pub attempts: u32,
    /// Result of the last attempt, successful or not.
    pub result: TaskResult,
    pub succeeded: bool,
}

impl RetryOutcome {
    /// Turn a failed outcome into [`RunkitError::RetryExhausted`].
    pub fn into_result(self) -> Result<TaskResult> {
        if self.succeeded {
            Ok(self.result)
        } else {
            Err(RunkitError::RetryExhausted {
                command: self.result.command_line,
                attempts: self.attempts,
                exit_code: self.result.exit_code,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scripted(codes: &[i32]) -> impl FnMut() -> TaskResult + '_ {
        let mut calls = 0;
        move || {
            let code = codes[calls.min(codes.len() - 1)];
            calls += 1;
            TaskResult::new("scripted", code, Duration::ZERO)
        }
    }

    #[test]
    fn test_zero_attempts_rejected() {
        assert!(RetryPolicy::new(0, Duration::ZERO).is_err());
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.delay(), Duration::from_secs(2));
    }

    #[test]
    fn test_immediate_success() {
        let policy = RetryPolicy::new(5, Duration::ZERO).unwrap();
        let outcome = policy.run_with("ok", scripted(&[0]));
        assert!(outcome.succeeded);
        assert_eq!(outcome.attempts, 1);
    }

    #[test]
    fn test_fails_then_succeeds() {
        let policy = RetryPolicy::new(3, Duration::ZERO).unwrap();
        let outcome = policy.run_with("flaky", scripted(&[1, 1, 0]));
        assert!(outcome.succeeded);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.result.exit_code, 0);
    }

    #[test]
    fn test_exhaustion_keeps_last_result() {
        let policy = RetryPolicy::new(3, Duration::ZERO).unwrap();
        let outcome = policy.run_with("broken", scripted(&[1, 2, 5]));
        assert!(!outcome.succeeded);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.result.exit_code, 5);

        let err = outcome.into_result().unwrap_err();
        assert!(matches!(
            err,
            RunkitError::RetryExhausted {
                attempts: 3,
                exit_code: 5,
                ..
            }
        ));
    }

    #[test]
    fn test_single_attempt_does_not_sleep() {
        let policy = RetryPolicy::new(1, Duration::from_secs(30)).unwrap();
        let start = Instant::now();
        let outcome = policy.run_with("once", scripted(&[1]));
        assert!(!outcome.succeeded);
        assert_eq!(outcome.attempts, 1);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_delay_between_attempts_only() {
        let policy = RetryPolicy::new(3, Duration::from_millis(100)).unwrap();
        let mut calls = Vec::new();
        let outcome = policy.run_with("broken", || {
            calls.push(Instant::now());
            TaskResult::new("broken", 1, Duration::ZERO)
        });
        let returned = Instant::now();

        assert_eq!(outcome.attempts, 3);
        assert_eq!(calls.len(), 3);
        for pair in calls.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(100));
        }
        // Returns without sleeping after the last attempt
        assert!(returned - calls[2] < Duration::from_millis(100));
    }
}
