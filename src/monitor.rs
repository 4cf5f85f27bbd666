//! Wall-clock timing of task invocations.

use crate::retry::{RetryOutcome, RetryPolicy};
use crate::task::{Task, TaskResult};
use std::time::Instant;
use tracing::info;

/// Run `task` synchronously and time it.
///
/// The child's own exit status is reported unchanged.
pub fn monitor(task: &Task) -> TaskResult {
    let command_line = task.command_line();
    measure(command_line, || crate::task::run_to_exit_code(task))
}

/// Time any invocation that reduces to an exit code.
pub fn measure<F>(command_line: impl Into<String>, invoke: F) -> TaskResult
where
    F: FnOnce() -> i32,
{
    measure_with(command_line, invoke, |code: &i32| *code).1
}

/// Time a retried invocation. The returned result spans every attempt and
/// every delay between them.
pub fn monitor_retry(policy: &RetryPolicy, task: &Task) -> (RetryOutcome, TaskResult) {
    measure_with(
        task.command_line(),
        || policy.run(task),
        |outcome| outcome.result.exit_code,
    )
}

/// Time an invocation that returns a richer value; `exit_code` reduces that
/// value to the status reported in the [`TaskResult`].
pub fn measure_with<T, F, C>(command_line: impl Into<String>, invoke: F, exit_code: C) -> (T, TaskResult)
where
    F: FnOnce() -> T,
    C: FnOnce(&T) -> i32,
{
    let command_line = command_line.into();
    let start = Instant::now();
    let value = invoke();
    let result = TaskResult::new(command_line, exit_code(&value), start.elapsed());
    info!(
        "`{}` finished in {:.3}s with status {}",
        result.command_line,
        result.duration_secs(),
        result.exit_code
    );
    (value, result)
}
