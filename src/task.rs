//! Task descriptors and their results.
//!
//! A [`Task`] is only a description: program plus arguments. Whoever launches
//! it owns the resulting child handle and is responsible for reaping it.

use crate::error::{Result, RunkitError};
use crate::process_guard::CommandProcessGroup;
use serde::Serialize;
use std::fmt;
use std::os::unix::process::ExitStatusExt;
use std::process::{Child, Command, ExitStatus};
use std::time::Duration;

/// Exit code reported when the program could not be found.
pub const EXIT_NOT_FOUND: i32 = 127;
/// Exit code reported when the program exists but could not be executed.
pub const EXIT_CANNOT_EXECUTE: i32 = 126;

/// An external command to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    program: String,
    args: Vec<String>,
}

impl Task {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Run `line` through `sh -c`.
    pub fn shell(line: impl Into<String>) -> Self {
        Self::new("sh", ["-c".to_string(), line.into()])
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Human-readable command line, used in logs and reports.
    pub fn command_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                line.push('\'');
                line.push_str(arg);
                line.push('\'');
            } else {
                line.push_str(arg);
            }
        }
        line
    }

    /// Launch the task detached in its own process group.
    ///
    /// Stdio is inherited; the engine only looks at the exit status.
    pub fn spawn(&self) -> std::io::Result<Child> {
        Command::new(&self.program)
            .args(&self.args)
            .in_new_process_group()
            .spawn()
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command_line())
    }
}

/// Outcome of one finished task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskResult {
    pub command_line: String,
    pub exit_code: i32,
    #[serde(rename = "duration_secs", serialize_with = "serialize_secs")]
    pub duration: Duration,
}

impl TaskResult {
    pub fn new(command_line: impl Into<String>, exit_code: i32, duration: Duration) -> Self {
        Self {
            command_line: command_line.into(),
            exit_code,
            duration,
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn duration_secs(&self) -> f64 {
        self.duration.as_secs_f64()
    }

    /// Turn a non-zero exit into [`RunkitError::TaskNonZeroExit`].
    pub fn ensure_success(&self) -> Result<()> {
        if self.success() {
            Ok(())
        } else {
            Err(RunkitError::TaskNonZeroExit {
                command: self.command_line.clone(),
                exit_code: self.exit_code,
            })
        }
    }
}

fn serialize_secs<S: serde::Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

/// Render results as a pretty-printed JSON array.
pub fn results_to_json(results: &[TaskResult]) -> Result<String> {
    Ok(serde_json::to_string_pretty(results)?)
}

/// Map an exit status to a single integer.
///
/// Signal-terminated children report `128 + signal`, as a shell would.
pub fn exit_code_of(status: ExitStatus) -> i32 {
    match (status.code(), status.signal()) {
        (Some(code), _) => code,
        (None, Some(sig)) => 128 + sig,
        (None, None) => -1,
    }
}

/// Exit code a shell would report for a spawn error.
pub fn exit_code_for_spawn_error(err: &std::io::Error) -> i32 {
    match err.kind() {
        std::io::ErrorKind::NotFound => EXIT_NOT_FOUND,
        _ => EXIT_CANNOT_EXECUTE,
    }
}

/// Spawn and block until the task exits. Spawn errors are folded into the
/// returned code.
pub(crate) fn run_to_exit_code(task: &Task) -> i32 {
    let mut child = match task.spawn() {
        Ok(child) => child,
        Err(e) => {
            tracing::error!("Failed to spawn `{}`: {}", task, e);
            return exit_code_for_spawn_error(&e);
        }
    };
    match child.wait() {
        Ok(status) => exit_code_of(status),
        Err(e) => {
            tracing::error!("Failed waiting for `{}`: {}", task, e);
            -1
        }
    }
}
