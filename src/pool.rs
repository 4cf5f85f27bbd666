//! Bounded worker pool for child processes.
//!
//! The scheduler keeps at most `max_jobs` children alive. While the active set
//! is full it probes every child with a non-blocking status query, reaps the
//! ones that have exited, and sleeps a short poll interval if nothing freed
//! up. Once the queue is empty the remaining children are polled the same way
//! until every one has been reaped, so each result carries its own runtime.
//!
//! Launch order is FIFO. Completion order is whatever the children do. An
//! interrupt flag stops further launches; children already running are left
//! to finish.

use crate::error::{Result, RunkitError};
use crate::task::{Task, TaskResult, exit_code_of};
use std::collections::VecDeque;
use std::process::{Child, ExitStatus};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Sleep between liveness scans while the pool is full.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct WorkerPool {
    max_jobs: usize,
    poll_interval: Duration,
    interrupted: Option<Arc<AtomicBool>>,
}

impl WorkerPool {
    pub fn new(max_jobs: usize) -> Result<Self> {
        if max_jobs == 0 {
            return Err(RunkitError::validation("max_jobs must be at least 1"));
        }
        Ok(Self {
            max_jobs,
            poll_interval: DEFAULT_POLL_INTERVAL,
            interrupted: None,
        })
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Stop launching queued tasks once `flag` is set.
    pub fn with_interrupt_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupted = Some(flag);
        self
    }

    pub fn max_jobs(&self) -> usize {
        self.max_jobs
    }

    /// Run every task and return one result per task.
    ///
    /// A task exiting non-zero is just a result. The errors are failing to
    /// spawn a child at all, failing to query a child's status, and being
    /// interrupted; each one stops new launches, waits for what is already
    /// running, and is returned.
    pub fn run(&self, tasks: Vec<Task>) -> Result<Vec<TaskResult>> {
        self.run_observed(tasks, |_| {})
    }

    /// Like [`run`](Self::run), calling `observe` after every launch and
    /// every liveness scan.
    pub fn run_observed<F>(&self, tasks: Vec<Task>, mut observe: F) -> Result<Vec<TaskResult>>
    where
        F: FnMut(&PoolSnapshot),
    {
        let mut state = PoolState::new(tasks);
        info!(
            "Starting pool: {} task(s), max {} concurrent",
            state.submitted, self.max_jobs
        );

        if let Err(e) = self.schedule(&mut state, &mut observe) {
            error!("Pool aborted: {}", e);
            if !state.running.is_empty() {
                warn!(
                    "Waiting for {} running task(s) before returning",
                    state.running.len()
                );
            }
            state.drain(self.poll_interval);
            return Err(e);
        }

        state.drain(self.poll_interval);
        observe(&state.snapshot());
        state.check_invariants(self.max_jobs);

        let failed = state.completed.iter().filter(|r| !r.success()).count();
        info!(
            "Pool finished: {} task(s), {} failed",
            state.completed.len(),
            failed
        );
        Ok(state.completed)
    }

    fn schedule<F>(&self, state: &mut PoolState, observe: &mut F) -> Result<()>
    where
        F: FnMut(&PoolSnapshot),
    {
        while !state.queued.is_empty() {
            while state.running.len() >= self.max_jobs {
                let reaped = state.reap_finished()?;
                state.check_invariants(self.max_jobs);
                observe(&state.snapshot());
                if reaped == 0 {
                    std::thread::sleep(self.poll_interval);
                }
            }

            if self.is_interrupted() {
                warn!(
                    "Interrupted, not launching {} queued task(s)",
                    state.queued.len()
                );
                return Err(RunkitError::Interrupted {
                    not_started: state.queued.len(),
                });
            }

            if let Some(task) = state.queued.pop_front() {
                state.launch(task)?;
                state.check_invariants(self.max_jobs);
                observe(&state.snapshot());
            }
        }
        Ok(())
    }

    fn is_interrupted(&self) -> bool {
        self.interrupted
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }
}

/// Point-in-time view of the pool, handed to observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSnapshot {
    pub running_pids: Vec<u32>,
    pub queued: usize,
    pub completed: usize,
    pub submitted: usize,
}

struct Running {
    task: Task,
    child: Child,
    started: Instant,
}

impl Running {
    fn finish(self, status: ExitStatus) -> TaskResult {
        let result = TaskResult::new(
            self.task.command_line(),
            exit_code_of(status),
            self.started.elapsed(),
        );
        log_completion(self.child.id(), &result);
        result
    }
}

struct PoolState {
    running: Vec<Running>,
    queued: VecDeque<Task>,
    completed: Vec<TaskResult>,
    submitted: usize,
}

impl PoolState {
    fn new(tasks: Vec<Task>) -> Self {
        let submitted = tasks.len();
        Self {
            running: Vec::new(),
            queued: tasks.into(),
            completed: Vec::with_capacity(submitted),
            submitted,
        }
    }

    fn launch(&mut self, task: Task) -> Result<()> {
        let child = match task.spawn() {
            Ok(child) => child,
            Err(source) => {
                return Err(RunkitError::TaskSpawnFailure {
                    command: task.command_line(),
                    source,
                });
            }
        };
        info!("[{}] launched: {}", child.id(), task);
        self.running.push(Running {
            task,
            child,
            started: Instant::now(),
        });
        Ok(())
    }

    /// Probe every running child once, reaping the ones that exited.
    fn reap_finished(&mut self) -> Result<usize> {
        let mut reaped = 0;
        let mut i = 0;
        while i < self.running.len() {
            match self.running[i].child.try_wait()? {
                Some(status) => {
                    let done = self.running.swap_remove(i);
                    self.completed.push(done.finish(status));
                    reaped += 1;
                }
                None => i += 1,
            }
        }
        if reaped == 0 {
            debug!("{} task(s) still running", self.running.len());
        }
        Ok(reaped)
    }

    /// Poll until every remaining child has been reaped.
    fn drain(&mut self, poll_interval: Duration) {
        while !self.running.is_empty() {
            match self.reap_finished() {
                Ok(0) => std::thread::sleep(poll_interval),
                Ok(_) => {}
                Err(e) => {
                    error!("Status query failed while draining: {}", e);
                    self.wait_remaining();
                }
            }
        }
    }

    /// Block on every remaining child in turn.
    fn wait_remaining(&mut self) {
        for mut running in self.running.drain(..) {
            match running.child.wait() {
                Ok(status) => self.completed.push(running.finish(status)),
                Err(e) => {
                    error!("[{}] failed to wait: {}", running.child.id(), e);
                    self.completed.push(TaskResult::new(
                        running.task.command_line(),
                        -1,
                        running.started.elapsed(),
                    ));
                }
            }
        }
    }

    fn snapshot(&self) -> PoolSnapshot {
        PoolSnapshot {
            running_pids: self.running.iter().map(|r| r.child.id()).collect(),
            queued: self.queued.len(),
            completed: self.completed.len(),
            submitted: self.submitted,
        }
    }

    fn check_invariants(&self, max_jobs: usize) {
        debug_assert!(self.running.len() <= max_jobs);
        debug_assert_eq!(
            self.running.len() + self.queued.len() + self.completed.len(),
            self.submitted
        );
    }
}

fn log_completion(pid: u32, result: &TaskResult) {
    if result.success() {
        info!(
            "[{}] done in {:.3}s: {}",
            pid,
            result.duration_secs(),
            result.command_line
        );
    } else {
        warn!(
            "[{}] exited with status {} after {:.3}s: {}",
            pid,
            result.exit_code,
            result.duration_secs(),
            result.command_line
        );
    }
}
