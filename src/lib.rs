//! runkit library
//!
//! Runs external tasks with bounded concurrency, retries failing tasks with a
//! fixed delay, times execution, and dispatches per-item operations.

pub mod cli;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod monitor;
pub mod pool;
pub mod process_guard;
pub mod retry;
pub mod task;

// Re-export main types for convenience
pub use config::ConfigMap;
pub use dispatch::{DispatchReport, Dispatcher, ItemOutcome, ItemStatus, Operation};
pub use error::RunkitError;
pub use monitor::{measure, measure_with, monitor, monitor_retry};
pub use pool::{PoolSnapshot, WorkerPool};
pub use process_guard::{CommandProcessGroup, TempScope};
pub use retry::{RetryOutcome, RetryPolicy};
pub use task::{Task, TaskResult};
