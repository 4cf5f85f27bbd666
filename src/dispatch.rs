//! Per-item operation dispatcher.
//!
//! Every item is handled on its own, in input order, through the retry policy.
//! A failing item never stops the ones after it.

use crate::error::RunkitError;
use crate::monitor::monitor_retry;
use crate::process_guard::TempScope;
use crate::retry::{RetryOutcome, RetryPolicy};
use crate::task::Task;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use strum::EnumString;
use tracing::{error, info, warn};

/// Suffix appended to backup copies.
pub const DEFAULT_BACKUP_SUFFIX: &str = ".bak";

const PARTIAL_SUFFIX: &str = ".partial";

/// What to do with each item.
#[derive(Debug, Clone, PartialEq, Eq, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Operation {
    /// Check that a path named by the item exists
    Validate,
    /// Copy the item next to itself with the backup suffix
    Backup,
    /// Anything else; logged and skipped
    #[strum(default)]
    Unknown(String),
}

impl Operation {
    /// Parse an operation name. Unrecognised names become [`Operation::Unknown`].
    pub fn parse(name: &str) -> Self {
        name.parse()
            .unwrap_or_else(|_| Operation::Unknown(name.to_string()))
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Validate => f.write_str("validate"),
            Operation::Backup => f.write_str("backup"),
            Operation::Unknown(name) => f.write_str(name),
        }
    }
}

/// How a single item ended.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemStatus {
    Succeeded(RetryOutcome),
    Failed(RetryOutcome),
    /// The task succeeded but its result could not be put in place
    Error(String),
    /// Unknown operation or interrupted run
    Skipped(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ItemOutcome {
    pub item: String,
    pub status: ItemStatus,
    /// Wall-clock time across every attempt and delay; zero when skipped.
    pub duration: Duration,
}

/// Per-item outcomes, in input order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchReport {
    entries: Vec<ItemOutcome>,
}

impl DispatchReport {
    pub fn entries(&self) -> &[ItemOutcome] {
        &self.entries
    }

    pub fn succeeded(&self) -> usize {
        self.count(|s| matches!(s, ItemStatus::Succeeded(_)))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, ItemStatus::Failed(_) | ItemStatus::Error(_)))
    }

    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, ItemStatus::Skipped(_)))
    }

    /// True when nothing failed. Skipped items do not count as failures.
    pub fn all_succeeded(&self) -> bool {
        self.failed() == 0
    }

    fn count(&self, pred: impl Fn(&ItemStatus) -> bool) -> usize {
        self.entries.iter().filter(|e| pred(&e.status)).count()
    }
}

pub struct Dispatcher {
    policy: RetryPolicy,
    backup_suffix: String,
    interrupted: Option<Arc<AtomicBool>>,
}

impl Dispatcher {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            backup_suffix: DEFAULT_BACKUP_SUFFIX.to_string(),
            interrupted: None,
        }
    }

    pub fn with_backup_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.backup_suffix = suffix.into();
        self
    }

    /// Stop starting new items once `flag` is set.
    pub fn with_interrupt_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupted = Some(flag);
        self
    }

    pub fn dispatch(&self, items: &[String], operation: &Operation) -> DispatchReport {
        let mut report = DispatchReport::default();
        for item in items {
            let (status, duration) = if self.is_interrupted() {
                warn!("Interrupted, skipping {}", item);
                (ItemStatus::Skipped("interrupted".to_string()), Duration::ZERO)
            } else {
                self.handle(item, operation)
            };
            report.entries.push(ItemOutcome {
                item: item.clone(),
                status,
                duration,
            });
        }
        info!(
            "{}: {} succeeded, {} failed, {} skipped",
            operation,
            report.succeeded(),
            report.failed(),
            report.skipped()
        );
        report
    }

    fn is_interrupted(&self) -> bool {
        self.interrupted
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    fn handle(&self, item: &str, operation: &Operation) -> (ItemStatus, Duration) {
        match operation {
            Operation::Validate => self.validate(item),
            Operation::Backup => self.backup(item),
            Operation::Unknown(name) => {
                warn!("{} (item {})", RunkitError::UnknownOperation(name.clone()), item);
                (
                    ItemStatus::Skipped(format!("unknown operation: {name}")),
                    Duration::ZERO,
                )
            }
        }
    }

    fn validate(&self, item: &str) -> (ItemStatus, Duration) {
        let (outcome, timed) = monitor_retry(&self.policy, &Task::new("test", ["-e", item]));
        let status = if outcome.succeeded {
            info!("{} exists", item);
            ItemStatus::Succeeded(outcome)
        } else {
            error!("{} does not exist after {} attempt(s)", item, outcome.attempts);
            ItemStatus::Failed(outcome)
        };
        (status, timed.duration)
    }

    fn backup(&self, item: &str) -> (ItemStatus, Duration) {
        let target = PathBuf::from(format!("{item}{}", self.backup_suffix));
        let mut scope = TempScope::new();
        let partial = scope.track(format!("{item}{}{PARTIAL_SUFFIX}", self.backup_suffix));

        let copy = Task::new(
            "cp",
            [
                "-p".to_string(),
                "--".to_string(),
                item.to_string(),
                partial.to_string_lossy().into_owned(),
            ],
        );
        let (outcome, timed) = monitor_retry(&self.policy, &copy);
        if !outcome.succeeded {
            error!("Backup of {} failed after {} attempt(s)", item, outcome.attempts);
            return (ItemStatus::Failed(outcome), timed.duration);
        }

        if let Err(e) = std::fs::rename(&partial, &target) {
            error!("Could not move backup into place at {}: {}", target.display(), e);
            return (
                ItemStatus::Error(format!("commit failed: {e}")),
                timed.duration,
            );
        }
        scope.release(&partial);
        info!("Backed up {} to {}", item, target.display());
        (ItemStatus::Succeeded(outcome), timed.duration)
    }
}
