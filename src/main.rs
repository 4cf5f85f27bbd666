//! runkit - main entry point
//!
//! Parses the command line, loads the config file and hands work to the
//! engine. Exit code is 0 when everything succeeded and 1 otherwise.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tracing::{debug, error, info, warn};

use runkit::cli::{Cli, Commands};
use runkit::config::{self, ConfigMap};
use runkit::task::results_to_json;
use runkit::{
    Dispatcher, Operation, RetryPolicy, RunkitError, Task, TaskResult, WorkerPool, logging,
    measure_with, process_guard,
};

fn main() -> ExitCode {
    let cli = Cli::parse_args();
    logging::init(cli.verbose);
    debug!("CLI arguments parsed: {:?}", cli);

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => match e.downcast_ref::<RunkitError>() {
            Some(cause) => {
                if cause.is_fatal() {
                    error!("Run aborted: {:#}", e);
                } else {
                    error!("{:#}", e);
                }
                ExitCode::from(cause.exit_code())
            }
            None => {
                error!("{:#}", e);
                ExitCode::FAILURE
            }
        },
    }
}

/// Returns whether every task/item succeeded.
fn run(cli: Cli) -> Result<bool> {
    // Continue without handlers; the first Ctrl+C then just terminates
    let interrupted = match process_guard::install_interrupt_flag() {
        Ok(flag) => Some(flag),
        Err(e) => {
            warn!("Failed to install signal handlers: {}", e);
            None
        }
    };

    let config = load_config(cli.config.as_ref())?;
    for (key, value) in config.iter() {
        debug!("config {}={}", key, value);
    }

    let policy = RetryPolicy::new(cli.retries, cli.delay)?;

    match cli.command {
        Commands::Test { items } => Ok(dispatch_items(
            policy,
            &items,
            &Operation::Validate,
            interrupted,
        )),
        Commands::Dispatch { op, items } => Ok(dispatch_items(
            policy,
            &items,
            &Operation::parse(&op),
            interrupted,
        )),
        Commands::Run {
            jobs,
            json,
            commands,
        } => run_pool(jobs, json, commands, interrupted),
    }
}

/// Load the config file. The default file is seeded only when no path was
/// given and it does not exist yet.
fn load_config(explicit: Option<&PathBuf>) -> Result<ConfigMap> {
    let path = match explicit {
        Some(path) => path.clone(),
        None => {
            let path = PathBuf::from(config::DEFAULT_CONFIG_PATH);
            if config::seed_default(&path)
                .with_context(|| format!("Failed to create default config {:?}", path))?
            {
                info!("Created default config at {}", path.display());
            }
            path
        }
    };

    let map = ConfigMap::load(&path).with_context(|| format!("Failed to load config {:?}", path))?;
    info!("Loaded {} config entries from {}", map.len(), path.display());
    Ok(map)
}

fn dispatch_items(
    policy: RetryPolicy,
    items: &[String],
    operation: &Operation,
    interrupted: Option<Arc<AtomicBool>>,
) -> bool {
    let mut dispatcher = Dispatcher::new(policy);
    if let Some(flag) = interrupted {
        dispatcher = dispatcher.with_interrupt_flag(flag);
    }
    dispatcher.dispatch(items, operation).all_succeeded()
}

fn run_pool(
    jobs: usize,
    json: bool,
    commands: Vec<String>,
    interrupted: Option<Arc<AtomicBool>>,
) -> Result<bool> {
    let mut pool = WorkerPool::new(jobs)?;
    if let Some(flag) = interrupted {
        pool = pool.with_interrupt_flag(flag);
    }
    let tasks: Vec<Task> = commands.into_iter().map(Task::shell).collect();

    let label = format!("{} task(s) with {} job(s)", tasks.len(), jobs);
    let (results, _) = measure_with(
        label,
        || pool.run(tasks),
        |outcome| match outcome {
            Ok(results) if results.iter().all(TaskResult::success) => 0,
            _ => 1,
        },
    );
    let results = results.context("Worker pool aborted")?;

    if json {
        println!("{}", results_to_json(&results)?);
    } else {
        print_results(&results);
    }

    let mut all_ok = true;
    for result in &results {
        if let Err(e) = result.ensure_success() {
            error!("{}", e);
            all_ok = false;
        }
    }
    Ok(all_ok)
}

fn print_results(results: &[TaskResult]) {
    for result in results {
        let mark = if result.success() { "✓" } else { "✗" };
        println!(
            "{} [{:>3}] {:>8.3}s  {}",
            mark,
            result.exit_code,
            result.duration_secs(),
            result.command_line
        );
    }
}
