use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

/// runkit - run external tasks with bounded concurrency and retries
#[derive(Parser, Debug)]
#[command(name = "runkit")]
#[command(about = "Run external tasks with bounded concurrency, fixed-delay retries and timing")]
#[command(version)]
pub struct Cli {
    /// Verbose output (debug-level logging)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Delay between retry attempts, in seconds
    #[arg(short, long, global = true, value_name = "SECONDS", default_value = "2", value_parser = parse_seconds)]
    pub delay: Duration,

    /// Attempts per item before giving up
    #[arg(short, long, global = true, default_value_t = 3)]
    pub retries: u32,

    /// Config file (KEY=VALUE lines). A default one is created when omitted.
    #[arg(short, long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Commands {
    /// Check that every item exists as a path
    Test {
        /// Paths to check
        items: Vec<String>,
    },
    /// Run shell command lines through the worker pool
    Run {
        /// Maximum number of tasks running at once
        #[arg(short, long, default_value_t = 4)]
        jobs: usize,

        /// Print per-task results as JSON on stdout
        #[arg(long)]
        json: bool,

        /// Command lines, each run with `sh -c`
        #[arg(required = true)]
        commands: Vec<String>,
    },
    /// Apply an operation (validate, backup) to every item
    Dispatch {
        /// Operation name
        #[arg(short, long)]
        op: String,

        /// Items to process, in order
        items: Vec<String>,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

fn parse_seconds(s: &str) -> Result<Duration, String> {
    let secs: f64 = s
        .parse()
        .map_err(|_| format!("`{s}` is not a number of seconds"))?;
    Duration::try_from_secs_f64(secs).map_err(|_| format!("`{s}` is not a valid delay"))
}
