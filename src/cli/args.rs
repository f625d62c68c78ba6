//! Command-line argument parsing for stuckguard
//!
//! Provides clap-based CLI with subcommands and verbosity control.

use clap::{Parser, Subcommand, ValueEnum};
use std::fmt;
use std::path::PathBuf;

/// stuckguard - Stuck detection and laddered recovery for automation bots
#[derive(Parser, Debug)]
#[command(name = "stuckguard")]
#[command(version)]
#[command(about = "Detect a stuck character and climb a recovery ladder", long_about = None)]
pub struct Args {
    /// Configuration file path (defaults to ~/.stuckguard/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbosity level: -q (quiet), default (normal), -v (verbose), -vv (very verbose)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Subcommand
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Commands {
    /// Print the effective, validated configuration
    Config,

    /// Write the default configuration to the config path
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Render a JSONL recovery event log
    Timeline {
        /// Event log file
        #[arg(value_name = "LOG")]
        log: PathBuf,

        /// Show only the most recent N events
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Run the engine against a simulated character
    Simulate {
        /// Situation to simulate
        #[arg(short, long, value_enum, default_value_t = Scenario::Stationary)]
        scenario: Scenario,

        /// Number of ticks to run
        #[arg(short, long, default_value_t = 30)]
        ticks: u64,

        /// Also append events to this JSONL file
        #[arg(long)]
        log: Option<PathBuf>,
    },
}

/// Simulated situations
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Scenario {
    /// Character stands still; the first jitter frees it
    Stationary,

    /// Character bounces between two points against a wall
    Oscillation,

    /// Local movement is blocked until the mount toggles
    Wall,

    /// Nothing works, including logout
    Unrecoverable,
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Scenario::Stationary => "stationary",
            Scenario::Oscillation => "oscillation",
            Scenario::Wall => "wall",
            Scenario::Unrecoverable => "unrecoverable",
        };
        f.write_str(s)
    }
}

/// Verbosity level enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Verbose,
    VeryVerbose,
}

impl Args {
    /// Get verbosity level based on flags
    pub fn verbosity(&self) -> Verbosity {
        if self.quiet {
            Verbosity::Quiet
        } else {
            match self.verbose {
                0 => Verbosity::Normal,
                1 => Verbosity::Verbose,
                _ => Verbosity::VeryVerbose,
            }
        }
    }
}

impl Verbosity {
    /// Default tracing filter for this level; `RUST_LOG` overrides it
    pub fn log_filter(&self) -> &'static str {
        match self {
            Verbosity::Quiet => "error",
            Verbosity::Normal => "stuckguard=warn",
            Verbosity::Verbose => "stuckguard=info",
            Verbosity::VeryVerbose => "stuckguard=debug",
        }
    }

    /// Check if should print per-tick lines
    pub fn show_ticks(&self) -> bool {
        matches!(self, Verbosity::Verbose | Verbosity::VeryVerbose)
    }
}
