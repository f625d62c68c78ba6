//! CLI module for stuckguard
//!
//! Handles argument parsing, dry-run simulation and terminal rendering.

pub mod args;
pub mod render;
pub mod simulate;

pub use args::{Args, Commands, Scenario, Verbosity};
pub use simulate::{run_scenario, SimulationReport};
