//! stuckguard - Main CLI Entry Point

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use std::path::Path;
use stuckguard::cli::{render, run_scenario, Args, Commands, Verbosity};
use stuckguard::event_log::EventLog;
use stuckguard::EngineConfig;
use tracing_subscriber::EnvFilter;

fn init_tracing(verbosity: Verbosity) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.log_filter()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Explicit `--config` path, or the default path (created if missing)
fn load_config(args: &Args) -> Result<EngineConfig> {
    match &args.config {
        Some(path) => EngineConfig::load_from(path),
        None => EngineConfig::load(),
    }
}

fn show_config(args: &Args) -> Result<()> {
    let config = load_config(args)?;
    let source = match &args.config {
        Some(path) => path.display().to_string(),
        None => EngineConfig::config_path()?.display().to_string(),
    };

    println!("{} {}", "Configuration:".bold(), source);
    println!();
    print!("{}", config.to_toml_string()?);
    Ok(())
}

fn init_config(args: &Args, force: bool) -> Result<()> {
    let path = match &args.config {
        Some(path) => path.clone(),
        None => EngineConfig::config_path()?,
    };

    if path.exists() && !force {
        println!(
            "{} {} already exists (use --force to overwrite)",
            "Skipped:".yellow(),
            path.display()
        );
        return Ok(());
    }

    EngineConfig::default().save_to(&path)?;
    println!("{} {}", "Wrote default configuration to".green(), path.display());
    Ok(())
}

fn show_timeline(log: &Path, limit: Option<usize>) -> Result<()> {
    let events = EventLog::load(log)
        .with_context(|| format!("Could not read timeline from {}", log.display()))?;

    let start = limit.map_or(0, |n| events.len().saturating_sub(n));
    for event in &events[start..] {
        println!("{}", render::event_line(event));
    }

    if events.is_empty() {
        println!("{}", "Event log is empty".dimmed());
    }
    Ok(())
}

async fn simulate(
    args: &Args,
    scenario: stuckguard::cli::Scenario,
    ticks: u64,
    log: Option<&Path>,
) -> Result<()> {
    let config = load_config(args)?;
    let report = run_scenario(config, scenario, ticks, log).await?;

    if args.verbosity().show_ticks() {
        for tick in &report.ticks {
            let action = tick
                .attempt
                .as_ref()
                .map(|a| format!("{} {:?}", a.action, a.status))
                .unwrap_or_default();
            println!("tick {:>3}  {:<12} {}", tick.tick, render::phase_label(tick.phase), action);
        }
        println!();
    }

    print!("{}", render::simulation_summary(&report));
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbosity());

    match &args.command {
        Commands::Config => show_config(&args)?,
        Commands::InitConfig { force } => init_config(&args, *force)?,
        Commands::Timeline { log, limit } => show_timeline(log, *limit)?,
        Commands::Simulate { scenario, ticks, log } => {
            simulate(&args, *scenario, *ticks, log.as_deref()).await?
        }
    }

    Ok(())
}
