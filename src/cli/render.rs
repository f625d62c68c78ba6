//! Terminal rendering for the CLI

use crate::cli::simulate::SimulationReport;
use crate::event_log::{RecoveryEvent, TimelineStats};
use crate::recovery::{EpisodeOutcome, RecoveryPhase};
use colored::Colorize;

/// One timeline line: time, episode, type, summary
pub fn event_line(event: &RecoveryEvent) -> String {
    let kind = event.event_type();
    let kind = match event {
        RecoveryEvent::StuckDetected { .. } => kind.yellow().bold(),
        RecoveryEvent::AttemptStarted { .. } => kind.cyan(),
        RecoveryEvent::AttemptSucceeded { .. } => kind.green(),
        RecoveryEvent::AttemptFailed { .. } => kind.red(),
        RecoveryEvent::AttemptSkipped { .. } => kind.dimmed(),
        RecoveryEvent::RecoveryCompleted { outcome, .. } => match outcome {
            EpisodeOutcome::Succeeded => kind.green().bold(),
            EpisodeOutcome::Exhausted => kind.red().bold(),
            EpisodeOutcome::Fatal => kind.white().on_red().bold(),
        },
    };

    let episode = event.episode_id().to_string();
    format!(
        "{} {} {:<18} {}",
        event.timestamp().format("%H:%M:%S%.3f"),
        episode[..8].dimmed(),
        kind,
        event.summary()
    )
}

pub fn stats_block(stats: &TimelineStats) -> String {
    let mut out = String::new();
    out.push_str(&format!("{}\n", "Statistics:".bold()));
    out.push_str(&format!("  Detections:        {}\n", stats.detections));
    out.push_str(&format!(
        "  Attempts:          {} started, {} succeeded, {} failed, {} skipped\n",
        stats.attempts_started, stats.attempts_succeeded, stats.attempts_failed, stats.attempts_skipped
    ));
    out.push_str(&format!(
        "  Attempt success:   {:.1}%\n",
        stats.attempt_success_rate() * 100.0
    ));
    out.push_str(&format!(
        "  Episodes:          {} succeeded, {} exhausted, {} fatal\n",
        stats.episodes_succeeded, stats.episodes_exhausted, stats.episodes_fatal
    ));
    out
}

pub fn phase_label(phase: RecoveryPhase) -> String {
    let name = phase.display_name();
    match phase {
        RecoveryPhase::Idle => name.green().to_string(),
        RecoveryPhase::Detecting => name.yellow().to_string(),
        RecoveryPhase::Recovering => name.cyan().to_string(),
        RecoveryPhase::Succeeded => name.green().bold().to_string(),
        RecoveryPhase::Exhausted => name.red().bold().to_string(),
        RecoveryPhase::Fatal => name.white().on_red().bold().to_string(),
    }
}

pub fn simulation_summary(report: &SimulationReport) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{} {} ({} ticks)\n\n",
        "Scenario:".bold(),
        report.scenario,
        report.ticks.len()
    ));

    for event in &report.events {
        out.push_str(&event_line(event));
        out.push('\n');
    }
    if report.events.is_empty() {
        out.push_str(&format!("{}\n", "No stuck episodes".green()));
    }

    out.push('\n');
    out.push_str(&format!("Final phase:     {}\n", phase_label(report.final_phase)));
    if let Some(pos) = report.final_position {
        out.push_str(&format!("Final position:  {}\n", pos));
    }
    out.push('\n');
    out.push_str(&stats_block(&report.stats));
    out
}
