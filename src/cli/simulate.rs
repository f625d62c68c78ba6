//! Scripted dry runs of the engine against [`SimulatedMovement`]
//!
//! Time is a [`ManualClock`] advanced one second per tick (plus two seconds
//! per collaborator call), so a run finishes instantly.

use crate::cli::args::Scenario;
use crate::clock::ManualClock;
use crate::config::EngineConfig;
use crate::engine::{RecoveryEngine, TickReport};
use crate::event_log::{EventLog, RecoveryEvent, TimelineStats};
use crate::recovery::{EpisodeOutcome, RecoveryAction, RecoveryPhase};
use crate::sim::SimulatedMovement;
use crate::types::Position;
use anyhow::Result;
use std::path::Path;
use std::sync::Arc;

/// Result of a dry run
#[derive(Debug, Clone)]
pub struct SimulationReport {
    pub scenario: Scenario,
    pub ticks: Vec<TickReport>,
    pub outcomes: Vec<EpisodeOutcome>,
    pub final_phase: RecoveryPhase,
    pub final_position: Option<Position>,
    pub events: Vec<RecoveryEvent>,
    pub stats: TimelineStats,
}

/// Wire a simulated character for `scenario`
fn character(scenario: Scenario, clock: &ManualClock) -> SimulatedMovement {
    let start = match scenario {
        Scenario::Oscillation => Position::new(0.0, 0.0),
        _ => Position::new(100.0, 100.0),
    };
    let sim = SimulatedMovement::at(start).with_clock(clock.clone(), 2);

    match scenario {
        Scenario::Stationary => {}
        Scenario::Oscillation => {
            sim.block_movement(true);
            sim.unblock_on(RecoveryAction::MountToggle);
        }
        Scenario::Wall => {
            sim.block_movement(true);
            sim.unblock_on(RecoveryAction::FaceCameraRescan);
        }
        Scenario::Unrecoverable => {
            sim.block_movement(true);
            for action in [
                RecoveryAction::NavmeshWaypoint,
                RecoveryAction::ShuttleFallback,
                RecoveryAction::SafeLogout,
            ] {
                sim.fail_action(action, true);
            }
        }
    }
    sim
}

/// Run `scenario` for `ticks` ticks
pub async fn run_scenario(
    config: EngineConfig,
    scenario: Scenario,
    ticks: u64,
    log_path: Option<&Path>,
) -> Result<SimulationReport> {
    let clock = ManualClock::starting_now();
    let sim = character(scenario, &clock);

    let capacity = config.event_log.timeline_capacity;
    let log = match log_path {
        Some(path) => EventLog::open(path, capacity)?,
        None => EventLog::in_memory(capacity),
    };

    let mut engine =
        RecoveryEngine::new(config, Arc::new(sim.clone()), Arc::new(clock.clone()), log)?;

    let mut reports = Vec::new();
    let mut outcomes = Vec::new();
    let mut freed = false;

    for tick in 0..ticks {
        feed(&mut engine, &sim, scenario, tick, freed);

        let report = engine.tick().await;
        if let Some(outcome) = report.outcome {
            outcomes.push(outcome);
            freed |= outcome == EpisodeOutcome::Succeeded;
        }
        reports.push(report);
        clock.advance_secs(1);
    }

    Ok(SimulationReport {
        scenario,
        ticks: reports,
        outcomes,
        final_phase: engine.phase(),
        final_position: sim.position(),
        events: engine.get_recovery_timeline(None),
        stats: engine.event_log().stats(),
    })
}

/// Telemetry for one tick; a freed character walks east
fn feed(
    engine: &mut RecoveryEngine,
    sim: &SimulatedMovement,
    scenario: Scenario,
    tick: u64,
    freed: bool,
) {
    if freed {
        let pos = sim.position().unwrap_or_default();
        let next = Position::new(pos.x + 10.0, pos.y);
        sim.set_position(next);
        engine.update_coordinates(next.x, next.y);
        engine.record_path_point(next.x, next.y);
        return;
    }

    match scenario {
        Scenario::Oscillation if !engine.is_recovering() => {
            let x = if tick % 2 == 0 { 0.0 } else { 10.0 };
            engine.update_coordinates(x, 0.0);
            engine.record_path_point(x, 0.0);
        }
        _ => {
            if let Some(pos) = sim.position() {
                engine.update_coordinates(pos.x, pos.y);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stationary_recovers_with_jitter() {
        let report = run_scenario(EngineConfig::default(), Scenario::Stationary, 20, None)
            .await
            .unwrap();

        assert_eq!(report.outcomes, vec![EpisodeOutcome::Succeeded]);
        assert_eq!(report.stats.attempts_started, 1);
        assert_eq!(report.final_phase, RecoveryPhase::Idle);
    }

    #[tokio::test]
    async fn test_oscillation_needs_mount() {
        let report = run_scenario(EngineConfig::default(), Scenario::Oscillation, 20, None)
            .await
            .unwrap();

        assert_eq!(report.outcomes, vec![EpisodeOutcome::Succeeded]);
        let detected = report.ticks.iter().find_map(|t| t.detection.clone()).unwrap();
        assert_eq!(detected.stuck_type, crate::detection::StuckType::PathOscillation);
        assert_eq!(report.stats.attempts_failed, 1);
        assert_eq!(report.stats.attempts_succeeded, 1);
    }

    #[tokio::test]
    async fn test_wall_needs_camera() {
        let report = run_scenario(EngineConfig::default(), Scenario::Wall, 20, None)
            .await
            .unwrap();

        assert_eq!(report.outcomes, vec![EpisodeOutcome::Succeeded]);
        assert_eq!(report.stats.attempts_failed, 2);
    }

    #[tokio::test]
    async fn test_unrecoverable_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sim.jsonl");
        let report = run_scenario(
            EngineConfig::default(),
            Scenario::Unrecoverable,
            30,
            Some(&path),
        )
        .await
        .unwrap();

        assert_eq!(report.outcomes, vec![EpisodeOutcome::Fatal]);
        assert_eq!(report.final_phase, RecoveryPhase::Fatal);
        assert_eq!(EventLog::load(&path).unwrap().len(), report.events.len());
    }
}
