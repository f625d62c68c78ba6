//! Recovery episode execution
//!
//! One episode at a time. Each `step` executes at most one action, so the
//! caller's tick cadence bounds how fast the ladder is climbed. Skipped
//! (cooling down) candidates are recorded but do not consume the attempt
//! budget.

use crate::actions::{ActionRunner, MovementController};
use crate::clock::Clock;
use crate::config::{ActionProfile, EngineConfig};
use crate::detection::{StuckDetection, StuckType};
use crate::event_log::{EventLog, RecoveryEvent};
use crate::recovery::cooldown::CooldownTracker;
use crate::recovery::phase::{PhaseEvent, RecoveryPhase};
use crate::recovery::playbook::PlaybookSelector;
use crate::recovery::types::{
    AttemptStatus, EpisodeOutcome, RecoveryAction, RecoveryAttempt, RecoveryState,
};
use crate::types::Position;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Summary of the most recently finished episode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeSummary {
    pub episode_id: Uuid,
    pub stuck_type: Option<StuckType>,
    pub outcome: EpisodeOutcome,
    pub attempts: usize,
    pub reason: String,
    pub ended_at: DateTime<Utc>,

    /// Position reported after the last executed attempt
    pub final_position: Option<Position>,
}

/// Runs playbooks against the movement collaborator
pub struct RecoveryExecutor {
    selector: PlaybookSelector,
    cooldowns: CooldownTracker,
    runner: ActionRunner,
    profiles: HashMap<RecoveryAction, ActionProfile>,
    clock: Arc<dyn Clock>,
    log: EventLog,
    max_attempts: usize,
    phase: RecoveryPhase,
    state: RecoveryState,
    last_position: Option<Position>,
    last_episode: Option<EpisodeSummary>,
}

impl RecoveryExecutor {
    /// Create executor from a validated config
    pub fn new(
        config: &EngineConfig,
        movement: Arc<dyn MovementController>,
        clock: Arc<dyn Clock>,
        log: EventLog,
    ) -> Self {
        let recovery = &config.recovery;
        let profiles = RecoveryAction::ladder()
            .into_iter()
            .map(|a| (a, config.action_profile(a)))
            .collect();

        Self {
            selector: PlaybookSelector::new(
                recovery.playbook,
                config.playbooks.clone(),
                recovery.universal_fallback,
            ),
            cooldowns: CooldownTracker::new(recovery),
            runner: ActionRunner::new(
                movement,
                config.navmesh_waypoints.clone(),
                recovery.success_displacement,
            ),
            profiles,
            clock,
            log,
            max_attempts: recovery.max_recovery_attempts,
            phase: RecoveryPhase::Idle,
            state: RecoveryState::default(),
            last_position: None,
            last_episode: None,
        }
    }

    /// Start an episode for `detection`
    ///
    /// Returns false without side effects while an episode is running or
    /// the engine is latched in Fatal. A finished Succeeded/Exhausted
    /// episode that has not settled yet does not block a new one.
    pub fn start_recovery(&mut self, detection: StuckDetection) -> bool {
        if !self.state.is_recovering {
            self.settle();
        }
        if self.state.is_recovering || !self.phase.accepts_detection() {
            debug!(
                phase = self.phase.display_name(),
                stuck_type = %detection.stuck_type,
                "Detection ignored, recovery not accepting episodes"
            );
            return false;
        }

        let now = self.clock.now();
        let selection = self
            .selector
            .select(detection.stuck_type, &self.cooldowns, now);

        self.advance_phase(PhaseEvent::StuckConfirmed);
        self.state = RecoveryState::begin(detection.clone(), selection.actions.clone(), now);
        self.last_position = detection.coordinates;
        let episode_id = self.episode_id();

        info!(
            episode = %episode_id,
            stuck_type = %detection.stuck_type,
            confidence = detection.confidence,
            candidates = selection.actions.len(),
            "Stuck detected, starting recovery"
        );
        self.log.record(RecoveryEvent::StuckDetected {
            timestamp: now,
            episode_id,
            detection,
        });

        if selection.used_fallback && !selection.actions.is_empty() {
            warn!(
                episode = %episode_id,
                fallback = %self.selector.universal_fallback(),
                "Every playbook action is cooling down, using universal fallback"
            );
        }

        if selection.actions.is_empty() {
            self.complete_recovery(EpisodeOutcome::Exhausted, "all actions cooling down");
        }

        true
    }

    /// Execute the next candidate, if an episode is running
    ///
    /// Returns the attempt executed during this step. Skipped candidates
    /// are recorded in the history but never returned.
    pub async fn step(&mut self) -> Option<RecoveryAttempt> {
        if !self.state.is_recovering {
            return None;
        }
        self.try_next_action().await
    }

    async fn try_next_action(&mut self) -> Option<RecoveryAttempt> {
        loop {
            if self.state.attempts_executed() >= self.max_attempts {
                self.complete_recovery(EpisodeOutcome::Exhausted, "attempt cap reached");
                return None;
            }

            let Some(action) = self.state.remaining_actions.pop_front() else {
                self.complete_recovery(EpisodeOutcome::Exhausted, "playbook exhausted");
                return None;
            };

            let now = self.clock.now();
            if !self.cooldowns.is_ready(action, now) {
                self.skip_action(action, now);
                continue;
            }

            let attempt = self.execute_recovery_action(action).await;
            self.after_attempt(&attempt);
            return Some(attempt);
        }
    }

    fn skip_action(&mut self, action: RecoveryAction, now: DateTime<Utc>) {
        let until = self.cooldowns.cooldown_until(action).unwrap_or(now);
        let mut attempt = RecoveryAttempt::pending(action);
        attempt.skip(now, until);

        debug!(
            episode = %self.episode_id(),
            action = %action,
            cooldown_until = %until,
            "Skipping action still cooling down"
        );
        self.log.record(RecoveryEvent::AttemptSkipped {
            timestamp: now,
            episode_id: self.episode_id(),
            attempt: attempt.clone(),
        });
        self.state.recovery_history.push(attempt);
    }

    /// Run one action and set its cooldown
    pub async fn execute_recovery_action(&mut self, action: RecoveryAction) -> RecoveryAttempt {
        let profile = self.profile(action);
        let episode_id = self.episode_id();

        let mut attempt = RecoveryAttempt::pending(action);
        let started = self.clock.now();
        attempt.start(started);
        self.state.current_attempt = Some(attempt.clone());

        info!(
            episode = %episode_id,
            action = %action,
            attempt = self.state.attempts_executed() + 1,
            max = self.max_attempts,
            "Recovery attempt started"
        );
        self.log.record(RecoveryEvent::AttemptStarted {
            timestamp: started,
            episode_id,
            attempt: attempt.clone(),
        });

        let report = self.runner.run(&profile, self.last_position).await;
        let finished = self.clock.now();
        if report.position_after.is_some() {
            self.last_position = report.position_after;
        }

        if report.success {
            let until = self
                .cooldowns
                .record_success(action, finished, profile.success_cooldown);
            attempt.succeed(finished, report.result, until);

            info!(episode = %episode_id, action = %action, "Recovery attempt succeeded");
            self.log.record(RecoveryEvent::AttemptSucceeded {
                timestamp: finished,
                episode_id,
                attempt: attempt.clone(),
            });
        } else {
            let until = self
                .cooldowns
                .record_failure(action, finished, profile.failure_cooldown);
            let reason = report
                .error
                .unwrap_or_else(|| format!("{} failed", action));
            attempt.fail(finished, reason, Some(report.result), until);

            warn!(
                episode = %episode_id,
                action = %action,
                error = attempt.error_message.as_deref().unwrap_or_default(),
                cooldown_until = %until,
                "Recovery attempt failed"
            );
            self.log.record(RecoveryEvent::AttemptFailed {
                timestamp: finished,
                episode_id,
                attempt: attempt.clone(),
            });
        }

        self.state.current_attempt = None;
        self.state.recovery_history.push(attempt.clone());
        attempt
    }

    fn after_attempt(&mut self, attempt: &RecoveryAttempt) {
        if attempt.status == AttemptStatus::Succeeded {
            self.complete_recovery(
                EpisodeOutcome::Succeeded,
                &format!("{} got the character moving", attempt.action),
            );
        } else if attempt.action.is_last_resort() {
            self.complete_recovery(EpisodeOutcome::Fatal, "last resort failed");
        } else if self.state.attempts_executed() >= self.max_attempts {
            self.complete_recovery(EpisodeOutcome::Exhausted, "attempt cap reached");
        } else if self.state.remaining_actions.is_empty() {
            self.complete_recovery(EpisodeOutcome::Exhausted, "playbook exhausted");
        }
    }

    /// End the running episode with `outcome`
    ///
    /// Also used for administrative overrides; does nothing when no episode
    /// is running.
    pub fn complete_recovery(&mut self, outcome: EpisodeOutcome, reason: &str) {
        if !self.state.is_recovering {
            return;
        }

        let now = self.clock.now();
        let episode_id = self.episode_id();
        let attempts = self.state.attempts_executed();
        let stuck_type = self.state.stuck_detection.as_ref().map(|d| d.stuck_type);

        let event = match outcome {
            EpisodeOutcome::Succeeded => PhaseEvent::AttemptSucceeded,
            EpisodeOutcome::Exhausted => PhaseEvent::PlaybookExhausted,
            EpisodeOutcome::Fatal => PhaseEvent::LastResortFailed,
        };
        self.advance_phase(event);

        match outcome {
            EpisodeOutcome::Succeeded => {
                info!(episode = %episode_id, attempts, reason, "Recovery succeeded")
            }
            EpisodeOutcome::Exhausted => {
                error!(episode = %episode_id, attempts, reason, "Recovery exhausted")
            }
            EpisodeOutcome::Fatal => error!(
                episode = %episode_id,
                attempts,
                reason,
                fatal = true,
                "Recovery failed fatally, manual intervention required"
            ),
        }

        self.log.record(RecoveryEvent::RecoveryCompleted {
            timestamp: now,
            episode_id,
            outcome,
            attempts,
            reason: reason.to_string(),
        });

        self.last_episode = Some(EpisodeSummary {
            episode_id,
            stuck_type,
            outcome,
            attempts,
            reason: reason.to_string(),
            ended_at: now,
            final_position: self.last_position,
        });
        self.state.reset();
    }

    /// Track sub-threshold/clear scans while no episode runs
    pub fn note_scan(&mut self, suspect: bool) {
        if !self.phase.accepts_detection() {
            return;
        }
        let event = if suspect {
            PhaseEvent::SuspectSignal
        } else {
            PhaseEvent::SignalCleared
        };
        self.advance_phase(event);
    }

    /// Leave a finished Succeeded/Exhausted phase; Fatal stays latched
    pub fn settle(&mut self) {
        if self.phase.is_terminal() {
            self.advance_phase(PhaseEvent::Settle);
        }
    }

    /// Administrative override: end any episode and return to Idle
    ///
    /// Cooldowns are kept.
    pub fn force_reset(&mut self) {
        if self.state.is_recovering {
            self.complete_recovery(EpisodeOutcome::Exhausted, "administrative reset");
        }
        warn!(from = self.phase.display_name(), "Recovery engine reset");
        self.advance_phase(PhaseEvent::Reset);
        self.state.reset();
    }

    pub fn phase(&self) -> RecoveryPhase {
        self.phase
    }

    pub fn is_recovering(&self) -> bool {
        self.state.is_recovering
    }

    pub fn state(&self) -> &RecoveryState {
        &self.state
    }

    pub fn cooldowns(&self) -> &CooldownTracker {
        &self.cooldowns
    }

    pub fn last_episode(&self) -> Option<&EpisodeSummary> {
        self.last_episode.as_ref()
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    pub fn selector(&self) -> &PlaybookSelector {
        &self.selector
    }

    fn profile(&self, action: RecoveryAction) -> ActionProfile {
        match self.profiles.get(&action) {
            Some(profile) => profile.clone(),
            None => EngineConfig::default().action_profile(action),
        }
    }

    fn episode_id(&self) -> Uuid {
        self.state.episode_id.unwrap_or_else(Uuid::nil)
    }

    fn advance_phase(&mut self, event: PhaseEvent) {
        match self.phase.transition(event) {
            Ok(next) => {
                if next != self.phase {
                    debug!(
                        from = self.phase.display_name(),
                        to = next.display_name(),
                        "Recovery phase changed"
                    );
                }
                self.phase = next;
            }
            Err(e) => error!("Rejected recovery phase change: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::sim::SimulatedMovement;
    use serde_json::json;

    fn detection(clock: &ManualClock, at: Position) -> StuckDetection {
        StuckDetection::new(
            StuckType::NoCoordinateDelta,
            clock.now(),
            Some(at),
            1.0,
            json!({}),
        )
    }

    fn executor(config: &EngineConfig, sim: &SimulatedMovement, clock: &ManualClock) -> (RecoveryExecutor, EventLog) {
        let log = EventLog::in_memory(100);
        let exec = RecoveryExecutor::new(
            config,
            Arc::new(sim.clone()),
            Arc::new(clock.clone()),
            log.clone(),
        );
        (exec, log)
    }

    #[tokio::test]
    async fn test_first_rung_success_ends_episode() {
        let clock = ManualClock::starting_now();
        let start = Position::new(100.0, 100.0);
        let sim = SimulatedMovement::at(start);
        let (mut exec, log) = executor(&EngineConfig::default(), &sim, &clock);

        assert!(exec.start_recovery(detection(&clock, start)));
        assert_eq!(exec.phase(), RecoveryPhase::Recovering);

        let attempt = exec.step().await.unwrap();
        assert_eq!(attempt.action, RecoveryAction::MicroPathJitter);
        assert_eq!(attempt.status, AttemptStatus::Succeeded);
        assert_eq!(exec.phase(), RecoveryPhase::Succeeded);
        assert!(!exec.is_recovering());
        assert!(!exec.cooldowns().is_ready(RecoveryAction::MicroPathJitter, clock.now()));

        let summary = exec.last_episode().unwrap();
        assert_eq!(summary.outcome, EpisodeOutcome::Succeeded);
        assert_eq!(summary.attempts, 1);

        let types: Vec<_> = log.timeline().iter().map(|e| e.event_type()).collect();
        assert_eq!(
            types,
            vec!["StuckDetected", "AttemptStarted", "AttemptSucceeded", "RecoveryCompleted"]
        );

        exec.settle();
        assert_eq!(exec.phase(), RecoveryPhase::Idle);
    }

    #[tokio::test]
    async fn test_start_is_idempotent_while_recovering() {
        let clock = ManualClock::starting_now();
        let sim = SimulatedMovement::at(Position::default());
        let (mut exec, log) = executor(&EngineConfig::default(), &sim, &clock);

        assert!(exec.start_recovery(detection(&clock, Position::default())));
        let before = exec.state().clone();
        assert!(!exec.start_recovery(detection(&clock, Position::new(9.0, 9.0))));

        assert_eq!(exec.state().episode_id, before.episode_id);
        assert_eq!(exec.state().remaining_actions, before.remaining_actions);
        assert_eq!(log.stats().detections, 1);
    }

    #[tokio::test]
    async fn test_start_accepted_before_finished_episode_settles() {
        let clock = ManualClock::starting_now();
        let sim = SimulatedMovement::at(Position::new(100.0, 100.0));
        let (mut exec, log) = executor(&EngineConfig::default(), &sim, &clock);

        exec.start_recovery(detection(&clock, Position::new(100.0, 100.0)));
        exec.step().await;
        assert_eq!(exec.phase(), RecoveryPhase::Succeeded);
        assert!(!exec.is_recovering());

        let mut clicks = detection(&clock, Position::new(100.0, 100.0));
        clicks.stuck_type = StuckType::RepeatClicks;
        assert!(exec.start_recovery(clicks));
        assert!(exec.is_recovering());
        assert_eq!(exec.phase(), RecoveryPhase::Recovering);
        assert_eq!(log.stats().detections, 2);
    }

    #[tokio::test]
    async fn test_failure_advances_ladder_one_step_at_a_time() {
        let clock = ManualClock::starting_now();
        let sim = SimulatedMovement::at(Position::default());
        sim.block_movement(true);
        let (mut exec, _log) = executor(&EngineConfig::default(), &sim, &clock);

        exec.start_recovery(detection(&clock, Position::default()));
        let first = exec.step().await.unwrap();
        assert_eq!(first.status, AttemptStatus::Failed);
        assert!(exec.is_recovering());
        assert_eq!(exec.state().remaining_actions.front(), Some(&RecoveryAction::MountToggle));

        let second = exec.step().await.unwrap();
        assert_eq!(second.action, RecoveryAction::MountToggle);
        assert_eq!(exec.state().attempts_executed(), 2);
    }

    #[tokio::test]
    async fn test_navmesh_rescues_after_cheap_rungs() {
        let clock = ManualClock::starting_now();
        let sim = SimulatedMovement::at(Position::default());
        sim.block_movement(true);
        let mut config = EngineConfig::default();
        config.navmesh_waypoints.push(crate::config::NavmeshWaypoint {
            id: "gate".to_string(),
            x: 50.0,
            y: 0.0,
        });
        let (mut exec, _log) = executor(&config, &sim, &clock);

        exec.start_recovery(detection(&clock, Position::default()));
        let mut last = None;
        while exec.is_recovering() {
            last = exec.step().await;
        }

        assert_eq!(last.unwrap().action, RecoveryAction::NavmeshWaypoint);
        assert_eq!(exec.last_episode().unwrap().outcome, EpisodeOutcome::Succeeded);
        assert_eq!(exec.last_episode().unwrap().attempts, 4);
        assert!(sim.calls().iter().any(|c| c == "travel_to_navmesh_waypoint gate"));
    }

    #[tokio::test]
    async fn test_logout_failure_is_fatal_and_latched() {
        let clock = ManualClock::starting_now();
        let sim = SimulatedMovement::at(Position::default());
        sim.block_movement(true);
        for action in [
            RecoveryAction::ShuttleFallback,
            RecoveryAction::SafeLogout,
        ] {
            sim.fail_action(action, true);
        }
        let (mut exec, log) = executor(&EngineConfig::default(), &sim, &clock);

        exec.start_recovery(detection(&clock, Position::default()));
        while exec.is_recovering() {
            exec.step().await;
        }

        assert_eq!(exec.phase(), RecoveryPhase::Fatal);
        assert_eq!(exec.last_episode().unwrap().outcome, EpisodeOutcome::Fatal);
        assert_eq!(log.stats().episodes_fatal, 1);

        exec.settle();
        assert_eq!(exec.phase(), RecoveryPhase::Fatal);
        assert!(!exec.start_recovery(detection(&clock, Position::default())));

        exec.force_reset();
        assert_eq!(exec.phase(), RecoveryPhase::Idle);
    }

    #[tokio::test]
    async fn test_cooling_actions_are_skipped_mid_episode() {
        let clock = ManualClock::starting_now();
        let sim = SimulatedMovement::at(Position::default());
        let mut config = EngineConfig::default();
        config.playbooks.set(
            StuckType::NoCoordinateDelta,
            vec![RecoveryAction::MicroPathJitter, RecoveryAction::MicroPathJitter],
        );
        sim.block_movement(true);
        let (mut exec, log) = executor(&config, &sim, &clock);

        exec.start_recovery(detection(&clock, Position::default()));
        exec.step().await;
        let executed = exec.step().await;

        assert!(executed.is_none());
        assert_eq!(exec.last_episode().unwrap().outcome, EpisodeOutcome::Exhausted);
        assert_eq!(exec.last_episode().unwrap().attempts, 1);
        assert_eq!(log.stats().attempts_skipped, 1);
    }

    #[tokio::test]
    async fn test_empty_selection_ends_exhausted() {
        let clock = ManualClock::starting_now();
        let sim = SimulatedMovement::at(Position::default());
        let (mut exec, _log) = executor(&EngineConfig::default(), &sim, &clock);

        exec.start_recovery(detection(&clock, Position::default()));
        exec.complete_recovery(EpisodeOutcome::Exhausted, "test");
        exec.settle();

        let now = clock.now();
        for action in RecoveryAction::ladder() {
            exec.cooldowns.record_success(action, now, chrono::Duration::seconds(600));
        }

        assert!(exec.start_recovery(detection(&clock, Position::default())));
        assert!(!exec.is_recovering());
        assert_eq!(exec.phase(), RecoveryPhase::Exhausted);
        assert_eq!(exec.last_episode().unwrap().reason, "all actions cooling down");
    }

    #[tokio::test]
    async fn test_force_reset_mid_episode() {
        let clock = ManualClock::starting_now();
        let sim = SimulatedMovement::at(Position::default());
        let (mut exec, log) = executor(&EngineConfig::default(), &sim, &clock);

        exec.start_recovery(detection(&clock, Position::default()));
        exec.force_reset();

        assert!(!exec.is_recovering());
        assert_eq!(exec.phase(), RecoveryPhase::Idle);
        assert_eq!(exec.last_episode().unwrap().reason, "administrative reset");
        assert_eq!(log.stats().episodes_exhausted, 1);
    }
}
