//! Stuck detection and recovery engine
//!
//! Explicitly constructed context object that owns every component. The
//! host feeds signals between ticks and calls [`RecoveryEngine::tick`] on
//! its own cadence; one tick runs one scan and at most one action.

use crate::actions::MovementController;
use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::detection::{ScanOutcome, StuckDetection, StuckDetector};
use crate::errors::Result;
use crate::event_log::{EventLog, RecoveryEvent, TimelineStats};
use crate::recovery::{
    EpisodeOutcome, EpisodeSummary, RecoveryAction, RecoveryAttempt, RecoveryExecutor,
    RecoveryPhase, RecoveryState,
};
use crate::signals::{ActiveQuest, BufferLevels, SignalCollector};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

/// Engine behind a single mutex guarding the whole episode
pub type SharedEngine = Arc<tokio::sync::Mutex<RecoveryEngine>>;

/// What happened during one tick
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub tick: u64,
    pub phase: RecoveryPhase,

    /// Detection that started an episode this tick
    pub detection: Option<StuckDetection>,

    /// Attempt executed this tick
    pub attempt: Option<RecoveryAttempt>,

    /// Set when an episode ended this tick
    pub outcome: Option<EpisodeOutcome>,
}

/// Dashboard snapshot
#[derive(Debug, Clone, Serialize)]
pub struct RecoveryStatus {
    pub as_of: DateTime<Utc>,
    pub ticks: u64,
    pub phase: RecoveryPhase,
    pub state: RecoveryState,
    pub attempts_executed: usize,
    pub max_recovery_attempts: usize,
    pub cooldowns: BTreeMap<RecoveryAction, DateTime<Utc>>,
    pub buffers: BufferLevels,
    pub active_quest: Option<ActiveQuest>,
    pub last_episode: Option<EpisodeSummary>,
    pub stats: TimelineStats,
}

/// Dependency-injected engine context
pub struct RecoveryEngine {
    clock: Arc<dyn Clock>,
    signals: SignalCollector,
    detector: StuckDetector,
    executor: RecoveryExecutor,
    log: EventLog,
    ticks: u64,
}

impl RecoveryEngine {
    /// Build an engine from explicit collaborators
    pub fn new(
        config: EngineConfig,
        movement: Arc<dyn MovementController>,
        clock: Arc<dyn Clock>,
        log: EventLog,
    ) -> Result<Self> {
        config.validate()?;

        let signals = SignalCollector::new(&config.detection, clock.clone());
        let detector = StuckDetector::new(config.detection.clone());
        let executor = RecoveryExecutor::new(&config, movement, clock.clone(), log.clone());

        info!(
            playbook = %config.recovery.playbook,
            max_attempts = config.recovery.max_recovery_attempts,
            waypoints = config.navmesh_waypoints.len(),
            "Recovery engine ready"
        );

        Ok(Self {
            clock,
            signals,
            detector,
            executor,
            log,
            ticks: 0,
        })
    }

    /// Build with the system clock and the configured event log sink
    pub fn from_config(
        config: EngineConfig,
        movement: Arc<dyn MovementController>,
    ) -> anyhow::Result<Self> {
        let log = match &config.event_log.path {
            Some(path) => EventLog::open(path, config.event_log.timeline_capacity)?,
            None => EventLog::in_memory(config.event_log.timeline_capacity),
        };
        Ok(Self::new(config, movement, Arc::new(SystemClock), log)?)
    }

    /// Hand the engine to a multi-threaded host
    pub fn into_shared(self) -> SharedEngine {
        Arc::new(tokio::sync::Mutex::new(self))
    }

    pub fn update_coordinates(&mut self, x: f64, y: f64) {
        self.signals.update_coordinates(x, y);
    }

    pub fn record_click(&mut self, click_type: impl Into<String>, target: impl Into<String>) {
        self.signals.record_click(click_type, target);
    }

    pub fn record_quest_progress(&mut self, quest_id: impl Into<String>, progress: f64) {
        self.signals.record_quest_progress(quest_id, progress);
    }

    pub fn record_path_point(&mut self, x: f64, y: f64) {
        self.signals.record_path_point(x, y);
    }

    pub fn set_active_quest(&mut self, quest_id: impl Into<String>) {
        self.signals.set_active_quest(quest_id);
    }

    pub fn clear_active_quest(&mut self) {
        self.signals.clear_active_quest();
    }

    /// One polling cycle: settle, scan, start, step
    pub async fn tick(&mut self) -> TickReport {
        self.ticks += 1;
        self.executor.settle();
        let latched = self.executor.phase().is_terminal();

        let mut report = TickReport {
            tick: self.ticks,
            ..TickReport::default()
        };

        if !self.executor.is_recovering() && self.executor.phase().accepts_detection() {
            match self.detector.scan(&self.signals) {
                ScanOutcome::Detected(detection) => {
                    if self.executor.start_recovery(detection.clone()) {
                        report.detection = Some(detection);
                    }
                }
                ScanOutcome::BelowThreshold(_) => self.executor.note_scan(true),
                ScanOutcome::Clear => self.executor.note_scan(false),
            }
        }

        if self.executor.is_recovering() {
            report.attempt = self.executor.step().await;
        }

        if !latched && self.executor.phase().is_terminal() {
            report.outcome = self.executor.last_episode().map(|e| e.outcome);
            self.on_episode_end();
        }

        report.phase = self.executor.phase();
        report
    }

    /// Clear stale movement samples and seed the post-action position
    fn on_episode_end(&mut self) {
        self.signals.clear_movement_signals();
        if let Some(pos) = self.executor.last_episode().and_then(|e| e.final_position) {
            self.signals.update_coordinates(pos.x, pos.y);
        }
    }

    /// Start an episode directly, bypassing the detector
    pub fn start_recovery(&mut self, detection: StuckDetection) -> bool {
        self.executor.start_recovery(detection)
    }

    /// Current state snapshot for dashboards
    pub fn get_recovery_status(&self) -> RecoveryStatus {
        let now = self.clock.now();
        let state = self.executor.state().clone();
        RecoveryStatus {
            as_of: now,
            ticks: self.ticks,
            phase: self.executor.phase(),
            attempts_executed: state.attempts_executed(),
            state,
            max_recovery_attempts: self.executor.max_attempts(),
            cooldowns: self.executor.cooldowns().active(now),
            buffers: self.signals.levels(),
            active_quest: self.signals.active_quest().cloned(),
            last_episode: self.executor.last_episode().cloned(),
            stats: self.log.stats(),
        }
    }

    /// Recent events, oldest first; `None` returns the whole timeline
    pub fn get_recovery_timeline(&self, limit: Option<usize>) -> Vec<RecoveryEvent> {
        match limit {
            Some(n) => self.log.recent(n),
            None => self.log.timeline(),
        }
    }

    /// Administrative override; ends any episode and clears the Fatal latch
    pub fn force_reset(&mut self) {
        let was_recovering = self.executor.is_recovering();
        self.executor.force_reset();
        if was_recovering {
            self.signals.clear_movement_signals();
        }
    }

    pub fn phase(&self) -> RecoveryPhase {
        self.executor.phase()
    }

    pub fn is_recovering(&self) -> bool {
        self.executor.is_recovering()
    }

    pub fn signals(&self) -> &SignalCollector {
        &self.signals
    }

    pub fn executor(&self) -> &RecoveryExecutor {
        &self.executor
    }

    pub fn event_log(&self) -> &EventLog {
        &self.log
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::detection::StuckType;
    use crate::sim::SimulatedMovement;
    use crate::types::Position;

    fn engine(sim: &SimulatedMovement, clock: &ManualClock) -> RecoveryEngine {
        RecoveryEngine::new(
            EngineConfig::default(),
            Arc::new(sim.clone()),
            Arc::new(clock.clone()),
            EventLog::in_memory(100),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_quiet_ticks_stay_idle() {
        let clock = ManualClock::starting_now();
        let sim = SimulatedMovement::at(Position::default());
        let mut engine = engine(&sim, &clock);

        for i in 0..20 {
            engine.update_coordinates(i as f64 * 10.0, 0.0);
            let report = engine.tick().await;
            assert!(report.detection.is_none());
            assert_eq!(report.phase, RecoveryPhase::Idle);
        }
        assert!(engine.get_recovery_timeline(None).is_empty());
    }

    #[tokio::test]
    async fn test_episode_end_clears_buffers_and_seeds_position() {
        let clock = ManualClock::starting_now();
        let sim = SimulatedMovement::at(Position::new(100.0, 100.0));
        let mut engine = engine(&sim, &clock);

        for _ in 0..10 {
            engine.update_coordinates(100.0, 100.0);
        }
        let report = engine.tick().await;

        assert_eq!(report.detection.unwrap().stuck_type, StuckType::NoCoordinateDelta);
        assert_eq!(report.outcome, Some(EpisodeOutcome::Succeeded));
        assert_eq!(engine.signals().levels().coordinates, 1);
        assert_eq!(engine.signals().last_position(), sim.position());

        let next = engine.tick().await;
        assert!(next.detection.is_none());
        assert_eq!(next.phase, RecoveryPhase::Idle);
    }

    #[tokio::test]
    async fn test_direct_start_after_success_is_accepted() {
        let clock = ManualClock::starting_now();
        let sim = SimulatedMovement::at(Position::new(100.0, 100.0));
        let mut engine = engine(&sim, &clock);

        for _ in 0..10 {
            engine.update_coordinates(100.0, 100.0);
        }
        let report = engine.tick().await;
        assert_eq!(report.outcome, Some(EpisodeOutcome::Succeeded));
        assert_eq!(engine.phase(), RecoveryPhase::Succeeded);

        let detection = StuckDetection::new(
            StuckType::RepeatClicks,
            clock.now(),
            Some(Position::new(100.0, 100.0)),
            0.8,
            serde_json::json!({}),
        );
        assert!(engine.start_recovery(detection));
        assert!(engine.is_recovering());
        assert_eq!(engine.phase(), RecoveryPhase::Recovering);
    }

    #[tokio::test]
    async fn test_sub_threshold_moves_to_detecting() {
        let clock = ManualClock::starting_now();
        let sim = SimulatedMovement::at(Position::default());
        let mut engine = engine(&sim, &clock);

        // 4.0 units of spread over the window: confidence 0.2
        for i in 0..10 {
            engine.update_coordinates(if i % 2 == 0 { 0.0 } else { 4.0 }, 0.0);
        }
        let report = engine.tick().await;
        assert!(report.detection.is_none());
        assert_eq!(report.phase, RecoveryPhase::Detecting);
    }

    #[tokio::test]
    async fn test_status_snapshot_serializes() {
        let clock = ManualClock::starting_now();
        let sim = SimulatedMovement::at(Position::default());
        sim.block_movement(true);
        let mut engine = engine(&sim, &clock);

        for _ in 0..10 {
            engine.update_coordinates(0.0, 0.0);
        }
        engine.tick().await;

        let status = engine.get_recovery_status();
        assert_eq!(status.phase, RecoveryPhase::Recovering);
        assert_eq!(status.attempts_executed, 1);
        assert!(status.cooldowns.contains_key(&RecoveryAction::MicroPathJitter));

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["phase"], "recovering");
        assert_eq!(json["state"]["is_recovering"], true);
    }

    #[tokio::test]
    async fn test_shared_engine_serializes_ticks() {
        let clock = ManualClock::starting_now();
        let sim = SimulatedMovement::at(Position::default());
        let shared = engine(&sim, &clock).into_shared();

        let mut handles = Vec::new();
        for _ in 0..4 {
            let engine = shared.clone();
            handles.push(tokio::spawn(async move {
                let mut guard = engine.lock().await;
                guard.update_coordinates(0.0, 0.0);
                guard.tick().await.tick
            }));
        }
        let mut ticks = Vec::new();
        for handle in handles {
            ticks.push(handle.await.unwrap());
        }
        ticks.sort_unstable();
        assert_eq!(ticks, vec![1, 2, 3, 4]);
    }
}
