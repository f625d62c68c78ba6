//! Stuck detector: four independent heuristics over the rolling buffers
//!
//! A scan evaluates every heuristic, keeps the best firing one (highest
//! confidence, then priority), and only reports it as actionable when its
//! confidence clears the configured threshold.

use crate::config::DetectionConfig;
use crate::detection::types::{StuckDetection, StuckType};
use crate::signals::SignalCollector;
use crate::types::Position;
use serde_json::json;
use tracing::debug;

/// Path points examined for an A,B,A,B,A,B bounce
pub const OSCILLATION_WINDOW: usize = 6;

/// Confidence of a repeat-click run of exactly K clicks
pub const REPEAT_CLICK_BASE_CONFIDENCE: f64 = 0.7;

/// Confidence of a quest stall right at the timeout
const QUEST_STALL_BASE_CONFIDENCE: f64 = 0.7;

/// Result of one scan cycle
#[derive(Debug, Clone, PartialEq)]
pub enum ScanOutcome {
    /// No heuristic fired
    Clear,

    /// Best heuristic fired below the confidence threshold
    BelowThreshold(StuckDetection),

    /// Actionable detection
    Detected(StuckDetection),
}

impl ScanOutcome {
    /// Actionable detection, if any
    pub fn detection(&self) -> Option<&StuckDetection> {
        match self {
            ScanOutcome::Detected(d) => Some(d),
            _ => None,
        }
    }
}

/// Heuristic evaluator
#[derive(Debug, Clone)]
pub struct StuckDetector {
    config: DetectionConfig,
}

impl StuckDetector {
    /// Create detector with the given thresholds
    pub fn new(config: DetectionConfig) -> Self {
        Self { config }
    }

    /// Run all heuristics and pick at most one detection
    pub fn scan(&self, signals: &SignalCollector) -> ScanOutcome {
        let best = self
            .evaluate(signals)
            .into_iter()
            .reduce(|best, next| if next.outranks(&best) { next } else { best });

        match best {
            None => ScanOutcome::Clear,
            Some(d) if d.confidence >= self.config.detection_confidence_threshold => {
                ScanOutcome::Detected(d)
            }
            Some(d) => {
                debug!(
                    stuck_type = %d.stuck_type,
                    confidence = d.confidence,
                    threshold = self.config.detection_confidence_threshold,
                    "Sub-threshold stuck signal ignored"
                );
                ScanOutcome::BelowThreshold(d)
            }
        }
    }

    /// Every heuristic that fires on the current buffers
    pub fn evaluate(&self, signals: &SignalCollector) -> Vec<StuckDetection> {
        [
            self.check_path_oscillation(signals),
            self.check_no_coordinate_delta(signals),
            self.check_repeat_clicks(signals),
            self.check_no_quest_progress(signals),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    /// Stationary over the last N coordinate samples
    pub fn check_no_coordinate_delta(&self, signals: &SignalCollector) -> Option<StuckDetection> {
        let window = self.config.coordinate_window;
        let history = signals.coordinate_history();
        if history.len() < window {
            return None;
        }

        let samples: Vec<Position> = history
            .iter()
            .skip(history.len() - window)
            .map(|s| s.position)
            .collect();
        let max_delta = max_pairwise_distance(&samples);
        let threshold = self.config.coordinate_delta_threshold;

        if max_delta >= threshold {
            return None;
        }

        let confidence = 1.0 - max_delta / threshold;
        Some(StuckDetection::new(
            StuckType::NoCoordinateDelta,
            signals.clock().now(),
            signals.last_position(),
            confidence,
            json!({
                "window": window,
                "max_delta": max_delta,
                "threshold": threshold,
            }),
        ))
    }

    /// Trailing run of identical clicks at least K long
    pub fn check_repeat_clicks(&self, signals: &SignalCollector) -> Option<StuckDetection> {
        let k = self.config.repeat_click_threshold;
        let history = signals.click_history();
        let last = history.back()?;

        let run = history.iter().rev().take_while(|c| c.same_as(last)).count();
        if run < k {
            return None;
        }

        let confidence =
            REPEAT_CLICK_BASE_CONFIDENCE + self.config.repeat_click_confidence_step * (run - k) as f64;
        Some(StuckDetection::new(
            StuckType::RepeatClicks,
            signals.clock().now(),
            signals.last_position(),
            confidence,
            json!({
                "click_type": last.click_type,
                "target": last.target,
                "run_length": run,
                "threshold": k,
            }),
        ))
    }

    /// Active quest has not advanced within the timeout
    ///
    /// Never fires when no quest is in progress.
    pub fn check_no_quest_progress(&self, signals: &SignalCollector) -> Option<StuckDetection> {
        let active = signals.active_quest()?;
        let now = signals.clock().now();
        let stalled_secs = (now - active.last_advanced_at).num_milliseconds() as f64 / 1000.0;
        let timeout = self.config.quest_progress_timeout_secs;

        if stalled_secs <= timeout {
            return None;
        }

        let overdue = ((stalled_secs - timeout) / timeout).min(1.0);
        let confidence = QUEST_STALL_BASE_CONFIDENCE + (1.0 - QUEST_STALL_BASE_CONFIDENCE) * overdue;
        Some(StuckDetection::new(
            StuckType::NoQuestProgress,
            now,
            signals.last_position(),
            confidence,
            json!({
                "quest_id": active.quest_id,
                "last_progress": active.last_progress,
                "stalled_secs": stalled_secs,
                "timeout_secs": timeout,
            }),
        ))
    }

    /// Last six path points alternate A,B,A,B,A,B within tolerance
    pub fn check_path_oscillation(&self, signals: &SignalCollector) -> Option<StuckDetection> {
        let history = signals.path_history();
        if history.len() < OSCILLATION_WINDOW {
            return None;
        }

        let points: Vec<Position> = history
            .iter()
            .skip(history.len() - OSCILLATION_WINDOW)
            .copied()
            .collect();
        let tolerance = self.config.oscillation_tolerance;

        if !is_oscillating(&points, tolerance) {
            return None;
        }

        Some(StuckDetection::new(
            StuckType::PathOscillation,
            signals.clock().now(),
            signals.last_position().or(points.last().copied()),
            1.0,
            json!({
                "point_a": points[0],
                "point_b": points[1],
                "tolerance": tolerance,
            }),
        ))
    }

    /// Detection thresholds
    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }
}

/// Largest distance between any two samples
pub fn max_pairwise_distance(points: &[Position]) -> f64 {
    let mut max = 0.0_f64;
    for (i, a) in points.iter().enumerate() {
        for b in &points[i + 1..] {
            max = max.max(a.distance_to(b));
        }
    }
    max
}

/// Check for a strict two-point bounce
pub fn is_oscillating(points: &[Position], tolerance: f64) -> bool {
    if points.len() < 2 {
        return false;
    }
    let (a, b) = (points[0], points[1]);
    if a.approx_eq(&b, tolerance) {
        return false;
    }

    points.iter().enumerate().all(|(i, p)| {
        let anchor = if i % 2 == 0 { &a } else { &b };
        p.approx_eq(anchor, tolerance)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::Arc;

    fn setup() -> (StuckDetector, SignalCollector, ManualClock) {
        let config = DetectionConfig::default();
        let clock = ManualClock::starting_now();
        let collector = SignalCollector::new(&config, Arc::new(clock.clone()));
        (StuckDetector::new(config), collector, clock)
    }

    #[test]
    fn test_stationary_fires_full_confidence() {
        let (detector, mut signals, _clock) = setup();
        for _ in 0..10 {
            signals.update_coordinates(100.0, 100.0);
        }

        let d = detector.check_no_coordinate_delta(&signals).unwrap();
        assert_eq!(d.stuck_type, StuckType::NoCoordinateDelta);
        assert_eq!(d.confidence, 1.0);
    }

    #[test]
    fn test_too_few_samples_does_not_fire() {
        let (detector, mut signals, _clock) = setup();
        for _ in 0..9 {
            signals.update_coordinates(100.0, 100.0);
        }
        assert!(detector.check_no_coordinate_delta(&signals).is_none());
    }

    #[test]
    fn test_small_drift_scales_confidence() {
        let (detector, mut signals, _clock) = setup();
        for i in 0..10 {
            signals.update_coordinates(100.0 + (i % 2) as f64 * 2.5, 100.0);
        }

        let d = detector.check_no_coordinate_delta(&signals).unwrap();
        assert!((d.confidence - 0.5).abs() < 1e-9);
        assert!(matches!(detector.scan(&signals), ScanOutcome::BelowThreshold(_)));
    }

    #[test]
    fn test_walking_does_not_fire() {
        let (detector, mut signals, _clock) = setup();
        for i in 0..10 {
            signals.update_coordinates(i as f64 * 3.0, 0.0);
        }
        assert!(detector.check_no_coordinate_delta(&signals).is_none());
    }

    #[test]
    fn test_repeat_clicks_fire_at_k() {
        let (detector, mut signals, _clock) = setup();
        signals.record_click("left", "terminal");
        for _ in 0..5 {
            signals.record_click("right", "mission_terminal");
        }

        let d = detector.check_repeat_clicks(&signals).unwrap();
        assert_eq!(d.confidence, REPEAT_CLICK_BASE_CONFIDENCE);
        assert_eq!(d.context["run_length"], 5);
        assert!(detector.scan(&signals).detection().is_some());
    }

    #[test]
    fn test_repeat_clicks_confidence_grows() {
        let (detector, mut signals, _clock) = setup();
        for _ in 0..8 {
            signals.record_click("right", "door");
        }
        let d = detector.check_repeat_clicks(&signals).unwrap();
        assert!((d.confidence - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_broken_click_run_suppressed() {
        let (detector, mut signals, _clock) = setup();
        for i in 0..5 {
            let target = if i == 2 { "other" } else { "door" };
            signals.record_click("right", target);
        }
        assert!(detector.check_repeat_clicks(&signals).is_none());
    }

    #[test]
    fn test_quest_stall_requires_active_quest() {
        let (detector, signals, clock) = setup();
        clock.advance_secs(10_000);
        assert!(detector.check_no_quest_progress(&signals).is_none());
    }

    #[test]
    fn test_quest_stall_fires_after_timeout() {
        let (detector, mut signals, clock) = setup();
        signals.record_quest_progress("q_bounty", 0.3);

        clock.advance_secs(300);
        assert!(detector.check_no_quest_progress(&signals).is_none());

        clock.advance_secs(1);
        let d = detector.check_no_quest_progress(&signals).unwrap();
        assert_eq!(d.stuck_type, StuckType::NoQuestProgress);
        assert!(d.confidence >= 0.7);

        clock.advance_secs(600);
        let d = detector.check_no_quest_progress(&signals).unwrap();
        assert!((d.confidence - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_oscillation_fires() {
        let (detector, mut signals, _clock) = setup();
        for (x, y) in [(0.0, 0.0), (10.0, 0.0), (0.0, 0.0), (10.0, 0.0), (0.0, 0.0), (10.0, 0.0)] {
            signals.record_path_point(x, y);
        }
        let d = detector.check_path_oscillation(&signals).unwrap();
        assert_eq!(d.confidence, 1.0);
    }

    #[test]
    fn test_oscillation_within_tolerance() {
        let (detector, mut signals, _clock) = setup();
        for (x, y) in [(0.0, 0.0), (10.0, 0.0), (0.5, 0.5), (10.5, -0.5), (-0.3, 0.2), (9.8, 0.1)] {
            signals.record_path_point(x, y);
        }
        assert!(detector.check_path_oscillation(&signals).is_some());
    }

    #[test]
    fn test_monotonic_path_not_oscillating() {
        let (detector, mut signals, _clock) = setup();
        for i in 0..6 {
            signals.record_path_point(i as f64 * 10.0, 0.0);
        }
        assert!(detector.check_path_oscillation(&signals).is_none());
    }

    #[test]
    fn test_standing_still_path_not_oscillating() {
        assert!(!is_oscillating(&[Position::new(1.0, 1.0); 6], 2.0));
    }

    #[test]
    fn test_oscillation_wins_tie_with_stationary() {
        let (detector, mut signals, _clock) = setup();
        for _ in 0..10 {
            signals.update_coordinates(5.0, 5.0);
        }
        for (x, y) in [(0.0, 0.0), (10.0, 0.0), (0.0, 0.0), (10.0, 0.0), (0.0, 0.0), (10.0, 0.0)] {
            signals.record_path_point(x, y);
        }

        assert_eq!(detector.evaluate(&signals).len(), 2);
        let d = detector.scan(&signals).detection().cloned().unwrap();
        assert_eq!(d.stuck_type, StuckType::PathOscillation);
    }

    #[test]
    fn test_higher_confidence_beats_priority() {
        let (detector, mut signals, _clock) = setup();
        for _ in 0..10 {
            signals.update_coordinates(5.0, 5.0);
        }
        for _ in 0..5 {
            signals.record_click("left", "door");
        }

        let d = detector.scan(&signals).detection().cloned().unwrap();
        assert_eq!(d.stuck_type, StuckType::NoCoordinateDelta);
    }

    #[test]
    fn test_clear_when_nothing_fires() {
        let (detector, signals, _clock) = setup();
        assert_eq!(detector.scan(&signals), ScanOutcome::Clear);
    }
}
