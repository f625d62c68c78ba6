//! Stuck detection type definitions

use crate::types::Position;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of stuck condition a heuristic diagnosed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StuckType {
    /// Character has not moved across the coordinate window
    NoCoordinateDelta,

    /// Same click issued over and over
    RepeatClicks,

    /// Active quest has not advanced within the timeout
    NoQuestProgress,

    /// Path bounces between two points (walk into wall, bounce back)
    PathOscillation,
}

impl StuckType {
    /// All stuck types
    pub fn all() -> [StuckType; 4] {
        [
            StuckType::NoCoordinateDelta,
            StuckType::RepeatClicks,
            StuckType::NoQuestProgress,
            StuckType::PathOscillation,
        ]
    }

    /// Tie-break priority when confidences are equal (higher wins)
    pub fn priority(&self) -> u8 {
        match self {
            StuckType::PathOscillation => 4,
            StuckType::NoCoordinateDelta => 3,
            StuckType::RepeatClicks => 2,
            StuckType::NoQuestProgress => 1,
        }
    }

    /// Config/log key
    pub fn key(&self) -> &'static str {
        match self {
            StuckType::NoCoordinateDelta => "no_coordinate_delta",
            StuckType::RepeatClicks => "repeat_clicks",
            StuckType::NoQuestProgress => "no_quest_progress",
            StuckType::PathOscillation => "path_oscillation",
        }
    }
}

impl fmt::Display for StuckType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// A single diagnosed stuck episode trigger. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StuckDetection {
    /// Heuristic that fired
    pub stuck_type: StuckType,

    /// Detection time
    pub timestamp: DateTime<Utc>,

    /// Last known position, if any sample was collected
    pub coordinates: Option<Position>,

    /// Confidence in [0, 1]
    pub confidence: f64,

    /// Diagnostic context (window, counts, thresholds)
    pub context: serde_json::Value,
}

impl StuckDetection {
    /// Create a detection, clamping confidence into [0, 1]
    pub fn new(
        stuck_type: StuckType,
        timestamp: DateTime<Utc>,
        coordinates: Option<Position>,
        confidence: f64,
        context: serde_json::Value,
    ) -> Self {
        Self {
            stuck_type,
            timestamp,
            coordinates,
            confidence: confidence.clamp(0.0, 1.0),
            context,
        }
    }

    /// Whether this detection outranks `other` for the same scan
    pub fn outranks(&self, other: &StuckDetection) -> bool {
        if (self.confidence - other.confidence).abs() > f64::EPSILON {
            self.confidence > other.confidence
        } else {
            self.stuck_type.priority() > other.stuck_type.priority()
        }
    }

    /// Human-readable description
    pub fn description(&self) -> String {
        match self.coordinates {
            Some(pos) => format!(
                "{} at {} (confidence {:.2})",
                self.stuck_type, pos, self.confidence
            ),
            None => format!("{} (confidence {:.2})", self.stuck_type, self.confidence),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn detection(stuck_type: StuckType, confidence: f64) -> StuckDetection {
        StuckDetection::new(stuck_type, Utc::now(), None, confidence, json!({}))
    }

    #[test]
    fn test_priority_order() {
        assert!(StuckType::PathOscillation.priority() > StuckType::NoCoordinateDelta.priority());
        assert!(StuckType::NoCoordinateDelta.priority() > StuckType::RepeatClicks.priority());
        assert!(StuckType::RepeatClicks.priority() > StuckType::NoQuestProgress.priority());
    }

    #[test]
    fn test_outranks_by_confidence() {
        let high = detection(StuckType::NoQuestProgress, 0.9);
        let low = detection(StuckType::PathOscillation, 0.8);
        assert!(high.outranks(&low));
        assert!(!low.outranks(&high));
    }

    #[test]
    fn test_outranks_tie_by_priority() {
        let osc = detection(StuckType::PathOscillation, 1.0);
        let delta = detection(StuckType::NoCoordinateDelta, 1.0);
        assert!(osc.outranks(&delta));
        assert!(!delta.outranks(&osc));
    }

    #[test]
    fn test_confidence_clamped() {
        assert_eq!(detection(StuckType::RepeatClicks, 1.7).confidence, 1.0);
        assert_eq!(detection(StuckType::RepeatClicks, -0.2).confidence, 0.0);
    }

    #[test]
    fn test_serde_snake_case() {
        let json = serde_json::to_string(&StuckType::PathOscillation).unwrap();
        assert_eq!(json, "\"path_oscillation\"");
    }
}
