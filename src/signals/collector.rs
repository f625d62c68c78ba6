//! Rolling signal buffers fed by the telemetry collaborator
//!
//! All recorders are fire-and-forget: they never fail and never block.
//! Each buffer is a bounded queue; the oldest sample falls off when full.

use crate::clock::Clock;
use crate::config::DetectionConfig;
use crate::types::Position;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;

/// Coordinate reading with its arrival time
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoordinateSample {
    pub position: Position,
    pub timestamp: DateTime<Utc>,
}

/// Synthetic click issued by the bot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClickEvent {
    pub click_type: String,
    pub target: String,
    pub timestamp: DateTime<Utc>,
}

impl ClickEvent {
    /// Whether two clicks hit the same thing the same way
    pub fn same_as(&self, other: &ClickEvent) -> bool {
        self.click_type == other.click_type && self.target == other.target
    }
}

/// Quest tracker reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestProgressSample {
    pub quest_id: String,
    pub progress: f64,
    pub timestamp: DateTime<Utc>,
}

/// Quest currently presumed in progress
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveQuest {
    pub quest_id: String,
    pub last_progress: f64,

    /// Last time progress increased (or the quest became active)
    pub last_advanced_at: DateTime<Utc>,
}

/// Buffer fill levels for status snapshots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferLevels {
    pub coordinates: usize,
    pub clicks: usize,
    pub quest_progress: usize,
    pub path_points: usize,
}

/// Bounded per-signal history
pub struct SignalCollector {
    clock: Arc<dyn Clock>,

    coordinate_history: VecDeque<CoordinateSample>,
    coordinate_capacity: usize,

    click_history: VecDeque<ClickEvent>,
    click_capacity: usize,

    quest_progress_history: VecDeque<QuestProgressSample>,
    quest_capacity: usize,

    path_history: VecDeque<Position>,
    path_capacity: usize,

    active_quest: Option<ActiveQuest>,
}

impl SignalCollector {
    /// Create a collector sized from detection config
    pub fn new(config: &DetectionConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            coordinate_history: VecDeque::with_capacity(config.coordinate_window),
            coordinate_capacity: config.coordinate_window,
            click_history: VecDeque::with_capacity(config.click_history_size),
            click_capacity: config.click_history_size,
            quest_progress_history: VecDeque::with_capacity(config.quest_history_size),
            quest_capacity: config.quest_history_size,
            path_history: VecDeque::with_capacity(config.path_history_size),
            path_capacity: config.path_history_size,
            active_quest: None,
        }
    }

    /// Append a coordinate sample
    pub fn update_coordinates(&mut self, x: f64, y: f64) {
        let sample = CoordinateSample {
            position: Position::new(x, y),
            timestamp: self.clock.now(),
        };
        push_bounded(&mut self.coordinate_history, sample, self.coordinate_capacity);
    }

    /// Append a click event
    pub fn record_click(&mut self, click_type: impl Into<String>, target: impl Into<String>) {
        let click = ClickEvent {
            click_type: click_type.into(),
            target: target.into(),
            timestamp: self.clock.now(),
        };
        push_bounded(&mut self.click_history, click, self.click_capacity);
    }

    /// Append a quest progress reading and update the active quest
    ///
    /// Progress below 1.0 marks the quest active; 1.0 or more completes it.
    /// Only an increase in progress resets the stall timer.
    pub fn record_quest_progress(&mut self, quest_id: impl Into<String>, progress: f64) {
        let quest_id = quest_id.into();
        let now = self.clock.now();

        push_bounded(
            &mut self.quest_progress_history,
            QuestProgressSample {
                quest_id: quest_id.clone(),
                progress,
                timestamp: now,
            },
            self.quest_capacity,
        );

        if progress >= 1.0 {
            if self.active_quest.as_ref().map(|q| q.quest_id.as_str()) == Some(quest_id.as_str()) {
                self.active_quest = None;
            }
            return;
        }

        match self.active_quest.as_mut() {
            Some(active) if active.quest_id == quest_id => {
                if progress > active.last_progress {
                    active.last_progress = progress;
                    active.last_advanced_at = now;
                }
            }
            _ => {
                self.active_quest = Some(ActiveQuest {
                    quest_id,
                    last_progress: progress,
                    last_advanced_at: now,
                });
            }
        }
    }

    /// Explicitly mark a quest as in progress
    pub fn set_active_quest(&mut self, quest_id: impl Into<String>) {
        let quest_id = quest_id.into();
        if self.active_quest.as_ref().map(|q| &q.quest_id) == Some(&quest_id) {
            return;
        }
        self.active_quest = Some(ActiveQuest {
            quest_id,
            last_progress: 0.0,
            last_advanced_at: self.clock.now(),
        });
    }

    /// Mark that no quest is in progress
    pub fn clear_active_quest(&mut self) {
        self.active_quest = None;
    }

    /// Append a path point
    pub fn record_path_point(&mut self, x: f64, y: f64) {
        push_bounded(&mut self.path_history, Position::new(x, y), self.path_capacity);
    }

    pub fn coordinate_history(&self) -> &VecDeque<CoordinateSample> {
        &self.coordinate_history
    }

    pub fn click_history(&self) -> &VecDeque<ClickEvent> {
        &self.click_history
    }

    pub fn quest_progress_history(&self) -> &VecDeque<QuestProgressSample> {
        &self.quest_progress_history
    }

    pub fn path_history(&self) -> &VecDeque<Position> {
        &self.path_history
    }

    pub fn active_quest(&self) -> Option<&ActiveQuest> {
        self.active_quest.as_ref()
    }

    /// Most recent coordinate
    pub fn last_position(&self) -> Option<Position> {
        self.coordinate_history.back().map(|s| s.position)
    }

    /// Current fill levels
    pub fn levels(&self) -> BufferLevels {
        BufferLevels {
            coordinates: self.coordinate_history.len(),
            clicks: self.click_history.len(),
            quest_progress: self.quest_progress_history.len(),
            path_points: self.path_history.len(),
        }
    }

    /// Drop movement-derived samples after an episode resolves
    ///
    /// The active quest survives, but its stall timer restarts so a quest
    /// that was the reason for the episode is not re-flagged immediately.
    pub fn clear_movement_signals(&mut self) {
        self.coordinate_history.clear();
        self.click_history.clear();
        self.path_history.clear();
        let now = self.clock.now();
        if let Some(active) = self.active_quest.as_mut() {
            active.last_advanced_at = now;
        }
    }

    /// Time source shared with the detector
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }
}

fn push_bounded<T>(buffer: &mut VecDeque<T>, item: T, capacity: usize) {
    buffer.push_back(item);
    while buffer.len() > capacity {
        buffer.pop_front();
    }
}
