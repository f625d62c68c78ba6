//! Append-only recovery event log and timeline
//!
//! Every accepted detection and every attempt transition is recorded once,
//! as one JSON object per line, and mirrored into a bounded in-memory
//! timeline for dashboards. Entries are never rewritten; retention of the
//! file is left to external rotation.

use crate::detection::StuckDetection;
use crate::recovery::{EpisodeOutcome, RecoveryAttempt};
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{info, warn};
use uuid::Uuid;

/// One log record; `event_type` is the JSON tag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum RecoveryEvent {
    StuckDetected {
        timestamp: DateTime<Utc>,
        episode_id: Uuid,
        detection: StuckDetection,
    },
    AttemptStarted {
        timestamp: DateTime<Utc>,
        episode_id: Uuid,
        attempt: RecoveryAttempt,
    },
    AttemptSucceeded {
        timestamp: DateTime<Utc>,
        episode_id: Uuid,
        attempt: RecoveryAttempt,
    },
    AttemptFailed {
        timestamp: DateTime<Utc>,
        episode_id: Uuid,
        attempt: RecoveryAttempt,
    },
    AttemptSkipped {
        timestamp: DateTime<Utc>,
        episode_id: Uuid,
        attempt: RecoveryAttempt,
    },
    RecoveryCompleted {
        timestamp: DateTime<Utc>,
        episode_id: Uuid,
        outcome: EpisodeOutcome,
        attempts: usize,
        reason: String,
    },
}

impl RecoveryEvent {
    /// Tag as written to the log
    pub fn event_type(&self) -> &'static str {
        match self {
            RecoveryEvent::StuckDetected { .. } => "StuckDetected",
            RecoveryEvent::AttemptStarted { .. } => "AttemptStarted",
            RecoveryEvent::AttemptSucceeded { .. } => "AttemptSucceeded",
            RecoveryEvent::AttemptFailed { .. } => "AttemptFailed",
            RecoveryEvent::AttemptSkipped { .. } => "AttemptSkipped",
            RecoveryEvent::RecoveryCompleted { .. } => "RecoveryCompleted",
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            RecoveryEvent::StuckDetected { timestamp, .. }
            | RecoveryEvent::AttemptStarted { timestamp, .. }
            | RecoveryEvent::AttemptSucceeded { timestamp, .. }
            | RecoveryEvent::AttemptFailed { timestamp, .. }
            | RecoveryEvent::AttemptSkipped { timestamp, .. }
            | RecoveryEvent::RecoveryCompleted { timestamp, .. } => *timestamp,
        }
    }

    pub fn episode_id(&self) -> Uuid {
        match self {
            RecoveryEvent::StuckDetected { episode_id, .. }
            | RecoveryEvent::AttemptStarted { episode_id, .. }
            | RecoveryEvent::AttemptSucceeded { episode_id, .. }
            | RecoveryEvent::AttemptFailed { episode_id, .. }
            | RecoveryEvent::AttemptSkipped { episode_id, .. }
            | RecoveryEvent::RecoveryCompleted { episode_id, .. } => *episode_id,
        }
    }

    /// One-line summary for terminal output
    pub fn summary(&self) -> String {
        match self {
            RecoveryEvent::StuckDetected { detection, .. } => detection.description(),
            RecoveryEvent::AttemptStarted { attempt, .. }
            | RecoveryEvent::AttemptSucceeded { attempt, .. }
            | RecoveryEvent::AttemptSkipped { attempt, .. } => attempt.action.to_string(),
            RecoveryEvent::AttemptFailed { attempt, .. } => format!(
                "{}: {}",
                attempt.action,
                attempt.error_message.as_deref().unwrap_or("failed")
            ),
            RecoveryEvent::RecoveryCompleted {
                outcome,
                attempts,
                reason,
                ..
            } => format!("{} after {} attempt(s): {}", outcome, attempts, reason),
        }
    }
}

/// Running counters over everything recorded
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineStats {
    pub detections: usize,
    pub attempts_started: usize,
    pub attempts_succeeded: usize,
    pub attempts_failed: usize,
    pub attempts_skipped: usize,
    pub episodes_succeeded: usize,
    pub episodes_exhausted: usize,
    pub episodes_fatal: usize,
}

impl TimelineStats {
    fn apply(&mut self, event: &RecoveryEvent) {
        match event {
            RecoveryEvent::StuckDetected { .. } => self.detections += 1,
            RecoveryEvent::AttemptStarted { .. } => self.attempts_started += 1,
            RecoveryEvent::AttemptSucceeded { .. } => self.attempts_succeeded += 1,
            RecoveryEvent::AttemptFailed { .. } => self.attempts_failed += 1,
            RecoveryEvent::AttemptSkipped { .. } => self.attempts_skipped += 1,
            RecoveryEvent::RecoveryCompleted { outcome, .. } => match outcome {
                EpisodeOutcome::Succeeded => self.episodes_succeeded += 1,
                EpisodeOutcome::Exhausted => self.episodes_exhausted += 1,
                EpisodeOutcome::Fatal => self.episodes_fatal += 1,
            },
        }
    }

    /// Fraction of executed attempts that succeeded
    pub fn attempt_success_rate(&self) -> f64 {
        let total = self.attempts_succeeded + self.attempts_failed;
        if total == 0 {
            1.0
        } else {
            self.attempts_succeeded as f64 / total as f64
        }
    }
}

struct Inner {
    timeline: VecDeque<RecoveryEvent>,
    capacity: usize,
    stats: TimelineStats,
    sink: Option<File>,
    path: Option<PathBuf>,
}

/// Shared handle to the log; clones append to the same log
#[derive(Clone)]
pub struct EventLog {
    inner: Arc<Mutex<Inner>>,
}

impl EventLog {
    /// Log kept only in memory
    pub fn in_memory(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                timeline: VecDeque::with_capacity(capacity),
                capacity: capacity.max(1),
                stats: TimelineStats::default(),
                sink: None,
                path: None,
            })),
        }
    }

    /// Log that also appends JSONL to `path`
    pub fn open(path: impl AsRef<Path>, capacity: usize) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).context("Failed to create event log directory")?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open event log {}", path.display()))?;

        let log = Self::in_memory(capacity);
        {
            let mut inner = log.lock();
            inner.sink = Some(file);
            inner.path = Some(path.to_path_buf());
        }
        info!(path = %path.display(), "Recovery event log opened");
        Ok(log)
    }

    /// Append an event; write failures are logged, never returned
    pub fn record(&self, event: RecoveryEvent) {
        let mut inner = self.lock();
        inner.stats.apply(&event);

        if let Some(file) = inner.sink.as_mut() {
            match serde_json::to_string(&event) {
                Ok(json) => {
                    if let Err(e) = writeln!(file, "{json}") {
                        warn!("Failed to append recovery event: {e}");
                    }
                }
                Err(e) => warn!("Failed to serialize recovery event: {e}"),
            }
        }

        inner.timeline.push_back(event);
        while inner.timeline.len() > inner.capacity {
            inner.timeline.pop_front();
        }
    }

    /// Timeline in recording order
    pub fn timeline(&self) -> Vec<RecoveryEvent> {
        self.lock().timeline.iter().cloned().collect()
    }

    /// Last `n` events
    pub fn recent(&self, n: usize) -> Vec<RecoveryEvent> {
        let inner = self.lock();
        let start = inner.timeline.len().saturating_sub(n);
        inner.timeline.iter().skip(start).cloned().collect()
    }

    /// Counters over every recorded event
    pub fn stats(&self) -> TimelineStats {
        self.lock().stats.clone()
    }

    /// Number of events in the timeline
    pub fn len(&self) -> usize {
        self.lock().timeline.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Backing file, if any
    pub fn path(&self) -> Option<PathBuf> {
        self.lock().path.clone()
    }

    /// Read a JSONL log back, skipping malformed lines
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Vec<RecoveryEvent>> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Failed to open event log {}", path.display()))?;

        let mut events = Vec::new();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line.context("Failed to read event log line")?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<RecoveryEvent>(&line) {
                Ok(event) => events.push(event),
                Err(e) => warn!(line = index + 1, "Skipping malformed event log entry: {e}"),
            }
        }
        Ok(events)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}
