//! Recovery system type definitions

use crate::detection::StuckDetection;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use uuid::Uuid;

/// Recovery actions on the escalation ladder, cheapest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryAction {
    /// Short random step around the current position
    MicroPathJitter,

    /// Mount or dismount, then nudge forward
    MountToggle,

    /// Swing the camera and re-scan, then nudge forward
    FaceCameraRescan,

    /// Travel to the nearest known-reachable navmesh waypoint
    NavmeshWaypoint,

    /// Call a shuttle/instant travel out of the area
    ShuttleFallback,

    /// Log the character out (last resort)
    SafeLogout,
}

impl RecoveryAction {
    /// Full ladder in escalation order
    pub fn ladder() -> [RecoveryAction; 6] {
        [
            RecoveryAction::MicroPathJitter,
            RecoveryAction::MountToggle,
            RecoveryAction::FaceCameraRescan,
            RecoveryAction::NavmeshWaypoint,
            RecoveryAction::ShuttleFallback,
            RecoveryAction::SafeLogout,
        ]
    }

    /// Position on the ladder; cost and disruption grow with rank
    pub fn rank(&self) -> u8 {
        match self {
            RecoveryAction::MicroPathJitter => 0,
            RecoveryAction::MountToggle => 1,
            RecoveryAction::FaceCameraRescan => 2,
            RecoveryAction::NavmeshWaypoint => 3,
            RecoveryAction::ShuttleFallback => 4,
            RecoveryAction::SafeLogout => 5,
        }
    }

    /// Multiplier applied to the base cooldown
    pub fn disruption_factor(&self) -> f64 {
        match self {
            RecoveryAction::MicroPathJitter => 1.0,
            RecoveryAction::MountToggle => 2.0,
            RecoveryAction::FaceCameraRescan => 2.0,
            RecoveryAction::NavmeshWaypoint => 10.0,
            RecoveryAction::ShuttleFallback => 30.0,
            RecoveryAction::SafeLogout => 120.0,
        }
    }

    /// Default collaborator timeout in seconds
    pub fn default_timeout_secs(&self) -> f64 {
        match self {
            RecoveryAction::MicroPathJitter | RecoveryAction::MountToggle => 10.0,
            RecoveryAction::FaceCameraRescan => 15.0,
            RecoveryAction::NavmeshWaypoint
            | RecoveryAction::ShuttleFallback
            | RecoveryAction::SafeLogout => 30.0,
        }
    }

    /// Whether success is judged by the character actually moving
    pub fn verifies_movement(&self) -> bool {
        !matches!(self, RecoveryAction::SafeLogout)
    }

    /// Whether a failure of this action ends the episode as Fatal
    pub fn is_last_resort(&self) -> bool {
        matches!(self, RecoveryAction::SafeLogout)
    }

    /// Config/log key
    pub fn key(&self) -> &'static str {
        match self {
            RecoveryAction::MicroPathJitter => "micro_path_jitter",
            RecoveryAction::MountToggle => "mount_toggle",
            RecoveryAction::FaceCameraRescan => "face_camera_rescan",
            RecoveryAction::NavmeshWaypoint => "navmesh_waypoint",
            RecoveryAction::ShuttleFallback => "shuttle_fallback",
            RecoveryAction::SafeLogout => "safe_logout",
        }
    }
}

impl fmt::Display for RecoveryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Lifecycle of one attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

/// One execution of one recovery action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryAttempt {
    pub action: RecoveryAction,
    pub status: AttemptStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,

    /// Action-specific outcome payload
    pub result: Option<serde_json::Value>,

    /// Present iff `status == Failed`
    pub error_message: Option<String>,

    /// Earliest time this action may be selected again
    pub cooldown_until: Option<DateTime<Utc>>,
}

impl RecoveryAttempt {
    /// Create a pending attempt
    pub fn pending(action: RecoveryAction) -> Self {
        Self {
            action,
            status: AttemptStatus::Pending,
            start_time: None,
            end_time: None,
            result: None,
            error_message: None,
            cooldown_until: None,
        }
    }

    /// Mark the attempt as running
    pub fn start(&mut self, now: DateTime<Utc>) {
        self.status = AttemptStatus::Running;
        self.start_time = Some(now);
    }

    /// Mark the attempt as succeeded
    pub fn succeed(
        &mut self,
        now: DateTime<Utc>,
        result: serde_json::Value,
        cooldown_until: DateTime<Utc>,
    ) {
        self.status = AttemptStatus::Succeeded;
        self.end_time = Some(now);
        self.result = Some(result);
        self.error_message = None;
        self.cooldown_until = Some(cooldown_until);
    }

    /// Mark the attempt as failed
    pub fn fail(
        &mut self,
        now: DateTime<Utc>,
        error: impl Into<String>,
        result: Option<serde_json::Value>,
        cooldown_until: DateTime<Utc>,
    ) {
        self.status = AttemptStatus::Failed;
        self.end_time = Some(now);
        self.result = result;
        self.error_message = Some(error.into());
        self.cooldown_until = Some(cooldown_until);
    }

    /// Mark the attempt as skipped because the action is cooling down
    pub fn skip(&mut self, now: DateTime<Utc>, cooldown_until: DateTime<Utc>) {
        self.status = AttemptStatus::Skipped;
        self.start_time = Some(now);
        self.end_time = Some(now);
        self.result = Some(serde_json::json!({ "reason": "cooling_down" }));
        self.cooldown_until = Some(cooldown_until);
    }

    /// Whether the attempt reached a final status
    pub fn is_finished(&self) -> bool {
        matches!(
            self.status,
            AttemptStatus::Succeeded | AttemptStatus::Failed | AttemptStatus::Skipped
        )
    }

    /// Wall time the attempt took, if finished
    pub fn duration_ms(&self) -> Option<i64> {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds()),
            _ => None,
        }
    }
}

/// How an episode ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpisodeOutcome {
    /// An attempt got the character moving again
    Succeeded,

    /// Playbook or attempt cap ran out without success
    Exhausted,

    /// SafeLogout itself failed; needs a human
    Fatal,
}

impl fmt::Display for EpisodeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EpisodeOutcome::Succeeded => "succeeded",
            EpisodeOutcome::Exhausted => "exhausted",
            EpisodeOutcome::Fatal => "fatal",
        };
        f.write_str(s)
    }
}

/// Live state of the in-progress recovery episode
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecoveryState {
    /// Episode id, set while recovering
    pub episode_id: Option<Uuid>,

    pub is_recovering: bool,

    /// Attempt in flight
    pub current_attempt: Option<RecoveryAttempt>,

    /// Triggering detection
    pub stuck_detection: Option<StuckDetection>,

    /// Past attempts of this episode, in order
    pub recovery_history: Vec<RecoveryAttempt>,

    /// Candidates not yet tried, in order
    pub remaining_actions: VecDeque<RecoveryAction>,

    pub started_at: Option<DateTime<Utc>>,
}

impl RecoveryState {
    /// Begin a new episode
    pub fn begin(
        detection: StuckDetection,
        playbook: Vec<RecoveryAction>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            episode_id: Some(Uuid::new_v4()),
            is_recovering: true,
            current_attempt: None,
            stuck_detection: Some(detection),
            recovery_history: Vec::new(),
            remaining_actions: playbook.into(),
            started_at: Some(now),
        }
    }

    /// Attempts that actually ran (skipped ones excluded)
    pub fn attempts_executed(&self) -> usize {
        self.recovery_history
            .iter()
            .filter(|a| matches!(a.status, AttemptStatus::Succeeded | AttemptStatus::Failed))
            .count()
    }

    /// Reset to idle
    pub fn reset(&mut self) {
        *self = RecoveryState::default();
    }
}
