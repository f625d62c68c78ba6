//! Engine configuration
//!
//! Loaded once from TOML at startup and validated before any component is
//! built. Every field has a default so a partial file only overrides what it
//! names.

use crate::clock::{secs_to_duration, MAX_DURATION_SECS};
use crate::detection::StuckType;
use crate::errors::{GuardError, Result as GuardResult};
use crate::recovery::playbook::PlaybookProfile;
use crate::recovery::RecoveryAction;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Longest collaborator timeout an action may configure
pub const MAX_TIMEOUT_SECS: f64 = 86_400.0;

/// Upper bound for the per-failure backoff multiplier
pub const MAX_COOLDOWN_MULTIPLIER: f64 = 100.0;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub detection: DetectionConfig,
    pub recovery: RecoveryConfig,
    pub event_log: EventLogConfig,
    pub playbooks: PlaybookOverrides,
    pub actions: ActionTable,
    pub navmesh_waypoints: Vec<NavmeshWaypoint>,
}

/// Heuristic thresholds and rolling window sizes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Max positional change (units) under which the character counts as stationary
    pub coordinate_delta_threshold: f64,

    /// Coordinate samples required and kept (N)
    pub coordinate_window: usize,

    /// Identical trailing clicks that trigger RepeatClicks (K)
    pub repeat_click_threshold: usize,

    /// Click history capacity
    pub click_history_size: usize,

    /// Confidence added per identical click beyond K
    pub repeat_click_confidence_step: f64,

    /// Seconds without quest progress before NoQuestProgress fires
    pub quest_progress_timeout_secs: f64,

    /// Quest progress history capacity
    pub quest_history_size: usize,

    /// Path point history capacity
    pub path_history_size: usize,

    /// Distance under which two path points count as the same point
    pub oscillation_tolerance: f64,

    /// Minimum confidence for a detection to start recovery
    pub detection_confidence_threshold: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            coordinate_delta_threshold: 5.0,
            coordinate_window: 10,
            repeat_click_threshold: 5,
            click_history_size: 10,
            repeat_click_confidence_step: 0.1,
            quest_progress_timeout_secs: 300.0,
            quest_history_size: 20,
            path_history_size: 6,
            oscillation_tolerance: 2.0,
            detection_confidence_threshold: 0.7,
        }
    }
}

/// Episode limits, cooldowns and backoff
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Hard cap on executed attempts per episode
    pub max_recovery_attempts: usize,

    /// Base cooldown scaled by each action's disruption factor
    pub recovery_cooldown_base_secs: f64,

    /// Backoff multiplier per repeated failure of the same action
    pub recovery_cooldown_multiplier: f64,

    /// Upper bound for any cooldown
    pub max_cooldown_secs: f64,

    /// Window in which repeated failures of an action compound
    pub backoff_window_secs: f64,

    /// Failure cooldown as a fraction of the success cooldown
    pub failure_cooldown_ratio: f64,

    /// Minimum displacement for a movement-verified action to count as success
    pub success_displacement: f64,

    /// Built-in playbook family
    pub playbook: PlaybookProfile,

    /// Action used when every playbook candidate is cooling down
    pub universal_fallback: RecoveryAction,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_recovery_attempts: 6,
            recovery_cooldown_base_secs: 30.0,
            recovery_cooldown_multiplier: 2.0,
            max_cooldown_secs: 3600.0,
            backoff_window_secs: 900.0,
            failure_cooldown_ratio: 0.25,
            success_displacement: 1.0,
            playbook: PlaybookProfile::Standard,
            universal_fallback: RecoveryAction::SafeLogout,
        }
    }
}

/// Event log sink settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventLogConfig {
    /// JSONL file; in-memory only when unset
    pub path: Option<PathBuf>,

    /// Number of events kept for the timeline
    pub timeline_capacity: usize,
}

impl Default for EventLogConfig {
    fn default() -> Self {
        Self {
            path: None,
            timeline_capacity: 200,
        }
    }
}

/// Per stuck type playbook overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybookOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub no_coordinate_delta: Option<Vec<RecoveryAction>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repeat_clicks: Option<Vec<RecoveryAction>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub no_quest_progress: Option<Vec<RecoveryAction>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path_oscillation: Option<Vec<RecoveryAction>>,
}

impl PlaybookOverrides {
    /// Override for a stuck type, if configured
    pub fn get(&self, stuck_type: StuckType) -> Option<&[RecoveryAction]> {
        match stuck_type {
            StuckType::NoCoordinateDelta => self.no_coordinate_delta.as_deref(),
            StuckType::RepeatClicks => self.repeat_clicks.as_deref(),
            StuckType::NoQuestProgress => self.no_quest_progress.as_deref(),
            StuckType::PathOscillation => self.path_oscillation.as_deref(),
        }
    }

    /// Set the override for a stuck type
    pub fn set(&mut self, stuck_type: StuckType, actions: Vec<RecoveryAction>) {
        let slot = match stuck_type {
            StuckType::NoCoordinateDelta => &mut self.no_coordinate_delta,
            StuckType::RepeatClicks => &mut self.repeat_clicks,
            StuckType::NoQuestProgress => &mut self.no_quest_progress,
            StuckType::PathOscillation => &mut self.path_oscillation,
        };
        *slot = Some(actions);
    }
}

/// Optional per-action overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success_cooldown_secs: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_cooldown_secs: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jitter_radius: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nudge_distance: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub camera_degrees: Option<f64>,
}

/// Per-action tables, one per ladder rung
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionTable {
    pub micro_path_jitter: ActionSettings,
    pub mount_toggle: ActionSettings,
    pub face_camera_rescan: ActionSettings,
    pub navmesh_waypoint: ActionSettings,
    pub shuttle_fallback: ActionSettings,
    pub safe_logout: ActionSettings,
}

impl ActionTable {
    /// Settings for an action
    pub fn get(&self, action: RecoveryAction) -> &ActionSettings {
        match action {
            RecoveryAction::MicroPathJitter => &self.micro_path_jitter,
            RecoveryAction::MountToggle => &self.mount_toggle,
            RecoveryAction::FaceCameraRescan => &self.face_camera_rescan,
            RecoveryAction::NavmeshWaypoint => &self.navmesh_waypoint,
            RecoveryAction::ShuttleFallback => &self.shuttle_fallback,
            RecoveryAction::SafeLogout => &self.safe_logout,
        }
    }

    /// Mutable settings for an action
    pub fn get_mut(&mut self, action: RecoveryAction) -> &mut ActionSettings {
        match action {
            RecoveryAction::MicroPathJitter => &mut self.micro_path_jitter,
            RecoveryAction::MountToggle => &mut self.mount_toggle,
            RecoveryAction::FaceCameraRescan => &mut self.face_camera_rescan,
            RecoveryAction::NavmeshWaypoint => &mut self.navmesh_waypoint,
            RecoveryAction::ShuttleFallback => &mut self.shuttle_fallback,
            RecoveryAction::SafeLogout => &mut self.safe_logout,
        }
    }
}

/// A known-reachable point in the walkable-area graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavmeshWaypoint {
    pub id: String,
    pub x: f64,
    pub y: f64,
}

/// Fully resolved settings for one action
#[derive(Debug, Clone, PartialEq)]
pub struct ActionProfile {
    pub action: RecoveryAction,
    pub timeout: Duration,
    pub success_cooldown: chrono::Duration,
    pub failure_cooldown: chrono::Duration,
    pub jitter_radius: f64,
    pub nudge_distance: f64,
    pub camera_degrees: f64,
}

impl EngineConfig {
    /// Load configuration from the default path, creating it if missing
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            let config = EngineConfig::default();
            config.save_to(&config_path)?;
            return Ok(config);
        }

        Self::load_from(&config_path)
    }

    /// Load and validate configuration from an explicit path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let config = Self::from_toml_str(&contents)
            .with_context(|| format!("Invalid config file {}", path.display()))?;

        Ok(config)
    }

    /// Parse and validate configuration text
    pub fn from_toml_str(contents: &str) -> GuardResult<Self> {
        let config: EngineConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let toml_string = self.to_toml_string()?;

        fs::write(path, toml_string).context("Failed to write config file")?;

        Ok(())
    }

    /// Render as pretty TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }

    /// Get the default configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not determine home directory")?;

        Ok(home.join(".stuckguard").join("config.toml"))
    }

    /// Resolve the effective settings for an action
    pub fn action_profile(&self, action: RecoveryAction) -> ActionProfile {
        let settings = self.actions.get(action);
        let recovery = &self.recovery;

        let success_secs = settings.success_cooldown_secs.unwrap_or(
            recovery.recovery_cooldown_base_secs * action.disruption_factor(),
        );
        let failure_secs = settings
            .failure_cooldown_secs
            .unwrap_or(success_secs * recovery.failure_cooldown_ratio);
        let timeout_secs = settings
            .timeout_secs
            .unwrap_or_else(|| action.default_timeout_secs());

        ActionProfile {
            action,
            timeout: Duration::try_from_secs_f64(timeout_secs.clamp(0.0, MAX_TIMEOUT_SECS))
                .unwrap_or(Duration::from_secs(MAX_TIMEOUT_SECS as u64)),
            success_cooldown: secs_to_duration(success_secs.min(recovery.max_cooldown_secs)),
            failure_cooldown: secs_to_duration(failure_secs.min(recovery.max_cooldown_secs)),
            jitter_radius: settings.jitter_radius.unwrap_or(4.0),
            nudge_distance: settings.nudge_distance.unwrap_or(5.0),
            camera_degrees: settings.camera_degrees.unwrap_or(90.0),
        }
    }

    /// Validate every field once; components assume a valid config
    pub fn validate(&self) -> GuardResult<()> {
        let d = &self.detection;
        let r = &self.recovery;

        positive("detection.coordinate_delta_threshold", d.coordinate_delta_threshold)?;
        positive("detection.quest_progress_timeout_secs", d.quest_progress_timeout_secs)?;
        at_most(
            "detection.quest_progress_timeout_secs",
            d.quest_progress_timeout_secs,
            MAX_DURATION_SECS,
        )?;
        positive("detection.oscillation_tolerance", d.oscillation_tolerance)?;
        non_negative("detection.repeat_click_confidence_step", d.repeat_click_confidence_step)?;

        if !(d.detection_confidence_threshold > 0.0 && d.detection_confidence_threshold <= 1.0) {
            return Err(GuardError::Config(format!(
                "detection.detection_confidence_threshold must be in (0, 1], got {}",
                d.detection_confidence_threshold
            )));
        }
        if d.coordinate_window < 2 {
            return Err(GuardError::Config(
                "detection.coordinate_window must be at least 2".to_string(),
            ));
        }
        if d.repeat_click_threshold < 2 {
            return Err(GuardError::Config(
                "detection.repeat_click_threshold must be at least 2".to_string(),
            ));
        }
        if d.click_history_size < d.repeat_click_threshold {
            return Err(GuardError::Config(format!(
                "detection.click_history_size ({}) must hold repeat_click_threshold ({}) clicks",
                d.click_history_size, d.repeat_click_threshold
            )));
        }
        if d.path_history_size < crate::detection::OSCILLATION_WINDOW {
            return Err(GuardError::Config(format!(
                "detection.path_history_size must be at least {}",
                crate::detection::OSCILLATION_WINDOW
            )));
        }
        if d.quest_history_size == 0 {
            return Err(GuardError::Config(
                "detection.quest_history_size must be positive".to_string(),
            ));
        }

        if r.max_recovery_attempts == 0 {
            return Err(GuardError::Config(
                "recovery.max_recovery_attempts must be positive".to_string(),
            ));
        }
        positive("recovery.recovery_cooldown_base_secs", r.recovery_cooldown_base_secs)?;
        positive("recovery.max_cooldown_secs", r.max_cooldown_secs)?;
        positive("recovery.backoff_window_secs", r.backoff_window_secs)?;
        at_most("recovery.max_cooldown_secs", r.max_cooldown_secs, MAX_DURATION_SECS)?;
        at_most("recovery.backoff_window_secs", r.backoff_window_secs, MAX_DURATION_SECS)?;
        non_negative("recovery.success_displacement", r.success_displacement)?;
        if !(r.recovery_cooldown_multiplier >= 1.0
            && r.recovery_cooldown_multiplier <= MAX_COOLDOWN_MULTIPLIER)
        {
            return Err(GuardError::Config(format!(
                "recovery.recovery_cooldown_multiplier must be in [1, {}], got {}",
                MAX_COOLDOWN_MULTIPLIER, r.recovery_cooldown_multiplier
            )));
        }
        if r.max_cooldown_secs < r.recovery_cooldown_base_secs {
            return Err(GuardError::Config(
                "recovery.max_cooldown_secs must not be below recovery_cooldown_base_secs"
                    .to_string(),
            ));
        }
        if !(r.failure_cooldown_ratio > 0.0 && r.failure_cooldown_ratio < 1.0) {
            return Err(GuardError::Config(format!(
                "recovery.failure_cooldown_ratio must be in (0, 1), got {}",
                r.failure_cooldown_ratio
            )));
        }

        for action in RecoveryAction::ladder() {
            let s = self.actions.get(action);
            for (field, value) in [
                ("timeout_secs", s.timeout_secs),
                ("success_cooldown_secs", s.success_cooldown_secs),
                ("failure_cooldown_secs", s.failure_cooldown_secs),
                ("jitter_radius", s.jitter_radius),
                ("nudge_distance", s.nudge_distance),
            ] {
                if let Some(v) = value {
                    non_negative(&format!("actions.{}.{}", action, field), v)?;
                }
            }
            if let Some(v) = s.timeout_secs {
                at_most(&format!("actions.{}.timeout_secs", action), v, MAX_TIMEOUT_SECS)?;
            }
            for (field, value) in [
                ("success_cooldown_secs", s.success_cooldown_secs),
                ("failure_cooldown_secs", s.failure_cooldown_secs),
            ] {
                if let Some(v) = value {
                    at_most(&format!("actions.{}.{}", action, field), v, MAX_DURATION_SECS)?;
                }
            }
        }

        for stuck_type in StuckType::all() {
            if let Some(actions) = self.playbooks.get(stuck_type) {
                crate::recovery::playbook::validate_playbook(stuck_type, actions)?;
            }
        }

        if self.event_log.timeline_capacity == 0 {
            return Err(GuardError::Config(
                "event_log.timeline_capacity must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

fn positive(field: &str, value: f64) -> GuardResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(GuardError::Config(format!("{} must be positive, got {}", field, value)))
    }
}

fn at_most(field: &str, value: f64, max: f64) -> GuardResult<()> {
    if value <= max {
        Ok(())
    } else {
        Err(GuardError::Config(format!("{} must be at most {}, got {}", field, max, value)))
    }
}

fn non_negative(field: &str, value: f64) -> GuardResult<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(GuardError::Config(format!("{} must not be negative, got {}", field, value)))
    }
}
