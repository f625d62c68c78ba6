//! Playbook selection: stuck type → ordered recovery candidates
//!
//! Every playbook climbs the ladder: disruption rank never decreases along
//! the list, and SafeLogout can only be the final rung.

use crate::config::PlaybookOverrides;
use crate::detection::StuckType;
use crate::errors::{GuardError, Result};
use crate::recovery::cooldown::CooldownTracker;
use crate::recovery::types::RecoveryAction;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use RecoveryAction::{
    FaceCameraRescan, MicroPathJitter, MountToggle, NavmeshWaypoint, SafeLogout, ShuttleFallback,
};

/// Built-in playbook families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybookProfile {
    /// Full ladder, cheapest first
    #[default]
    Standard,

    /// Skips cheap rungs and reaches travel actions early
    Aggressive,

    /// Cheap rungs only, then logout; never calls a shuttle
    Conservative,
}

impl PlaybookProfile {
    /// Built-in ladder for a stuck type
    pub fn playbook(&self, stuck_type: StuckType) -> Vec<RecoveryAction> {
        match (self, stuck_type) {
            (PlaybookProfile::Standard, StuckType::NoCoordinateDelta) => vec![
                MicroPathJitter,
                MountToggle,
                FaceCameraRescan,
                NavmeshWaypoint,
                ShuttleFallback,
                SafeLogout,
            ],
            (PlaybookProfile::Standard, StuckType::RepeatClicks) => vec![
                MicroPathJitter,
                FaceCameraRescan,
                NavmeshWaypoint,
                ShuttleFallback,
                SafeLogout,
            ],
            (PlaybookProfile::Standard, StuckType::NoQuestProgress) => {
                vec![FaceCameraRescan, NavmeshWaypoint, ShuttleFallback, SafeLogout]
            }
            (PlaybookProfile::Standard, StuckType::PathOscillation) => vec![
                MicroPathJitter,
                MountToggle,
                NavmeshWaypoint,
                ShuttleFallback,
                SafeLogout,
            ],

            (PlaybookProfile::Aggressive, StuckType::NoCoordinateDelta) => {
                vec![MicroPathJitter, NavmeshWaypoint, ShuttleFallback, SafeLogout]
            }
            (PlaybookProfile::Aggressive, StuckType::RepeatClicks) => {
                vec![FaceCameraRescan, NavmeshWaypoint, ShuttleFallback, SafeLogout]
            }
            (PlaybookProfile::Aggressive, StuckType::NoQuestProgress)
            | (PlaybookProfile::Aggressive, StuckType::PathOscillation) => {
                vec![NavmeshWaypoint, ShuttleFallback, SafeLogout]
            }

            (PlaybookProfile::Conservative, StuckType::NoCoordinateDelta)
            | (PlaybookProfile::Conservative, StuckType::PathOscillation) => vec![
                MicroPathJitter,
                MountToggle,
                FaceCameraRescan,
                NavmeshWaypoint,
                SafeLogout,
            ],
            (PlaybookProfile::Conservative, StuckType::RepeatClicks) => {
                vec![MicroPathJitter, FaceCameraRescan, NavmeshWaypoint, SafeLogout]
            }
            (PlaybookProfile::Conservative, StuckType::NoQuestProgress) => {
                vec![FaceCameraRescan, NavmeshWaypoint, SafeLogout]
            }
        }
    }
}

impl fmt::Display for PlaybookProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PlaybookProfile::Standard => "standard",
            PlaybookProfile::Aggressive => "aggressive",
            PlaybookProfile::Conservative => "conservative",
        };
        f.write_str(s)
    }
}

/// Check a playbook climbs the ladder
pub fn validate_playbook(stuck_type: StuckType, actions: &[RecoveryAction]) -> Result<()> {
    let invalid = |reason: String| GuardError::InvalidPlaybook {
        stuck_type: stuck_type.to_string(),
        reason,
    };

    if actions.is_empty() {
        return Err(invalid("empty action list".to_string()));
    }

    for pair in actions.windows(2) {
        if pair[1].rank() < pair[0].rank() {
            return Err(invalid(format!(
                "{} is less disruptive than the preceding {}",
                pair[1], pair[0]
            )));
        }
    }

    if let Some(pos) = actions.iter().position(|a| a.is_last_resort()) {
        if pos != actions.len() - 1 {
            return Err(invalid("safe_logout must be the final entry".to_string()));
        }
    }

    Ok(())
}

/// Candidates chosen for an episode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybookSelection {
    /// Candidates in execution order; empty only if even the fallback is cooling down
    pub actions: Vec<RecoveryAction>,

    /// Whether the universal fallback replaced an all-cooling playbook
    pub used_fallback: bool,
}

/// Maps stuck types to cooldown-filtered playbooks
#[derive(Debug, Clone)]
pub struct PlaybookSelector {
    profile: PlaybookProfile,
    overrides: PlaybookOverrides,
    universal_fallback: RecoveryAction,
}

impl PlaybookSelector {
    /// Create selector
    pub fn new(
        profile: PlaybookProfile,
        overrides: PlaybookOverrides,
        universal_fallback: RecoveryAction,
    ) -> Self {
        Self {
            profile,
            overrides,
            universal_fallback,
        }
    }

    /// Unfiltered playbook: config override first, then the built-in
    pub fn playbook_for(&self, stuck_type: StuckType) -> Vec<RecoveryAction> {
        self.overrides
            .get(stuck_type)
            .map(|actions| actions.to_vec())
            .unwrap_or_else(|| self.profile.playbook(stuck_type))
    }

    /// Playbook with cooling-down actions removed
    ///
    /// When nothing is left, falls back to the universal action instead of
    /// giving up silently.
    pub fn select(
        &self,
        stuck_type: StuckType,
        cooldowns: &CooldownTracker,
        now: DateTime<Utc>,
    ) -> PlaybookSelection {
        let actions: Vec<RecoveryAction> = self
            .playbook_for(stuck_type)
            .into_iter()
            .filter(|a| cooldowns.is_ready(*a, now))
            .collect();

        if !actions.is_empty() {
            return PlaybookSelection {
                actions,
                used_fallback: false,
            };
        }

        let fallback = if cooldowns.is_ready(self.universal_fallback, now) {
            vec![self.universal_fallback]
        } else {
            Vec::new()
        };

        PlaybookSelection {
            actions: fallback,
            used_fallback: true,
        }
    }

    pub fn profile(&self) -> PlaybookProfile {
        self.profile
    }

    pub fn universal_fallback(&self) -> RecoveryAction {
        self.universal_fallback
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RecoveryConfig;
    use chrono::Duration;

    fn selector(profile: PlaybookProfile) -> PlaybookSelector {
        PlaybookSelector::new(profile, PlaybookOverrides::default(), SafeLogout)
    }

    #[test]
    fn test_all_builtin_playbooks_valid() {
        for profile in [
            PlaybookProfile::Standard,
            PlaybookProfile::Aggressive,
            PlaybookProfile::Conservative,
        ] {
            for stuck_type in StuckType::all() {
                let playbook = profile.playbook(stuck_type);
                assert!(
                    validate_playbook(stuck_type, &playbook).is_ok(),
                    "{} / {}",
                    profile,
                    stuck_type
                );
            }
        }
    }

    #[test]
    fn test_standard_starts_cheap() {
        let s = selector(PlaybookProfile::Standard);
        let playbook = s.playbook_for(StuckType::NoCoordinateDelta);
        assert_eq!(playbook.first(), Some(&MicroPathJitter));
        assert_eq!(playbook.last(), Some(&SafeLogout));
        assert_eq!(playbook.len(), 6);
    }

    #[test]
    fn test_aggressive_escalates_earlier() {
        let standard = selector(PlaybookProfile::Standard).playbook_for(StuckType::NoCoordinateDelta);
        let aggressive =
            selector(PlaybookProfile::Aggressive).playbook_for(StuckType::NoCoordinateDelta);

        let pos = |p: &[RecoveryAction]| p.iter().position(|a| *a == ShuttleFallback).unwrap();
        assert!(pos(&aggressive) < pos(&standard));
    }

    #[test]
    fn test_conservative_never_uses_shuttle() {
        let s = selector(PlaybookProfile::Conservative);
        for stuck_type in StuckType::all() {
            assert!(!s.playbook_for(stuck_type).contains(&ShuttleFallback));
        }
    }

    #[test]
    fn test_override_wins() {
        let mut overrides = PlaybookOverrides::default();
        overrides.set(StuckType::RepeatClicks, vec![MountToggle, SafeLogout]);
        let s = PlaybookSelector::new(PlaybookProfile::Standard, overrides, SafeLogout);

        assert_eq!(s.playbook_for(StuckType::RepeatClicks), vec![MountToggle, SafeLogout]);
        assert_eq!(
            s.playbook_for(StuckType::PathOscillation),
            PlaybookProfile::Standard.playbook(StuckType::PathOscillation)
        );
    }

    #[test]
    fn test_select_filters_cooldowns() {
        let s = selector(PlaybookProfile::Standard);
        let mut cooldowns = CooldownTracker::new(&RecoveryConfig::default());
        let now = Utc::now();
        cooldowns.record_success(MicroPathJitter, now, Duration::seconds(30));

        let selection = s.select(StuckType::NoCoordinateDelta, &cooldowns, now);
        assert!(!selection.actions.contains(&MicroPathJitter));
        assert_eq!(selection.actions.first(), Some(&MountToggle));
        assert!(!selection.used_fallback);

        let later = s.select(StuckType::NoCoordinateDelta, &cooldowns, now + Duration::seconds(30));
        assert_eq!(later.actions.first(), Some(&MicroPathJitter));
    }

    #[test]
    fn test_select_falls_back_to_universal() {
        let mut overrides = PlaybookOverrides::default();
        overrides.set(StuckType::RepeatClicks, vec![MicroPathJitter, MountToggle]);
        let s = PlaybookSelector::new(PlaybookProfile::Standard, overrides, SafeLogout);

        let mut cooldowns = CooldownTracker::new(&RecoveryConfig::default());
        let now = Utc::now();
        cooldowns.record_failure(MicroPathJitter, now, Duration::seconds(30));
        cooldowns.record_failure(MountToggle, now, Duration::seconds(30));

        let selection = s.select(StuckType::RepeatClicks, &cooldowns, now);
        assert_eq!(selection.actions, vec![SafeLogout]);
        assert!(selection.used_fallback);
    }

    #[test]
    fn test_select_empty_when_fallback_cooling() {
        let s = selector(PlaybookProfile::Aggressive);
        let mut cooldowns = CooldownTracker::new(&RecoveryConfig::default());
        let now = Utc::now();
        for action in RecoveryAction::ladder() {
            cooldowns.record_success(action, now, Duration::seconds(60));
        }

        let selection = s.select(StuckType::PathOscillation, &cooldowns, now);
        assert!(selection.actions.is_empty());
        assert!(selection.used_fallback);
    }

    #[test]
    fn test_validate_rejects_bad_playbooks() {
        assert!(validate_playbook(StuckType::RepeatClicks, &[]).is_err());
        assert!(validate_playbook(StuckType::RepeatClicks, &[NavmeshWaypoint, MountToggle]).is_err());
        assert!(validate_playbook(StuckType::RepeatClicks, &[SafeLogout, SafeLogout]).is_err());
        assert!(validate_playbook(
            StuckType::RepeatClicks,
            &[MicroPathJitter, MicroPathJitter, MountToggle]
        )
        .is_ok());
    }
}
