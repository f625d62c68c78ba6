//! Stuck recovery: escalation ladder, playbooks, cooldowns and episodes

pub mod cooldown;
pub mod executor;
pub mod phase;
pub mod playbook;
pub mod types;

pub use cooldown::CooldownTracker;
pub use executor::{EpisodeSummary, RecoveryExecutor};
pub use phase::{PhaseEvent, RecoveryPhase};
pub use playbook::{PlaybookProfile, PlaybookSelection, PlaybookSelector};
pub use types::{AttemptStatus, EpisodeOutcome, RecoveryAction, RecoveryAttempt, RecoveryState};
