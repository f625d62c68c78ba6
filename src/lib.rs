//! stuckguard - Stuck Detection & Laddered Recovery Engine
//!
//! Watches telemetry from an automated game character, decides when it is
//! stuck, and climbs an escalating ladder of recovery actions with
//! cooldowns, backoff and an append-only event log.
//!
//! # Architecture
//!
//! - **signals**: bounded rolling buffers fed by the telemetry collaborator
//! - **detection**: four heuristics, one detection per scan
//! - **recovery**: playbooks, cooldowns, the episode state machine and executor
//! - **actions**: movement collaborator contract and per-action execution
//! - **event_log**: JSONL audit log and dashboard timeline
//! - **engine**: the context object that ties it together, one tick at a time

pub mod errors;
pub mod clock;
pub mod config;
pub mod types;

pub mod signals;
pub mod detection;
pub mod recovery;
pub mod actions;
pub mod event_log;
pub mod engine;

// Simulated collaborator for tests and dry runs
pub mod sim;

pub mod cli;

// Re-export commonly used types
pub use errors::{GuardError, Result};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::EngineConfig;
pub use types::Position;
pub use detection::{StuckDetection, StuckType};
pub use recovery::{EpisodeOutcome, RecoveryAction, RecoveryAttempt, RecoveryPhase, RecoveryState};
pub use actions::MovementController;
pub use event_log::{EventLog, RecoveryEvent};
pub use engine::{RecoveryEngine, RecoveryStatus, SharedEngine, TickReport};
