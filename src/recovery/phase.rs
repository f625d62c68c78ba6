//! Recovery episode state machine
//!
//! ```text
//! Idle ──suspect──▶ Detecting ──confirmed──▶ Recovering ──┬─▶ Succeeded ──settle──▶ Idle
//!   │                   │                                 ├─▶ Exhausted ──settle──▶ Idle
//!   └──────confirmed────┴────────────────────────────────▶└─▶ Fatal (latched until reset)
//! ```
//!
//! Guarantees:
//! - Determinism: unique next phase per (phase, event)
//! - At most one episode: `StuckConfirmed` is only accepted from Idle/Detecting
//! - Fatal only leaves through an administrative `Reset`

use crate::errors::{GuardError, Result};
use serde::{Deserialize, Serialize};

/// Engine phases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryPhase {
    /// Nothing suspicious
    Idle,

    /// A heuristic fired below the confidence threshold
    Detecting,

    /// Episode in progress
    Recovering,

    /// Episode ended with a successful attempt
    Succeeded,

    /// Episode ran out of candidates or hit the attempt cap
    Exhausted,

    /// SafeLogout failed; external intervention required
    Fatal,
}

/// Events that drive phase transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseEvent {
    /// Sub-threshold detection observed
    SuspectSignal,

    /// Scan came back clear
    SignalCleared,

    /// Actionable detection accepted
    StuckConfirmed,

    /// An attempt succeeded
    AttemptSucceeded,

    /// Candidates or attempt budget ran out
    PlaybookExhausted,

    /// The last-resort action failed
    LastResortFailed,

    /// Leave a finished episode on the next tick
    Settle,

    /// Administrative override
    Reset,
}

impl RecoveryPhase {
    /// Whether an episode just finished in this phase
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RecoveryPhase::Succeeded | RecoveryPhase::Exhausted | RecoveryPhase::Fatal
        )
    }

    /// Whether a new episode may start from this phase
    pub fn accepts_detection(&self) -> bool {
        matches!(self, RecoveryPhase::Idle | RecoveryPhase::Detecting)
    }

    /// Attempt a transition
    pub fn transition(&self, event: PhaseEvent) -> Result<RecoveryPhase> {
        use PhaseEvent::*;
        use RecoveryPhase::*;

        if event == Reset {
            return Ok(Idle);
        }

        let next = match (self, event) {
            (Idle, SuspectSignal) | (Detecting, SuspectSignal) => Detecting,
            (Idle, SignalCleared) | (Detecting, SignalCleared) => Idle,
            (Idle, StuckConfirmed) | (Detecting, StuckConfirmed) => Recovering,

            (Recovering, AttemptSucceeded) => Succeeded,
            (Recovering, PlaybookExhausted) => Exhausted,
            (Recovering, LastResortFailed) => Fatal,

            (Succeeded, Settle) | (Exhausted, Settle) => Idle,
            (Fatal, Settle) => Fatal,
            (Idle, Settle) => Idle,
            (Detecting, Settle) => Detecting,

            (from, event) => {
                return Err(GuardError::InvalidTransition {
                    from: format!("{:?}", from),
                    to: format!("(via {:?})", event),
                    reason: format!("No valid transition from {:?} on {:?}", from, event),
                });
            }
        };

        Ok(next)
    }

    /// Human-readable phase name
    pub fn display_name(&self) -> &'static str {
        match self {
            RecoveryPhase::Idle => "Idle",
            RecoveryPhase::Detecting => "Detecting",
            RecoveryPhase::Recovering => "Recovering",
            RecoveryPhase::Succeeded => "Recovered",
            RecoveryPhase::Exhausted => "Exhausted",
            RecoveryPhase::Fatal => "Fatal",
        }
    }
}

impl Default for RecoveryPhase {
    fn default() -> Self {
        RecoveryPhase::Idle
    }
}
