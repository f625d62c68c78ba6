//! Error types for stuckguard
//!
//! Only the construction-time surface is fallible: loading and validating
//! configuration, opening or replaying the event log, and state machine
//! transitions. Recovery action failures are never errors; they become
//! `Failed` attempts and state transitions inside the executor.

use thiserror::Error;

/// Main error type for the stuck-recovery engine
#[derive(Error, Debug)]
pub enum GuardError {
    /// State machine transition errors
    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidTransition {
        from: String,
        to: String,
        reason: String,
    },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Playbook definition errors
    #[error("Invalid playbook for {stuck_type}: {reason}")]
    InvalidPlaybook { stuck_type: String, reason: String },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing errors
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Generic errors with context
    #[error("Guard error: {0}")]
    Generic(String),
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, GuardError>;

/// Convert anyhow errors to GuardError
impl From<anyhow::Error> for GuardError {
    fn from(err: anyhow::Error) -> Self {
        GuardError::Generic(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_transition_display() {
        let err = GuardError::InvalidTransition {
            from: "Idle".to_string(),
            to: "(via AttemptSucceeded)".to_string(),
            reason: "no episode in flight".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("Idle"));
        assert!(msg.contains("AttemptSucceeded"));
    }

    #[test]
    fn test_invalid_playbook_display() {
        let err = GuardError::InvalidPlaybook {
            stuck_type: "path_oscillation".to_string(),
            reason: "empty action list".to_string(),
        };
        assert!(err.to_string().contains("path_oscillation"));
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn test_from_anyhow() {
        let err: GuardError = anyhow::anyhow!("boom").into();
        assert!(matches!(err, GuardError::Generic(ref m) if m == "boom"));
    }
}
