//! Stuck detection over rolling signal windows

pub mod detector;
pub mod types;

pub use detector::{ScanOutcome, StuckDetector, OSCILLATION_WINDOW};
pub use types::{StuckDetection, StuckType};
