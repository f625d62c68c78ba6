//! Signal collection for stuck detection

pub mod collector;

pub use collector::{
    ActiveQuest, BufferLevels, ClickEvent, CoordinateSample, QuestProgressSample, SignalCollector,
};
