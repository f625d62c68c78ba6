//! Planar positions reported by the movement/OCR collaborators

use serde::{Deserialize, Serialize};
use std::fmt;

/// A 2D world coordinate as read off the game client
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    /// Create a position
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another position
    pub fn distance_to(&self, other: &Position) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// Position displaced by `distance` along `angle_rad`
    pub fn offset(&self, angle_rad: f64, distance: f64) -> Position {
        Position {
            x: self.x + angle_rad.cos() * distance,
            y: self.y + angle_rad.sin() * distance,
        }
    }

    /// Check if both positions lie within `tolerance` of each other
    pub fn approx_eq(&self, other: &Position, tolerance: f64) -> bool {
        self.distance_to(other) <= tolerance
    }
}

impl From<(f64, f64)> for Position {
    fn from((x, y): (f64, f64)) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.1}, {:.1})", self.x, self.y)
    }
}
