//! Frame data handed over by the external detector

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::shared::{GameState, Rect, ValueMap};

/// A UI or game element detected on screen
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedElement {
    /// Detector-assigned identifier, stable across frames for the same entity
    pub id: String,
    /// Element category (e.g. "enemy", "coin", "button")
    pub category: String,
    /// Bounding box in screen coordinates
    pub bounds: Rect,
    /// Free-form attributes reported by the detector
    #[serde(default)]
    pub attributes: ValueMap,
}

impl DetectedElement {
    /// Create an element without attributes
    pub fn new(id: impl Into<String>, category: impl Into<String>, bounds: Rect) -> Self {
        Self {
            id: id.into(),
            category: category.into(),
            bounds,
            attributes: ValueMap::new(),
        }
    }

    /// Builder-style attribute insert
    pub fn with_attribute(mut self, key: &str, value: impl Into<crate::shared::Value>) -> Self {
        self.attributes.insert(key, value);
        self
    }
}

/// One processed frame: detected elements plus the derived game state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapturedFrame {
    /// Capture time in milliseconds since the Unix epoch
    #[serde(default = "now_ms")]
    pub timestamp_ms: u64,
    /// Elements found in the frame
    #[serde(default)]
    pub elements: Vec<DetectedElement>,
    /// Flat game state derived from the frame
    #[serde(default)]
    pub game_state: GameState,
}

impl CapturedFrame {
    /// Create a new frame stamped with the current time
    pub fn new(elements: Vec<DetectedElement>, game_state: GameState) -> Self {
        Self::at(now_ms(), elements, game_state)
    }

    /// Create a new frame with an explicit timestamp
    pub fn at(timestamp_ms: u64, elements: Vec<DetectedElement>, game_state: GameState) -> Self {
        Self {
            timestamp_ms,
            elements,
            game_state,
        }
    }
}

/// Current wall-clock time in milliseconds since the Unix epoch
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
