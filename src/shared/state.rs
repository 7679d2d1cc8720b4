//! Game state derived from a processed frame

use crate::shared::value::ValueMap;

/// Flat game-state map (string key -> value) produced by the detector
pub type GameState = ValueMap;

/// Well-known game-state keys
pub mod keys {
    /// Player health, normalized to 0.0 - 1.0
    pub const HEALTH: &str = "health";
    /// Current score
    pub const SCORE: &str = "score";
    /// Current level or stage
    pub const LEVEL: &str = "level";
    /// Number of detected elements, filled in by the observation builder
    pub const ELEMENT_COUNT: &str = "element_count";
    /// Last action performed by the player
    pub const ACTION: &str = "action";
    /// Alternate key for the last action
    pub const LAST_ACTION: &str = "last_action";
    /// Target of the last action
    pub const TARGET: &str = "target";
    /// Movement direction
    pub const DIRECTION: &str = "direction";
}

/// Name of the action recorded in a game state, if any
pub fn action_name(state: &GameState) -> Option<&str> {
    state
        .text(keys::ACTION)
        .or_else(|| state.text(keys::LAST_ACTION))
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_name_fallback() {
        let state = GameState::new().with(keys::LAST_ACTION, "jump");
        assert_eq!(action_name(&state), Some("jump"));

        let state = GameState::new()
            .with(keys::ACTION, "tap")
            .with(keys::LAST_ACTION, "jump");
        assert_eq!(action_name(&state), Some("tap"));

        let state = GameState::new().with(keys::ACTION, "");
        assert_eq!(action_name(&state), None);
    }
}
