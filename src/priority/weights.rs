//! Static weight tables

use std::collections::HashMap;

use super::action::ActionType;

/// Base weight of an action type
pub fn base_weight(action_type: ActionType) -> f64 {
    match action_type {
        ActionType::Attack => 1.0,
        ActionType::Defend => 0.9,
        ActionType::Heal => 0.8,
        ActionType::Collect => 0.7,
        ActionType::Move => 0.6,
        ActionType::Interact => 0.5,
        ActionType::UseItem => 0.6,
        ActionType::Other => 0.5,
    }
}

/// Built-in game-type multipliers
const GAME_TYPE_TABLE: &[(&str, &[(ActionType, f64)])] = &[
    (
        "rpg",
        &[
            (ActionType::Attack, 1.1),
            (ActionType::Heal, 1.2),
            (ActionType::Interact, 1.3),
            (ActionType::UseItem, 1.2),
        ],
    ),
    (
        "shooter",
        &[
            (ActionType::Attack, 1.4),
            (ActionType::Defend, 1.2),
            (ActionType::Move, 1.1),
            (ActionType::Collect, 0.8),
        ],
    ),
    (
        "puzzle",
        &[
            (ActionType::Interact, 1.4),
            (ActionType::Move, 1.2),
            (ActionType::Attack, 0.5),
        ],
    ),
    (
        "platformer",
        &[
            (ActionType::Move, 1.4),
            (ActionType::Collect, 1.2),
            (ActionType::Attack, 0.9),
        ],
    ),
    (
        "strategy",
        &[
            (ActionType::Collect, 1.3),
            (ActionType::Defend, 1.2),
            (ActionType::Interact, 1.1),
        ],
    ),
];

/// Game-type multipliers, built-in table plus configured overrides
#[derive(Debug, Clone, Default)]
pub struct GameTypeWeights {
    overrides: HashMap<String, HashMap<String, f64>>,
}

impl GameTypeWeights {
    pub fn new(overrides: HashMap<String, HashMap<String, f64>>) -> Self {
        let overrides = overrides
            .into_iter()
            .map(|(game, weights)| {
                let weights = weights
                    .into_iter()
                    .map(|(action, w)| (action.to_lowercase(), w))
                    .collect();
                (game.to_lowercase(), weights)
            })
            .collect();
        Self { overrides }
    }

    /// Multiplier for `action_type` in `game_type`, if one is defined
    pub fn weight(&self, game_type: &str, action_type: ActionType) -> Option<f64> {
        let game_type = game_type.to_lowercase();

        if let Some(weight) = self
            .overrides
            .get(&game_type)
            .and_then(|w| w.get(action_type.as_str()))
        {
            return Some(*weight);
        }

        GAME_TYPE_TABLE
            .iter()
            .find(|(game, _)| *game == game_type)
            .and_then(|(_, weights)| weights.iter().find(|(kind, _)| *kind == action_type))
            .map(|(_, w)| *w)
    }
}
