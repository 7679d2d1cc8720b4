//! Candidate actions and their coarse classification

use serde::{Deserialize, Serialize};
use std::fmt;
use strsim::jaro_winkler;

use crate::shared::ValueMap;

/// Minimum Jaro-Winkler similarity for a fuzzy action-type match
const FUZZY_THRESHOLD: f64 = 0.9;

fn new_action_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn default_base_priority() -> f64 {
    1.0
}

/// A candidate next action, as produced by the orchestrator or a model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameAction {
    #[serde(default = "new_action_id")]
    pub id: String,
    /// Declared type, e.g. "attack", "tap", "drink_potion"
    pub action_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default)]
    pub parameters: ValueMap,
    #[serde(default = "default_base_priority")]
    pub base_priority: f64,
    /// Producer's confidence in the action, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl GameAction {
    /// Create an action with a fresh id and base priority 1.0
    pub fn new(action_type: impl Into<String>) -> Self {
        Self {
            id: new_action_id(),
            action_type: action_type.into(),
            target: None,
            parameters: ValueMap::new(),
            base_priority: default_base_priority(),
            confidence: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_base_priority(mut self, base_priority: f64) -> Self {
        self.base_priority = base_priority;
        self
    }

    pub fn with_parameters(mut self, parameters: ValueMap) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    /// Target from the field or the `target` parameter
    pub fn target_name(&self) -> Option<&str> {
        self.target
            .as_deref()
            .or_else(|| self.parameters.text("target"))
            .filter(|t| !t.is_empty())
    }

    /// Key used for success and feedback history: `<type>` or `<type>_<target>`
    pub fn history_key(&self) -> String {
        let action_type = classify_action(self);
        match self.target_name() {
            Some(target) => format!("{}_{}", action_type, target.to_lowercase()),
            None => action_type.to_string(),
        }
    }
}

/// Coarse action category used for weighting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Attack,
    Defend,
    Heal,
    Collect,
    Move,
    Interact,
    UseItem,
    Other,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Attack => "attack",
            ActionType::Defend => "defend",
            ActionType::Heal => "heal",
            ActionType::Collect => "collect",
            ActionType::Move => "move",
            ActionType::Interact => "interact",
            ActionType::UseItem => "use_item",
            ActionType::Other => "other",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Declared action names and the category they map to
const ACTION_TABLE: &[(&str, ActionType)] = &[
    ("attack", ActionType::Attack),
    ("hit", ActionType::Attack),
    ("shoot", ActionType::Attack),
    ("fire", ActionType::Attack),
    ("strike", ActionType::Attack),
    ("cast", ActionType::Attack),
    ("defend", ActionType::Defend),
    ("block", ActionType::Defend),
    ("dodge", ActionType::Defend),
    ("shield", ActionType::Defend),
    ("parry", ActionType::Defend),
    ("heal", ActionType::Heal),
    ("drink_potion", ActionType::Heal),
    ("restore", ActionType::Heal),
    ("collect", ActionType::Collect),
    ("pickup", ActionType::Collect),
    ("pick_up", ActionType::Collect),
    ("loot", ActionType::Collect),
    ("gather", ActionType::Collect),
    ("move", ActionType::Move),
    ("walk", ActionType::Move),
    ("run", ActionType::Move),
    ("jump", ActionType::Move),
    ("swipe", ActionType::Move),
    ("navigate", ActionType::Move),
    ("interact", ActionType::Interact),
    ("talk", ActionType::Interact),
    ("open", ActionType::Interact),
    ("use", ActionType::UseItem),
    ("use_item", ActionType::UseItem),
    ("equip", ActionType::UseItem),
    ("consume", ActionType::UseItem),
];

/// Generic input actions classified by their target
const GENERIC_ACTIONS: &[&str] = &["tap", "click", "press", "touch", "select"];

const TARGET_HINTS: &[(&[&str], ActionType)] = &[
    (&["enemy", "boss", "monster"], ActionType::Attack),
    (&["potion", "health", "medkit"], ActionType::Heal),
    (&["coin", "gem", "item", "loot"], ActionType::Collect),
    (&["door", "chest", "npc", "lever"], ActionType::Interact),
];

/// Classify an action by its declared type, falling back to its target
pub fn classify_action(action: &GameAction) -> ActionType {
    let declared = action.action_type.trim().to_lowercase().replace([' ', '-'], "_");

    if let Some((_, kind)) = ACTION_TABLE.iter().find(|(name, _)| *name == declared) {
        return *kind;
    }

    let is_generic = GENERIC_ACTIONS.contains(&declared.as_str());
    if !is_generic && !declared.is_empty() {
        let best = ACTION_TABLE
            .iter()
            .map(|(name, kind)| (jaro_winkler(name, &declared), *kind))
            .max_by(|a, b| a.0.total_cmp(&b.0));
        if let Some((score, kind)) = best {
            if score >= FUZZY_THRESHOLD {
                return kind;
            }
        }
    }

    if let Some(target) = action.target_name() {
        let target = target.to_lowercase();
        for (hints, kind) in TARGET_HINTS {
            if hints.iter().any(|h| target.contains(h)) {
                return *kind;
            }
        }
    }

    if is_generic {
        ActionType::Interact
    } else {
        ActionType::Other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_table() {
        assert_eq!(classify_action(&GameAction::new("attack")), ActionType::Attack);
        assert_eq!(classify_action(&GameAction::new("Drink Potion")), ActionType::Heal);
        assert_eq!(classify_action(&GameAction::new("use_item")), ActionType::UseItem);
    }

    #[test]
    fn test_fuzzy_match() {
        assert_eq!(classify_action(&GameAction::new("attacks")), ActionType::Attack);
        assert_eq!(classify_action(&GameAction::new("colect")), ActionType::Collect);
    }

    #[test]
    fn test_tap_uses_target() {
        let tap = |target: &str| GameAction::new("tap").with_target(target);
        assert_eq!(classify_action(&tap("enemy_goblin")), ActionType::Attack);
        assert_eq!(classify_action(&tap("red_potion")), ActionType::Heal);
        assert_eq!(classify_action(&tap("gem")), ActionType::Collect);
        assert_eq!(classify_action(&tap("chest")), ActionType::Interact);
        assert_eq!(classify_action(&tap("background")), ActionType::Interact);
    }

    #[test]
    fn test_unknown_action_is_other() {
        assert_eq!(classify_action(&GameAction::new("xyzzy")), ActionType::Other);
        assert_eq!(classify_action(&GameAction::new("")), ActionType::Other);
    }

    #[test]
    fn test_history_key() {
        assert_eq!(GameAction::new("pickup").with_target("Gem").history_key(), "collect_gem");
        assert_eq!(GameAction::new("jump").history_key(), "move");
    }

    #[test]
    fn test_deserialize_defaults() {
        let action: GameAction = serde_json::from_str(r#"{"action_type": "heal"}"#).unwrap();
        assert!(!action.id.is_empty());
        assert_eq!(action.base_priority, 1.0);
        assert!(action.target.is_none());
    }
}
