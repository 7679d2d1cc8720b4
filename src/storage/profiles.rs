//! Game profile storage and loading
//!
//! A profile seeds the engine with known rules for a game, such as
//! objectives or strategies written by hand.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::analysis::{Rule, RuleType};
use crate::shared::ValueMap;

fn default_confidence() -> f64 {
    0.8
}

/// A game profile definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameProfile {
    /// Profile identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Game type for game-specific weights (e.g. "rpg")
    #[serde(default)]
    pub game_type: Option<String>,
    /// Rules to seed
    #[serde(default)]
    pub rules: Vec<RuleDefinition>,
}

/// A hand-written rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDefinition {
    pub rule_type: RuleType,
    pub description: String,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default)]
    pub parameters: ValueMap,
    /// Rhai condition gating recommendations
    #[serde(default)]
    pub condition: Option<String>,
}

impl RuleDefinition {
    pub fn to_rule(&self) -> Rule {
        let rule = Rule::new(self.rule_type, self.description.clone(), self.confidence)
            .with_parameters(self.parameters.clone());
        match &self.condition {
            Some(condition) if !condition.trim().is_empty() => rule.with_condition(condition.clone()),
            _ => rule,
        }
    }
}

/// Load a game profile from file
pub fn load_profile(path: &Path) -> Result<GameProfile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read profile: {:?}", path))?;
    let profile: GameProfile = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse profile: {:?}", path))?;
    Ok(profile)
}

/// Save a game profile to file
pub fn save_profile(profile: &GameProfile, path: &Path) -> Result<()> {
    let content = serde_json::to_string_pretty(profile)?;
    std::fs::write(path, content)?;
    Ok(())
}
