//! Application Configuration
//!
//! Tuning knobs for the observation history, miners, inference and
//! prioritization, stored in TOML format.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Application settings
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Observation history settings
    pub observation: ObservationSettings,
    /// Pattern mining settings
    pub mining: MiningSettings,
    /// Rule inference settings
    pub inference: InferenceSettings,
    /// Entity tracking settings
    pub tracking: TrackingSettings,
    /// Background analysis scheduling
    pub scheduler: SchedulerSettings,
    /// Action prioritization settings
    pub priority: PrioritySettings,
}

/// Observation history settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservationSettings {
    /// Number of observations kept for mining
    pub history_size: usize,
    /// Number of snapshots kept per tracked entity
    pub entity_history_size: usize,
}

impl Default for ObservationSettings {
    fn default() -> Self {
        Self {
            history_size: 200,
            entity_history_size: 50,
        }
    }
}

/// Pattern mining settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MiningSettings {
    /// Shortest subsequence considered
    pub min_window: usize,
    /// Longest subsequence considered
    pub max_window: usize,
    /// Relative tolerance for numeric step parameters
    pub numeric_tolerance: f64,
    /// Allowed duration difference as a fraction of the longer duration
    pub duration_tolerance: f64,
    /// Relative change of a numeric feature that makes a window significant
    pub significance_threshold: f64,
    /// Consistency assigned to a newly created pattern
    pub initial_consistency: f64,
    /// No new patterns are created past this count
    pub max_patterns: usize,
}

impl Default for MiningSettings {
    fn default() -> Self {
        Self {
            min_window: 2,
            max_window: 10,
            numeric_tolerance: 0.1,
            duration_tolerance: 0.3,
            significance_threshold: 0.2,
            initial_consistency: 0.5,
            max_patterns: 1000,
        }
    }
}

/// Rule inference settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceSettings {
    /// Patterns must exceed this consistency to become rules
    pub min_consistency: f64,
    /// Patterns must have matched at least this often to become rules
    pub min_matches: u32,
    /// Relative numeric change that counts as a state change for causality
    pub causal_change_threshold: f64,
    /// Causal relationships observed this often become causal rules
    pub causal_rule_min_observations: u32,
    /// Enemy patterns detected this often become strategy rules
    pub strategy_rule_min_detections: u32,
}

impl Default for InferenceSettings {
    fn default() -> Self {
        Self {
            min_consistency: 0.5,
            min_matches: 3,
            causal_change_threshold: 0.1,
            causal_rule_min_observations: 5,
            strategy_rule_min_detections: 3,
        }
    }
}

/// Entity tracking settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingSettings {
    /// Element categories that are tracked as entities
    pub tracked_categories: Vec<String>,
    /// Entity types whose movement is mined for enemy patterns
    pub enemy_categories: Vec<String>,
    /// A movement step ends when no observation arrives within this interval
    pub step_interval_ms: u64,
    /// Snapshots of one entity required before mining its movement
    pub min_observations: usize,
    /// Movement steps required before an enemy pattern is created
    pub min_steps: usize,
    /// Longest step sequence stored in an enemy pattern
    pub max_pattern_steps: usize,
    /// Enemy patterns kept; known ones are still matched beyond this
    pub max_enemy_patterns: usize,
}

impl Default for TrackingSettings {
    fn default() -> Self {
        Self {
            tracked_categories: ["enemy", "boss", "player", "npc", "projectile"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            enemy_categories: vec!["enemy".to_string(), "boss".to_string()],
            step_interval_ms: 1000,
            min_observations: 3,
            min_steps: 3,
            max_pattern_steps: 6,
            max_enemy_patterns: 1000,
        }
    }
}

/// Background analysis scheduling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    /// Delay before the first analysis tick
    pub initial_delay_ms: u64,
    /// Interval between analysis ticks
    pub interval_ms: u64,
    /// How long `stop` waits for the analysis thread before detaching it
    pub shutdown_wait_ms: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            initial_delay_ms: 500,
            interval_ms: 1000,
            shutdown_wait_ms: 250,
        }
    }
}

/// Action prioritization settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrioritySettings {
    /// Game type used for game-specific weights (e.g. "rpg", "shooter")
    pub game_type: Option<String>,
    /// Health below this value triggers the emergency heal factor
    pub emergency_health: f64,
    /// Upper bound for a final priority
    pub max_final_priority: f64,
    /// Rules below this confidence are not turned into recommendations
    pub recommendation_min_confidence: f64,
    /// Extra game-type weights: game type -> action type -> multiplier
    pub game_type_weights: HashMap<String, HashMap<String, f64>>,
}

impl Default for PrioritySettings {
    fn default() -> Self {
        Self {
            game_type: None,
            emergency_health: 0.2,
            max_final_priority: 10.0,
            recommendation_min_confidence: 0.7,
            game_type_weights: HashMap::new(),
        }
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {:?}", path))?;
    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config: {:?}", path))?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}
