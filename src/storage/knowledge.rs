//! Export and import of learned knowledge

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::analysis::{CausalRelationship, EnemyPattern, Pattern, Rule};

/// Everything the engine has learned, in a serializable form
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeSnapshot {
    #[serde(default)]
    pub rules: Vec<Rule>,
    #[serde(default)]
    pub patterns: Vec<Pattern>,
    #[serde(default)]
    pub enemy_patterns: Vec<EnemyPattern>,
    #[serde(default)]
    pub causal: Vec<CausalRelationship>,
}

impl KnowledgeSnapshot {
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
            && self.patterns.is_empty()
            && self.enemy_patterns.is_empty()
            && self.causal.is_empty()
    }
}

/// Load a knowledge snapshot from file
pub fn load_knowledge(path: &Path) -> Result<KnowledgeSnapshot> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read knowledge: {:?}", path))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse knowledge: {:?}", path))
}

/// Save a knowledge snapshot to file
pub fn save_knowledge(snapshot: &KnowledgeSnapshot, path: &Path) -> Result<()> {
    let content = serde_json::to_string_pretty(snapshot)?;
    std::fs::write(path, content).with_context(|| format!("Failed to write knowledge: {:?}", path))?;
    Ok(())
}
