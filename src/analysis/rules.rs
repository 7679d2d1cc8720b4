//! Rule inference
//!
//! Consistent, frequently matched patterns are generalized into typed rules
//! with a natural-language description. Rules are identified by their type
//! and description, so re-inferring the same statement reinforces the
//! existing rule instead of adding a duplicate.

use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info};

use crate::analysis::causal::CausalRelationship;
use crate::analysis::content_id;
use crate::analysis::entities::{EnemyPattern, MOVE_ACTION};
use crate::analysis::patterns::{Pattern, PatternStep, MAX_CONSISTENCY};
use crate::config::InferenceSettings;
use crate::shared::{keys, ValueMap};

/// Example pattern ids kept per rule
const MAX_EXAMPLES: usize = 20;

/// Kind of statement a rule makes about the game
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleType {
    Objective,
    Constraint,
    Mechanics,
    Scoring,
    Progression,
    Interaction,
    StateChange,
    Temporal,
    Spatial,
    Pattern,
    Contextual,
    Strategy,
    Goal,
    Resource,
    Causal,
    Feedback,
    Custom,
}

impl RuleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleType::Objective => "objective",
            RuleType::Constraint => "constraint",
            RuleType::Mechanics => "mechanics",
            RuleType::Scoring => "scoring",
            RuleType::Progression => "progression",
            RuleType::Interaction => "interaction",
            RuleType::StateChange => "state_change",
            RuleType::Temporal => "temporal",
            RuleType::Spatial => "spatial",
            RuleType::Pattern => "pattern",
            RuleType::Contextual => "contextual",
            RuleType::Strategy => "strategy",
            RuleType::Goal => "goal",
            RuleType::Resource => "resource",
            RuleType::Causal => "causal",
            RuleType::Feedback => "feedback",
            RuleType::Custom => "custom",
        }
    }
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// A generalized statement about the game with a confidence score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub rule_type: RuleType,
    pub description: String,
    /// 0.0 - 0.99, grows with each observation
    pub confidence: f64,
    pub observation_count: u32,
    /// Ids of patterns this rule was inferred from
    #[serde(default)]
    pub example_patterns: Vec<String>,
    #[serde(default)]
    pub parameters: ValueMap,
    /// Optional script gating recommendations, e.g. `state.health < 0.5`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

impl Rule {
    /// Create a rule observed once
    pub fn new(rule_type: RuleType, description: impl Into<String>, confidence: f64) -> Self {
        let description = description.into();
        Self {
            id: rule_id(rule_type, &description),
            rule_type,
            description,
            confidence: confidence.clamp(0.0, MAX_CONSISTENCY),
            observation_count: 1,
            example_patterns: Vec::new(),
            parameters: ValueMap::new(),
            condition: None,
        }
    }

    pub fn with_parameters(mut self, parameters: ValueMap) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    /// Record another observation: `confidence += 0.05 / observation_count`, capped at 0.99
    pub fn reinforce(&mut self) {
        self.observation_count = self.observation_count.saturating_add(1);
        self.confidence =
            (self.confidence + 0.05 / self.observation_count as f64).min(MAX_CONSISTENCY);
    }

    fn add_example(&mut self, pattern_id: &str) {
        if self.example_patterns.iter().any(|p| p == pattern_id) {
            return;
        }
        if self.example_patterns.len() >= MAX_EXAMPLES {
            self.example_patterns.remove(0);
        }
        self.example_patterns.push(pattern_id.to_string());
    }
}

/// Identifier of the rule with this type and description
pub fn rule_id(rule_type: RuleType, description: &str) -> String {
    content_id(&[rule_type.as_str(), description])
}

/// Result of inserting or reinforcing a rule
#[derive(Debug, Clone, PartialEq)]
pub struct RuleUpdate {
    pub rule_id: String,
    pub rule_type: RuleType,
    pub created: bool,
    pub confidence: f64,
    pub observation_count: u32,
}

/// Classify a pattern by the change of score, level and element count
/// between its first and last step
pub fn classify_pattern(steps: &[PatternStep]) -> (RuleType, String, ValueMap) {
    let n = steps.len();
    let (Some(first), Some(last)) = (steps.first(), steps.last()) else {
        return (
            RuleType::Mechanics,
            "An empty sequence produces no outcome".to_string(),
            ValueMap::new(),
        );
    };

    let delta = |key: &str| {
        last.parameters.number_or_zero(key) - first.parameters.number_or_zero(key)
    };
    let level_delta = delta(keys::LEVEL);
    let score_delta = delta(keys::SCORE);
    let element_delta = delta(keys::ELEMENT_COUNT);

    let actions: Vec<&str> = steps.iter().map(|s| s.action_type.as_str()).collect();
    let mut params = ValueMap::new()
        .with("pattern_steps", n as f64)
        .with("actions", actions.join(","));

    let (rule_type, description) = if level_delta != 0.0 {
        params.insert("delta", level_delta);
        (
            RuleType::Progression,
            format!("Level changes by {:+.0} after a sequence of {} steps", level_delta, n),
        )
    } else if score_delta > 0.0 {
        params.insert("delta", score_delta);
        (
            RuleType::Scoring,
            format!(
                "Scoring occurs when completing a sequence of {} steps, resulting in {:.0} points",
                n, score_delta
            ),
        )
    } else if element_delta != 0.0 {
        params.insert("delta", element_delta);
        (
            RuleType::StateChange,
            format!("Element count changes by {:+.0} after a sequence of {} steps", element_delta, n),
        )
    } else if n > 5 {
        let total_ms: u64 = steps.iter().map(|s| s.duration_ms).sum();
        params.insert("duration_ms", total_ms as f64);
        (
            RuleType::Temporal,
            format!(
                "A sequence of {} steps recurs over about {:.1}s",
                n,
                total_ms as f64 / 1000.0
            ),
        )
    } else {
        (
            RuleType::Mechanics,
            format!("Performing {} produces a repeatable outcome", actions.join(" -> ")),
        )
    };

    (rule_type, description, params)
}

/// Accumulates rules inferred from patterns, enemy strategies and causal links
pub struct RuleEngine {
    settings: InferenceSettings,
    rules: HashMap<String, Rule>,
    /// Evidence count of each source (pattern or causal link) at its last inference
    inferred_from: HashMap<String, u32>,
}

impl RuleEngine {
    pub fn new(settings: InferenceSettings) -> Self {
        Self {
            settings,
            rules: HashMap::new(),
            inferred_from: HashMap::new(),
        }
    }

    /// Insert a new rule or reinforce the one with the same type and description
    pub fn upsert(
        &mut self,
        rule_type: RuleType,
        description: &str,
        initial_confidence: f64,
        example: Option<&str>,
        parameters: ValueMap,
    ) -> RuleUpdate {
        let id = rule_id(rule_type, description);

        let created = !self.rules.contains_key(&id);
        let rule = match self.rules.entry(id.clone()) {
            Entry::Occupied(entry) => {
                let rule = entry.into_mut();
                rule.reinforce();
                for (key, value) in parameters.iter() {
                    if !rule.parameters.contains_key(key) {
                        rule.parameters.insert(key.clone(), value.clone());
                    }
                }
                debug!(
                    "Rule {} reinforced ({} observations, confidence {:.3})",
                    id, rule.observation_count, rule.confidence
                );
                rule
            }
            Entry::Vacant(entry) => {
                let rule = Rule::new(rule_type, description, initial_confidence)
                    .with_parameters(parameters);
                info!(
                    "New {} rule: {} (confidence {:.3})",
                    rule_type, rule.description, rule.confidence
                );
                entry.insert(rule)
            }
        };

        if let Some(example) = example {
            rule.add_example(example);
        }

        RuleUpdate {
            rule_id: id,
            rule_type,
            created,
            confidence: rule.confidence,
            observation_count: rule.observation_count,
        }
    }

    /// Insert or reinforce an externally authored rule
    pub fn add_rule(&mut self, rule: Rule) -> RuleUpdate {
        let update = self.upsert(
            rule.rule_type,
            &rule.description,
            rule.confidence,
            None,
            rule.parameters.clone(),
        );
        if let (Some(condition), Some(stored)) = (rule.condition, self.rules.get_mut(&update.rule_id)) {
            stored.condition = Some(condition);
        }
        update
    }

    /// Whether `source` has new evidence since it was last inferred from
    fn has_new_evidence(&mut self, source: &str, count: u32) -> bool {
        match self.inferred_from.get(source) {
            Some(&seen) if seen >= count => false,
            _ => {
                self.inferred_from.insert(source.to_string(), count);
                true
            }
        }
    }

    /// Promote consistent, frequently matched patterns to rules
    pub fn infer_from_patterns(&mut self, patterns: &[Pattern]) -> Vec<RuleUpdate> {
        let mut updates = Vec::new();
        for pattern in patterns {
            if pattern.consistency <= self.settings.min_consistency
                || pattern.match_count < self.settings.min_matches
                || !self.has_new_evidence(&pattern.id, pattern.match_count)
            {
                continue;
            }

            let (rule_type, description, params) = classify_pattern(&pattern.steps);
            updates.push(self.upsert(
                rule_type,
                &description,
                0.8 * pattern.consistency,
                Some(&pattern.id),
                params,
            ));
        }
        updates
    }

    /// Turn often-detected enemy patterns into strategy rules
    pub fn infer_from_enemy_patterns(&mut self, patterns: &[EnemyPattern]) -> Vec<RuleUpdate> {
        let mut updates = Vec::new();
        for enemy in patterns {
            let count = enemy.detection_count();
            if count < self.settings.strategy_rule_min_detections
                || !self.has_new_evidence(&enemy.pattern.id, count)
            {
                continue;
            }

            let mut params = ValueMap::new()
                .with("action_type", MOVE_ACTION)
                .with(keys::TARGET, enemy.entity_type.as_str());
            if let Some(direction) = enemy.counter_direction() {
                params.insert(keys::DIRECTION, direction);
            }

            updates.push(self.upsert(
                RuleType::Strategy,
                &enemy.counter_strategy,
                0.8 * enemy.pattern.consistency,
                Some(&enemy.pattern.id),
                params,
            ));
        }
        updates
    }

    /// Turn well-established causal relationships into causal rules
    pub fn infer_from_causal(&mut self, relationships: &[CausalRelationship]) -> Vec<RuleUpdate> {
        let mut updates = Vec::new();
        for rel in relationships {
            if rel.observation_count < self.settings.causal_rule_min_observations
                || !self.has_new_evidence(&rel.id, rel.observation_count)
            {
                continue;
            }

            let description = format!("Performing {} changes {}", rel.cause_event, rel.effect_key);
            let params = ValueMap::new()
                .with("cause_event", rel.cause_event.as_str())
                .with("effect_key", rel.effect_key.as_str());
            updates.push(self.upsert(RuleType::Causal, &description, rel.strength, None, params));
        }
        updates
    }

    /// All rules, ordered by id
    pub fn rules(&self) -> Vec<Rule> {
        let mut rules: Vec<Rule> = self.rules.values().cloned().collect();
        rules.sort_by(|a, b| a.id.cmp(&b.id));
        rules
    }

    pub fn rules_by_type(&self, rule_type: RuleType) -> Vec<Rule> {
        self.rules()
            .into_iter()
            .filter(|r| r.rule_type == rule_type)
            .collect()
    }

    pub fn rules_above_confidence(&self, threshold: f64) -> Vec<Rule> {
        self.rules()
            .into_iter()
            .filter(|r| r.confidence >= threshold)
            .collect()
    }

    pub fn rule(&self, id: &str) -> Option<&Rule> {
        self.rules.get(id)
    }

    /// Restore previously exported rules, keeping existing ones
    pub fn import(&mut self, rules: Vec<Rule>) {
        for rule in rules {
            self.rules.entry(rule.id.clone()).or_insert(rule);
        }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn clear(&mut self) {
        self.rules.clear();
        self.inferred_from.clear();
    }
}
