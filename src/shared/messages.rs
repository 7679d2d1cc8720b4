//! Recognition events published by the analysis pipeline

use crate::analysis::rules::RuleType;

/// Events emitted while mining patterns and inferring rules
#[derive(Debug, Clone, PartialEq)]
pub enum RecognitionEvent {
    /// A new behavior pattern was created from a significant subsequence
    PatternDiscovered {
        pattern_id: String,
        steps: usize,
    },
    /// An existing pattern matched again
    PatternMatched {
        pattern_id: String,
        match_count: u32,
        consistency: f64,
    },
    /// An enemy movement pattern was created or detected again
    EnemyPatternRecognized {
        pattern_id: String,
        entity_type: String,
        detection_count: u32,
        counter_strategy: String,
    },
    /// A rule was created
    RuleInferred {
        rule_id: String,
        rule_type: RuleType,
        description: String,
        confidence: f64,
    },
    /// An existing rule was observed again
    RuleReinforced {
        rule_id: String,
        observation_count: u32,
        confidence: f64,
    },
    /// An action -> state-change association was observed
    CausalLinkObserved {
        cause_event: String,
        effect_key: String,
        strength: f64,
    },
}

impl RecognitionEvent {
    /// Short name used in log output
    pub fn name(&self) -> &'static str {
        match self {
            RecognitionEvent::PatternDiscovered { .. } => "pattern_discovered",
            RecognitionEvent::PatternMatched { .. } => "pattern_matched",
            RecognitionEvent::EnemyPatternRecognized { .. } => "enemy_pattern_recognized",
            RecognitionEvent::RuleInferred { .. } => "rule_inferred",
            RecognitionEvent::RuleReinforced { .. } => "rule_reinforced",
            RecognitionEvent::CausalLinkObserved { .. } => "causal_link_observed",
        }
    }
}
