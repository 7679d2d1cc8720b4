//! Action Prioritization
//!
//! Ranks candidate actions with a multiplicative score built from named
//! factors: action-type weight, situational flags, game-type weight,
//! recorded success and user feedback. Also turns confident strategy and
//! goal rules into recommended actions.

pub mod action;
pub mod history;
pub mod weights;

pub use action::{classify_action, ActionType, GameAction};
pub use history::{ActionSuccessRecord, UserFeedbackRecord};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::analysis::{ConditionEngine, Rule, RuleType};
use crate::config::PrioritySettings;
use crate::shared::{keys, GameState, Value, ValueMap};
use weights::{base_weight, GameTypeWeights};

/// Situational flags set by the orchestrator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriticalFlags {
    pub low_health: bool,
    pub low_resource: bool,
    pub under_attack: bool,
    pub boss_fight: bool,
}

/// A named multiplier applied to an action's base priority
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorityFactor {
    pub name: String,
    pub value: f64,
}

/// A ranked candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrioritizedAction {
    pub action_id: String,
    pub action: GameAction,
    pub action_type: ActionType,
    pub base_priority: f64,
    /// Applied factors, in application order
    pub factors: Vec<PriorityFactor>,
    pub final_priority: f64,
}

impl PrioritizedAction {
    /// Value of a named factor, if it was applied
    pub fn factor(&self, name: &str) -> Option<f64> {
        self.factors.iter().find(|f| f.name == name).map(|f| f.value)
    }
}

/// Pick returned by an external action-value model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelChoice {
    /// Identifier of the chosen action (candidate id or action type)
    pub action_id: String,
    pub confidence: f64,
}

impl ModelChoice {
    /// Candidate action for a pick that matches none of the offered candidates
    pub fn to_action(&self) -> GameAction {
        GameAction::new(self.action_id.clone()).with_confidence(self.confidence.clamp(0.0, 1.0))
    }
}

/// An externally trained action-value model, treated as a black box
pub trait ActionValueModel: Send {
    /// Choose an action for the numeric state vector
    fn select_action(&mut self, state: &[f64]) -> Option<ModelChoice>;

    /// Feed back one transition
    fn update(&mut self, state: &[f64], action_id: &str, reward: f64, next_state: &[f64], done: bool);
}

/// Numeric state fields, ordered by key
pub fn state_vector(state: &GameState) -> Vec<f64> {
    state.numbers().map(|(_, n)| n).collect()
}

/// Ranks candidate actions
pub struct ActionPrioritizer {
    settings: PrioritySettings,
    game_type: Option<String>,
    game_weights: GameTypeWeights,
    flags: CriticalFlags,
    success: HashMap<String, ActionSuccessRecord>,
    feedback: HashMap<String, UserFeedbackRecord>,
    conditions: ConditionEngine,
}

impl ActionPrioritizer {
    pub fn new(settings: PrioritySettings) -> Self {
        Self {
            game_type: settings.game_type.clone(),
            game_weights: GameTypeWeights::new(settings.game_type_weights.clone()),
            settings,
            flags: CriticalFlags::default(),
            success: HashMap::new(),
            feedback: HashMap::new(),
            conditions: ConditionEngine::new(),
        }
    }

    /// Rank candidates for the current game state, highest priority first
    pub fn prioritize(&self, candidates: &[GameAction], state: &GameState) -> Vec<PrioritizedAction> {
        let mut ranked: Vec<PrioritizedAction> = candidates
            .iter()
            .map(|action| {
                let action_type = classify_action(action);
                let mut factors = vec![PriorityFactor {
                    name: "action_type".to_string(),
                    value: base_weight(action_type),
                }];
                self.contextual_factors(action_type, state, &mut factors);
                self.game_type_factor(action_type, &mut factors);
                self.history_factors(action, &mut factors);
                self.build(action.clone(), action_type, action.base_priority, factors)
            })
            .collect();

        sort_descending(&mut ranked);
        ranked
    }

    /// Rank candidates, boosting the one an action-value model picks
    ///
    /// A pick matching no candidate is added as a new candidate.
    pub fn prioritize_with_model(
        &self,
        model: &mut dyn ActionValueModel,
        candidates: &[GameAction],
        state: &GameState,
    ) -> Vec<PrioritizedAction> {
        let Some(choice) = model.select_action(&state_vector(state)) else {
            return self.prioritize(candidates, state);
        };

        let mut candidates = candidates.to_vec();
        let chosen = candidates
            .iter()
            .position(|a| a.id == choice.action_id || a.action_type == choice.action_id);
        if chosen.is_none() {
            candidates.push(choice.to_action());
        }
        let chosen_id = match chosen {
            Some(index) => candidates[index].id.clone(),
            None => candidates.last().map(|a| a.id.clone()).unwrap_or_default(),
        };

        let boost = 1.0 + choice.confidence.clamp(0.0, 1.0);
        let mut ranked = self.prioritize(&candidates, state);
        for entry in ranked.iter_mut().filter(|p| p.action_id == chosen_id) {
            entry.factors.push(PriorityFactor {
                name: "model_choice".to_string(),
                value: boost,
            });
            entry.final_priority = self.clamp_final(entry.final_priority * boost);
        }
        sort_descending(&mut ranked);
        ranked
    }

    /// Turn confident strategy and goal rules into recommended actions
    pub fn recommend_from_rules(&self, state: &GameState, rules: &[Rule]) -> Vec<PrioritizedAction> {
        let mut ranked: Vec<PrioritizedAction> = rules
            .iter()
            .filter(|r| r.confidence >= self.settings.recommendation_min_confidence)
            .filter(|r| matches!(r.rule_type, RuleType::Strategy | RuleType::Goal))
            .filter(|r| match &r.condition {
                Some(script) => self.conditions.evaluate(script, state),
                None => true,
            })
            .map(|rule| {
                let action = action_from_rule(rule);
                let action_type = classify_action(&action);
                let mut factors = vec![PriorityFactor {
                    name: "observation_boost".to_string(),
                    value: (1.0 + 0.05 * rule.observation_count as f64).min(1.5),
                }];
                self.contextual_factors(action_type, state, &mut factors);
                let base = action.base_priority;
                self.build(action, action_type, base, factors)
            })
            .collect();

        sort_descending(&mut ranked);
        debug!("{} recommendations from {} rules", ranked.len(), rules.len());
        ranked
    }

    fn contextual_factors(&self, action_type: ActionType, state: &GameState, factors: &mut Vec<PriorityFactor>) {
        let mut push = |name: &str, value: f64| {
            factors.push(PriorityFactor {
                name: name.to_string(),
                value,
            })
        };

        if self.flags.low_health && action_type == ActionType::Heal {
            push("low_health", 2.0);
        }
        if self.flags.low_resource && action_type == ActionType::Collect {
            push("low_resource", 1.5);
        }
        if self.flags.under_attack {
            match action_type {
                ActionType::Defend => push("under_attack", 1.5),
                ActionType::Attack => push("under_attack", 1.3),
                _ => {}
            }
        }
        if self.flags.boss_fight {
            match action_type {
                ActionType::Attack => push("boss_fight", 1.4),
                ActionType::UseItem => push("boss_fight", 1.3),
                _ => {}
            }
        }

        let emergency = state
            .number(keys::HEALTH)
            .is_some_and(|h| h < self.settings.emergency_health);
        if emergency && action_type == ActionType::Heal {
            push("emergency_health", 3.0);
        }
    }

    fn game_type_factor(&self, action_type: ActionType, factors: &mut Vec<PriorityFactor>) {
        let Some(game_type) = &self.game_type else {
            return;
        };
        if let Some(weight) = self.game_weights.weight(game_type, action_type) {
            factors.push(PriorityFactor {
                name: "game_type".to_string(),
                value: weight,
            });
        }
    }

    fn history_factors(&self, action: &GameAction, factors: &mut Vec<PriorityFactor>) {
        let key = action.history_key();
        let type_key = classify_action(action).to_string();

        let success = self.success.get(&key).or_else(|| self.success.get(&type_key));
        if let Some(record) = success.filter(|r| r.attempts > 0) {
            factors.push(PriorityFactor {
                name: "success_rate".to_string(),
                value: 0.7 + 0.6 * record.success_rate(),
            });
            factors.push(PriorityFactor {
                name: "reward".to_string(),
                value: 0.8 + 0.4 * record.avg_reward.clamp(0.0, 1.0),
            });
        }

        let feedback = self.feedback.get(&key).or_else(|| self.feedback.get(&type_key));
        if let Some(record) = feedback {
            factors.push(PriorityFactor {
                name: "user_feedback".to_string(),
                value: 0.5 + record.satisfaction,
            });
        }
    }

    fn build(
        &self,
        action: GameAction,
        action_type: ActionType,
        base_priority: f64,
        factors: Vec<PriorityFactor>,
    ) -> PrioritizedAction {
        let product: f64 = factors.iter().map(|f| f.value).product();
        PrioritizedAction {
            action_id: action.id.clone(),
            action,
            action_type,
            base_priority,
            factors,
            final_priority: self.clamp_final(base_priority * product),
        }
    }

    fn clamp_final(&self, value: f64) -> f64 {
        if value.is_nan() {
            return 0.0;
        }
        value.clamp(0.0, self.settings.max_final_priority.max(0.0))
    }

    /// Record the outcome of an executed action
    pub fn record_action_result(&mut self, action: &GameAction, success: bool, reward: f64, exec_time_ms: f64) {
        let key = action.history_key();
        let record = self.success.entry(key.clone()).or_default();
        record.record(success, reward, exec_time_ms);
        debug!(
            "Action {} result: {}/{} successes, avg reward {:.3}",
            key, record.successes, record.attempts, record.avg_reward
        );
    }

    /// Record user feedback on an action
    pub fn record_user_feedback(&mut self, action: &GameAction, positive: bool, delta: f64) {
        let key = action.history_key();
        let record = self.feedback.entry(key.clone()).or_default();
        record.record(positive, delta);
        debug!("Action {} feedback: satisfaction {:.3}", key, record.satisfaction);
    }

    pub fn success_record(&self, key: &str) -> Option<&ActionSuccessRecord> {
        self.success.get(key)
    }

    pub fn feedback_record(&self, key: &str) -> Option<&UserFeedbackRecord> {
        self.feedback.get(key)
    }

    pub fn set_game_type(&mut self, game_type: Option<String>) {
        self.game_type = game_type.filter(|g| !g.is_empty());
    }

    pub fn game_type(&self) -> Option<&str> {
        self.game_type.as_deref()
    }

    pub fn set_critical_flags(&mut self, flags: CriticalFlags) {
        self.flags = flags;
    }

    pub fn critical_flags(&self) -> CriticalFlags {
        self.flags
    }

    /// Condition engine used to gate rule recommendations
    pub fn conditions(&self) -> &ConditionEngine {
        &self.conditions
    }

    /// Forget history, feedback and flags; the configured game type is restored
    pub fn reset(&mut self) {
        self.success.clear();
        self.feedback.clear();
        self.flags = CriticalFlags::default();
        self.game_type = self.settings.game_type.clone();
    }
}

fn sort_descending(ranked: &mut [PrioritizedAction]) {
    ranked.sort_by(|a, b| b.final_priority.total_cmp(&a.final_priority));
}

/// Candidate action described by a strategy or goal rule
fn action_from_rule(rule: &Rule) -> GameAction {
    let default_type = match rule.rule_type {
        RuleType::Goal => "interact",
        _ => "move",
    };
    let action_type = rule
        .parameters
        .text("action_type")
        .filter(|t| !t.is_empty())
        .unwrap_or(default_type)
        .to_string();

    let parameters: ValueMap = rule
        .parameters
        .iter()
        .filter(|(k, _)| !matches!(k.as_str(), "action_type" | "target"))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    let mut action = GameAction::new(action_type)
        .with_id(rule.id.clone())
        .with_parameters(parameters)
        .with_base_priority(0.7 + 0.3 * rule.confidence)
        .with_confidence(rule.confidence);
    if let Some(Value::Text(target)) = rule.parameters.get("target") {
        action = action.with_target(target.clone());
    }
    action
}
