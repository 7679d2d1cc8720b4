//! Action -> state-change tracking
//!
//! Every (before, action, after) triple of consecutive observations links
//! the action performed in the middle observation to the state keys that
//! changed between `before` and `after`.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

use crate::analysis::content_id;
use crate::analysis::observation::Observation;
use crate::analysis::patterns::{MAX_CONSISTENCY, OBSERVE_ACTION};
use crate::shared::state::action_name;
use crate::shared::{keys, GameState};

/// Strength of a relationship seen once
const INITIAL_STRENGTH: f64 = 0.3;

/// A tracked association between an action event and a changed state key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CausalRelationship {
    pub id: String,
    pub cause_event: String,
    pub effect_key: String,
    /// 0.0 - 0.99, grows with repeated co-occurrence
    pub strength: f64,
    pub observation_count: u32,
}

impl CausalRelationship {
    /// A relationship observed once
    pub fn new(cause_event: impl Into<String>, effect_key: impl Into<String>) -> Self {
        let cause_event = cause_event.into();
        let effect_key = effect_key.into();
        Self {
            id: content_id(&[&cause_event, &effect_key]),
            cause_event,
            effect_key,
            strength: INITIAL_STRENGTH,
            observation_count: 1,
        }
    }

    /// Same asymptotic climb as rule confidence
    pub fn reinforce(&mut self) {
        self.observation_count = self.observation_count.saturating_add(1);
        self.strength = (self.strength + 0.05 / self.observation_count as f64).min(MAX_CONSISTENCY);
    }
}

/// Deterministic event id for the action recorded in an observation
pub fn event_id(observation: &Observation) -> String {
    let action = action_name(&observation.game_state).unwrap_or(OBSERVE_ACTION);
    match observation.game_state.text(keys::TARGET) {
        Some(target) if !target.is_empty() => format!("{}:{}", action, target),
        _ => action.to_string(),
    }
}

/// State keys whose values changed between two states
///
/// Numbers count as changed when they move by more than `threshold`
/// relative to the earlier value (any change from zero counts). Other
/// values count when they differ, appear or disappear. The action keys
/// themselves are never reported.
pub fn changed_keys(before: &GameState, after: &GameState, threshold: f64) -> Vec<String> {
    let all_keys: BTreeSet<&String> = before.keys().chain(after.keys()).collect();

    all_keys
        .into_iter()
        .filter(|k| !matches!(k.as_str(), keys::ACTION | keys::LAST_ACTION | keys::TARGET))
        .filter(|k| {
            match (before.number(k), after.number(k)) {
                (Some(b), Some(a)) if b == 0.0 => a != 0.0,
                (Some(b), Some(a)) => ((a - b) / b).abs() > threshold,
                _ => before.get(k) != after.get(k),
            }
        })
        .cloned()
        .collect()
}

/// Accumulates causal relationships from the observation history
pub struct CausalTracker {
    change_threshold: f64,
    relationships: HashMap<String, CausalRelationship>,
    /// Sequence number of the newest `after` observation already analyzed
    watermark: Option<u64>,
}

/// Relationships touched by one analysis pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CausalReport {
    pub updated: Vec<String>,
}

impl CausalTracker {
    pub fn new(change_threshold: f64) -> Self {
        Self {
            change_threshold,
            relationships: HashMap::new(),
            watermark: None,
        }
    }

    /// Analyze the triples whose last observation was not analyzed before
    pub fn analyze(&mut self, observations: &[Observation]) -> CausalReport {
        let mut report = CausalReport::default();

        for triple in observations.windows(3) {
            let (before, action, after) = (&triple[0], &triple[1], &triple[2]);
            if self.watermark.is_some_and(|w| after.seq <= w) {
                continue;
            }

            let event = event_id(action);
            for key in changed_keys(&before.game_state, &after.game_state, self.change_threshold) {
                let relationship = CausalRelationship::new(event.clone(), key);
                let id = relationship.id.clone();
                self.relationships
                    .entry(id.clone())
                    .and_modify(|r| r.reinforce())
                    .or_insert(relationship);
                report.updated.push(id);
            }
        }

        if let Some(last) = observations.last() {
            self.watermark = Some(self.watermark.map_or(last.seq, |w| w.max(last.seq)));
        }

        if !report.updated.is_empty() {
            debug!(
                "Causal analysis: {} links updated, {} tracked",
                report.updated.len(),
                self.relationships.len()
            );
        }

        report
    }

    /// All relationships, ordered by id
    pub fn relationships(&self) -> Vec<CausalRelationship> {
        let mut all: Vec<_> = self.relationships.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    pub fn relationship(&self, id: &str) -> Option<&CausalRelationship> {
        self.relationships.get(id)
    }

    /// Relationships caused by one event, strongest first
    pub fn for_event(&self, cause_event: &str) -> Vec<CausalRelationship> {
        let mut found: Vec<_> = self
            .relationships
            .values()
            .filter(|r| r.cause_event == cause_event)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.strength.total_cmp(&a.strength));
        found
    }

    /// Restore previously exported relationships, keeping existing ones
    pub fn import(&mut self, relationships: Vec<CausalRelationship>) {
        for rel in relationships {
            self.relationships.entry(rel.id.clone()).or_insert(rel);
        }
    }

    pub fn len(&self) -> usize {
        self.relationships.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relationships.is_empty()
    }

    pub fn clear(&mut self) {
        self.relationships.clear();
        self.watermark = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::observation::ObservationStore;
    use crate::capture::CapturedFrame;

    fn obs(ts: u64, state: GameState) -> Observation {
        let mut observation = Observation::from_frame(CapturedFrame::at(ts, vec![], state), vec![]);
        observation.seq = ts + 1;
        observation
    }

    #[test]
    fn test_changed_keys() {
        let before = GameState::new()
            .with("score", 100.0)
            .with("coins", 0.0)
            .with("hp", 50.0)
            .with("phase", "calm")
            .with("action", "tap");
        let after = GameState::new()
            .with("score", 105.0)
            .with("coins", 1.0)
            .with("hp", 30.0)
            .with("phase", "boss")
            .with("door", "open")
            .with("action", "jump");

        assert_eq!(changed_keys(&before, &after, 0.1), vec!["coins", "door", "hp", "phase"]);
    }

    #[test]
    fn test_event_id() {
        let plain = obs(0, GameState::new().with("action", "jump"));
        assert_eq!(event_id(&plain), "jump");

        let targeted = obs(0, GameState::new().with("action", "tap").with("target", "chest"));
        assert_eq!(event_id(&targeted), "tap:chest");

        let idle = obs(0, GameState::new());
        assert_eq!(event_id(&idle), "observe");
    }

    #[test]
    fn test_relationship_strength_climbs() {
        let mut tracker = CausalTracker::new(0.1);
        let mut history = Vec::new();
        for i in 0..6u64 {
            history.push(obs(i * 3, GameState::new().with("coins", (i * 10) as f64)));
            history.push(obs(i * 3 + 1, GameState::new().with("action", "tap").with("target", "coin").with("coins", (i * 10) as f64)));
            history.push(obs(i * 3 + 2, GameState::new().with("coins", (i * 10 + 10) as f64)));
        }

        tracker.analyze(&history);
        let links = tracker.for_event("tap:coin");
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].effect_key, "coins");
        assert_eq!(links[0].observation_count, 6);
        assert!(links[0].strength > INITIAL_STRENGTH);
        assert!(links[0].strength <= MAX_CONSISTENCY);
    }

    #[test]
    fn test_analysis_is_incremental() {
        let mut tracker = CausalTracker::new(0.1);
        let history = vec![
            obs(0, GameState::new().with("score", 0.0)),
            obs(1, GameState::new().with("action", "tap")),
            obs(2, GameState::new().with("score", 10.0)),
        ];
        assert_eq!(tracker.analyze(&history).updated.len(), 1);
        assert!(tracker.analyze(&history).updated.is_empty());

        let rel = tracker.relationships().remove(0);
        assert_eq!(rel.observation_count, 1);
        assert!((rel.strength - INITIAL_STRENGTH).abs() < 1e-9);
    }

    #[test]
    fn test_triples_sharing_a_timestamp_are_analyzed() {
        let store = ObservationStore::new(10);
        let mut tracker = CausalTracker::new(0.1);
        store.record(obs(0, GameState::new().with("coins", 0.0)));
        store.record(obs(0, GameState::new().with("action", "tap").with("coins", 0.0)));
        store.record(obs(0, GameState::new().with("coins", 10.0)));
        assert_eq!(tracker.analyze(&store.snapshot()).updated.len(), 1);

        store.record(obs(0, GameState::new().with("action", "tap").with("coins", 10.0)));
        store.record(obs(0, GameState::new().with("coins", 20.0)));
        let report = tracker.analyze(&store.snapshot());
        assert!(!report.updated.is_empty());
        assert_eq!(tracker.for_event("tap")[0].observation_count, 2);
    }

    #[test]
    fn test_short_history_is_ignored() {
        let mut tracker = CausalTracker::new(0.1);
        let history = vec![obs(0, GameState::new()), obs(1, GameState::new())];
        assert!(tracker.analyze(&history).updated.is_empty());
        assert!(tracker.is_empty());
    }
}
