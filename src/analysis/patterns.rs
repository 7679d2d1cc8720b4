//! Sliding-window pattern mining
//!
//! Observations are turned into steps and every contiguous window of
//! `min_window..=max_window` steps is compared against the known patterns
//! with a tolerant step comparator. Re-matched patterns gain consistency;
//! unmatched windows become new patterns only when something in them
//! changed noticeably.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::analysis::content_id;
use crate::analysis::observation::Observation;
use crate::config::MiningSettings;
use crate::shared::state::action_name;
use crate::shared::{keys, Value, ValueMap};

/// Upper bound for pattern consistency and rule confidence
pub const MAX_CONSISTENCY: f64 = 0.99;

/// Action type used for observations that carry no action
pub const OBSERVE_ACTION: &str = "observe";

/// One step of a pattern
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternStep {
    /// Action or movement type
    pub action_type: String,
    /// Step parameters (direction, speed, state values, ...)
    pub parameters: ValueMap,
    /// How long the step lasted
    pub duration_ms: u64,
    /// State required before the step
    pub preconditions: ValueMap,
}

impl PatternStep {
    pub fn new(action_type: impl Into<String>) -> Self {
        Self {
            action_type: action_type.into(),
            parameters: ValueMap::new(),
            duration_ms: 0,
            preconditions: ValueMap::new(),
        }
    }

    pub fn with_parameter(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.parameters.insert(key, value);
        self
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    /// Movement direction, if the step has one
    pub fn direction(&self) -> Option<&str> {
        self.parameters.text(keys::DIRECTION)
    }

    /// Build the step describing `current`, with `previous` as its precondition
    ///
    /// Parameters carry every scalar game-state field of `current`; the
    /// preconditions carry the numeric fields of `previous`.
    pub fn from_observation(current: &Observation, previous: Option<&Observation>) -> Self {
        let action_type = action_name(&current.game_state)
            .unwrap_or(OBSERVE_ACTION)
            .to_string();

        let parameters: ValueMap = current
            .game_state
            .iter()
            .filter(|(_, v)| matches!(v, Value::Number(_) | Value::Bool(_) | Value::Text(_)))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let (duration_ms, preconditions) = match previous {
            Some(prev) => (
                current.timestamp_ms.saturating_sub(prev.timestamp_ms),
                prev.game_state
                    .numbers()
                    .map(|(k, n)| (k.to_string(), Value::Number(n)))
                    .collect(),
            ),
            None => (0, ValueMap::new()),
        };

        Self {
            action_type,
            parameters,
            duration_ms,
            preconditions,
        }
    }
}

/// Tolerances used when comparing steps
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchTolerance {
    /// Relative tolerance for numeric parameters
    pub numeric: f64,
    /// Allowed duration difference as a fraction of the longer duration
    pub duration: f64,
}

impl Default for MatchTolerance {
    fn default() -> Self {
        Self {
            numeric: 0.1,
            duration: 0.3,
        }
    }
}

impl From<&MiningSettings> for MatchTolerance {
    fn from(settings: &MiningSettings) -> Self {
        Self {
            numeric: settings.numeric_tolerance,
            duration: settings.duration_tolerance,
        }
    }
}

/// Whether two numbers are within `tolerance` of each other, relative to the larger
pub fn within_tolerance(a: f64, b: f64, tolerance: f64) -> bool {
    let scale = a.abs().max(b.abs());
    if scale == 0.0 {
        return true;
    }
    (a - b).abs() <= tolerance * scale
}

/// Tolerant comparison of two steps
///
/// Action types must be equal, directions (if either step has one) must be
/// equal, numeric parameters present in both must be within the numeric
/// tolerance and durations within the duration tolerance.
pub fn steps_match(a: &PatternStep, b: &PatternStep, tolerance: MatchTolerance) -> bool {
    if a.action_type != b.action_type {
        return false;
    }

    if (a.direction().is_some() || b.direction().is_some()) && a.direction() != b.direction() {
        return false;
    }

    let numbers_match = a.parameters.numbers().all(|(key, va)| match b.parameters.number(key) {
        Some(vb) => within_tolerance(va, vb, tolerance.numeric),
        None => true,
    });
    if !numbers_match {
        return false;
    }

    let longer = a.duration_ms.max(b.duration_ms) as f64;
    let diff = (a.duration_ms as f64 - b.duration_ms as f64).abs();
    diff <= tolerance.duration * longer
}

/// Equal-length sequences whose steps match pairwise
pub fn sequences_match(a: &[PatternStep], b: &[PatternStep], tolerance: MatchTolerance) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| steps_match(x, y, tolerance))
}

/// Whether any numeric state field changes by more than `threshold`
/// relative to its value in the first observation of the window
pub fn is_significant(window: &[Observation], threshold: f64) -> bool {
    let Some((first, rest)) = window.split_first() else {
        return false;
    };

    first.game_state.numbers().any(|(key, base)| {
        rest.iter().any(|obs| match obs.game_state.number(key) {
            Some(value) if base == 0.0 => value != 0.0,
            Some(value) => ((value - base) / base).abs() > threshold,
            None => false,
        })
    })
}

/// What a pattern was mined from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PatternKind {
    /// Game-state subsequence from the observation history
    Behavior,
    /// Movement of a tracked enemy
    Enemy { entity_type: String },
    /// Action sequence whose last step reported success
    Strategy,
    /// Sequence spanning a level change
    Level,
}

impl PatternKind {
    /// Kind of a mined window: level changes win over reported success
    pub fn for_window(window: &[Observation], steps: &[PatternStep]) -> Self {
        let level = |o: &Observation| o.game_state.number_or_zero(keys::LEVEL);
        if let (Some(first), Some(last)) = (window.first(), window.last()) {
            if level(first) != level(last) {
                return PatternKind::Level;
            }
        }
        if steps.last().and_then(|s| s.parameters.bool("success")) == Some(true) {
            return PatternKind::Strategy;
        }
        PatternKind::Behavior
    }

    fn id_prefix(&self) -> String {
        match self {
            PatternKind::Behavior => "behavior".to_string(),
            PatternKind::Enemy { entity_type } => format!("enemy:{}", entity_type),
            PatternKind::Strategy => "strategy".to_string(),
            PatternKind::Level => "level".to_string(),
        }
    }
}

/// A recurring step sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub id: String,
    pub kind: PatternKind,
    pub steps: Vec<PatternStep>,
    /// Number of times the sequence has been seen, including the first
    pub match_count: u32,
    /// How reliably the pattern recurs (0.0 - 0.99)
    pub consistency: f64,
    /// Total duration of the steps
    pub duration_ms: Option<u64>,
    /// Fraction of occurrences ending in a reported success
    pub success_rate: Option<f64>,
    pub first_seen_ms: u64,
    pub last_seen_ms: u64,
}

impl Pattern {
    /// Create a pattern seen once
    pub fn new(kind: PatternKind, steps: Vec<PatternStep>, consistency: f64, seen_ms: u64) -> Self {
        let prefix = kind.id_prefix();
        let signature = serde_json::to_string(&steps).unwrap_or_default();
        let duration: u64 = steps.iter().map(|s| s.duration_ms).sum();

        let mut pattern = Self {
            id: content_id(&[&prefix, &signature]),
            kind,
            steps,
            match_count: 1,
            consistency: consistency.clamp(0.0, MAX_CONSISTENCY),
            duration_ms: (duration > 0).then_some(duration),
            success_rate: None,
            first_seen_ms: seen_ms,
            last_seen_ms: seen_ms,
        };
        pattern.update_success_rate();
        pattern
    }

    /// Record another occurrence: `consistency += 0.1 / match_count`, capped at 0.99
    pub fn record_match(&mut self, seen_ms: u64) {
        self.match_count = self.match_count.saturating_add(1);
        self.consistency =
            (self.consistency + 0.1 / self.match_count as f64).min(MAX_CONSISTENCY);
        self.last_seen_ms = self.last_seen_ms.max(seen_ms);
        self.update_success_rate();
    }

    /// Running mean of the `success` flag reported on the final step
    fn update_success_rate(&mut self) {
        let Some(success) = self.steps.last().and_then(|s| s.parameters.bool("success")) else {
            return;
        };
        let sample = if success { 1.0 } else { 0.0 };
        let rate = match self.success_rate {
            Some(rate) => rate + (sample - rate) / self.match_count as f64,
            None => sample,
        };
        self.success_rate = Some(rate.clamp(0.0, 1.0));
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Outcome of one mining pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MiningReport {
    /// Ids of patterns created in this pass
    pub discovered: Vec<String>,
    /// Ids of patterns re-matched in this pass, once per match
    pub matched: Vec<String>,
    /// Windows examined
    pub windows_scanned: usize,
}

/// Mines behavior patterns from the observation history
pub struct PatternMiner {
    settings: MiningSettings,
    patterns: Vec<Pattern>,
    /// Sequence number of the newest observation already mined
    watermark: Option<u64>,
}

impl PatternMiner {
    pub fn new(settings: MiningSettings) -> Self {
        Self {
            settings,
            patterns: Vec::new(),
            watermark: None,
        }
    }

    /// Scan the windows ending in observations not mined before
    pub fn mine(&mut self, observations: &[Observation]) -> MiningReport {
        let mut report = MiningReport::default();
        let min_window = self.settings.min_window.max(2);
        let max_window = self.settings.max_window.min(observations.len());
        if observations.len() < min_window {
            return report;
        }

        let steps: Vec<PatternStep> = observations
            .iter()
            .enumerate()
            .map(|(i, obs)| {
                let previous = i.checked_sub(1).map(|p| &observations[p]);
                PatternStep::from_observation(obs, previous)
            })
            .collect();

        let tolerance = MatchTolerance::from(&self.settings);
        let watermark = self.watermark;

        for len in min_window..=max_window {
            for start in 0..=(observations.len() - len) {
                let end = start + len;
                let newest = &observations[end - 1];
                if watermark.is_some_and(|w| newest.seq <= w) {
                    continue;
                }
                let newest = newest.timestamp_ms;
                report.windows_scanned += 1;

                let window_steps = &steps[start..end];
                if let Some(pattern) = self
                    .patterns
                    .iter_mut()
                    .find(|p| sequences_match(&p.steps, window_steps, tolerance))
                {
                    pattern.record_match(newest);
                    debug!(
                        "Pattern {} matched (count {}, consistency {:.3})",
                        pattern.id, pattern.match_count, pattern.consistency
                    );
                    report.matched.push(pattern.id.clone());
                    continue;
                }

                if self.patterns.len() >= self.settings.max_patterns {
                    continue;
                }

                if is_significant(&observations[start..end], self.settings.significance_threshold) {
                    let pattern = Pattern::new(
                        PatternKind::for_window(&observations[start..end], window_steps),
                        window_steps.to_vec(),
                        self.settings.initial_consistency,
                        newest,
                    );
                    debug!("New pattern {} with {} steps", pattern.id, pattern.len());
                    report.discovered.push(pattern.id.clone());
                    self.patterns.push(pattern);
                }
            }
        }

        if let Some(last) = observations.last() {
            self.watermark = Some(watermark.map_or(last.seq, |w| w.max(last.seq)));
        }

        if !report.discovered.is_empty() {
            info!(
                "Pattern mining: {} new, {} matched, {} total",
                report.discovered.len(),
                report.matched.len(),
                self.patterns.len()
            );
        }

        report
    }

    /// All patterns, in creation order
    pub fn patterns(&self) -> &[Pattern] {
        &self.patterns
    }

    pub fn pattern(&self, id: &str) -> Option<&Pattern> {
        self.patterns.iter().find(|p| p.id == id)
    }

    /// Restore previously exported patterns, skipping ids already known
    pub fn import(&mut self, patterns: Vec<Pattern>) {
        for pattern in patterns {
            if self.pattern(&pattern.id).is_none() {
                self.patterns.push(pattern);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn clear(&mut self) {
        self.patterns.clear();
        self.watermark = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::observation::ObservationStore;
    use crate::capture::CapturedFrame;
    use crate::shared::GameState;

    fn obs(ts: u64, action: &str, score: f64) -> Observation {
        let mut observation = Observation::from_frame(
            CapturedFrame::at(
                ts,
                vec![],
                GameState::new().with("action", action).with("score", score),
            ),
            vec![],
        );
        observation.seq = ts + 1;
        observation
    }

    fn recorded(store: &ObservationStore, ts: u64, action: &str, score: f64) {
        store.record(obs(ts, action, score));
    }

    fn step(action: &str, speed: f64, duration: u64) -> PatternStep {
        PatternStep::new(action)
            .with_parameter("speed", speed)
            .with_duration(duration)
    }

    #[test]
    fn test_matcher_is_reflexive() {
        let seq = vec![
            step("jump", 4.0, 300).with_parameter("direction", "left"),
            step("tap", 0.0, 0),
            step("swipe", -12.5, 1500).with_parameter("target", "coin"),
        ];
        assert!(sequences_match(&seq, &seq, MatchTolerance::default()));
    }

    #[test]
    fn test_numeric_tolerance() {
        let tol = MatchTolerance::default();
        assert!(steps_match(&step("move", 100.0, 0), &step("move", 109.0, 0), tol));
        assert!(!steps_match(&step("move", 100.0, 0), &step("move", 125.0, 0), tol));
        assert!(!steps_match(&step("move", 100.0, 0), &step("jump", 100.0, 0), tol));
    }

    #[test]
    fn test_duration_tolerance() {
        let tol = MatchTolerance::default();
        assert!(steps_match(&step("move", 1.0, 1000), &step("move", 1.0, 750), tol));
        assert!(!steps_match(&step("move", 1.0, 1000), &step("move", 1.0, 600), tol));
    }

    #[test]
    fn test_direction_must_agree() {
        let tol = MatchTolerance::default();
        let left = step("move", 1.0, 0).with_parameter("direction", "left");
        let right = step("move", 1.0, 0).with_parameter("direction", "right");
        let none = step("move", 1.0, 0);
        assert!(!steps_match(&left, &right, tol));
        assert!(!steps_match(&left, &none, tol));
    }

    #[test]
    fn test_sequences_of_different_length_do_not_match() {
        let a = vec![step("move", 1.0, 0)];
        let b = vec![step("move", 1.0, 0), step("move", 1.0, 0)];
        assert!(!sequences_match(&a, &b, MatchTolerance::default()));
    }

    #[test]
    fn test_significance() {
        let flat = vec![obs(0, "tap", 100.0), obs(100, "tap", 110.0)];
        assert!(!is_significant(&flat, 0.2));

        let jump = vec![obs(0, "tap", 100.0), obs(100, "tap", 130.0)];
        assert!(is_significant(&jump, 0.2));

        let from_zero = vec![obs(0, "tap", 0.0), obs(100, "tap", 1.0)];
        assert!(is_significant(&from_zero, 0.2));
    }

    #[test]
    fn test_consistency_climbs_and_is_capped() {
        let mut pattern = Pattern::new(PatternKind::Behavior, vec![step("tap", 1.0, 0)], 0.5, 0);
        let mut last = pattern.consistency;
        for i in 0..500 {
            pattern.record_match(i);
            assert!(pattern.consistency >= last);
            assert!(pattern.consistency <= MAX_CONSISTENCY);
            last = pattern.consistency;
        }
        assert_eq!(pattern.match_count, 501);
        assert!((pattern.consistency - MAX_CONSISTENCY).abs() < 1e-9);
    }

    #[test]
    fn test_first_rematch_adds_a_twentieth() {
        let mut pattern = Pattern::new(PatternKind::Behavior, vec![step("tap", 1.0, 0)], 0.5, 0);
        pattern.record_match(10);
        assert!((pattern.consistency - 0.55).abs() < 1e-9);
        assert_eq!(pattern.last_seen_ms, 10);
    }

    #[test]
    fn test_same_steps_same_id() {
        let a = Pattern::new(PatternKind::Behavior, vec![step("tap", 1.0, 0)], 0.5, 0);
        let b = Pattern::new(PatternKind::Behavior, vec![step("tap", 1.0, 0)], 0.5, 99);
        let c = Pattern::new(
            PatternKind::Enemy { entity_type: "slime".into() },
            vec![step("tap", 1.0, 0)],
            0.5,
            0,
        );
        assert_eq!(a.id, b.id);
        assert_ne!(a.id, c.id);
    }

    #[test]
    fn test_mining_discovers_and_rematches() {
        let mut miner = PatternMiner::new(MiningSettings {
            max_window: 2,
            ..Default::default()
        });

        // tap resets the score to 100, collect lifts it to 150, repeated
        let history: Vec<Observation> = (0..6)
            .map(|i| {
                let ts = i * 500;
                if i % 2 == 0 {
                    obs(ts, "tap", 100.0)
                } else {
                    obs(ts, "collect", 150.0)
                }
            })
            .collect();

        let report = miner.mine(&history);
        assert!(!report.discovered.is_empty());
        assert!(!report.matched.is_empty());

        let best = miner.patterns().iter().max_by_key(|p| p.match_count).unwrap();
        assert!(best.match_count >= 2);
        assert!(best.consistency > 0.5);
    }

    #[test]
    fn test_mining_is_incremental() {
        let mut miner = PatternMiner::new(MiningSettings::default());
        let history = vec![obs(0, "tap", 100.0), obs(500, "collect", 150.0)];

        let first = miner.mine(&history);
        assert_eq!(first.windows_scanned, 1);
        assert_eq!(first.discovered.len(), 1);

        let again = miner.mine(&history);
        assert_eq!(again.windows_scanned, 0);
        assert_eq!(miner.patterns()[0].match_count, 1);
    }

    #[test]
    fn test_repeated_timestamps_are_still_mined() {
        let store = ObservationStore::new(50);
        let mut miner = PatternMiner::new(MiningSettings::default());
        recorded(&store, 0, "tap", 100.0);
        recorded(&store, 500, "collect", 150.0);

        let first = miner.mine(&store.snapshot());
        assert_eq!(first.windows_scanned, 1);

        // A burst stamped with the same millisecond
        recorded(&store, 500, "tap", 100.0);
        recorded(&store, 500, "collect", 150.0);
        recorded(&store, 500, "tap", 100.0);

        let second = miner.mine(&store.snapshot());
        assert!(second.windows_scanned > 0);
        assert!(!second.discovered.is_empty() || !second.matched.is_empty());

        let third = miner.mine(&store.snapshot());
        assert_eq!(third.windows_scanned, 0);
    }

    #[test]
    fn test_insignificant_windows_are_ignored() {
        let mut miner = PatternMiner::new(MiningSettings::default());
        let history: Vec<Observation> = (0..5).map(|i| obs(i * 100, "idle", 10.0)).collect();
        let report = miner.mine(&history);
        assert!(report.discovered.is_empty());
        assert!(miner.is_empty());
    }

    #[test]
    fn test_max_patterns_cap() {
        let mut miner = PatternMiner::new(MiningSettings {
            max_patterns: 1,
            ..Default::default()
        });
        let history: Vec<Observation> = (0..6)
            .map(|i| obs(i * 100, &format!("a{}", i), (i * 100) as f64))
            .collect();
        miner.mine(&history);
        assert_eq!(miner.len(), 1);
    }

    #[test]
    fn test_window_kind() {
        let state = |level: f64, success: bool| {
            GameState::new()
                .with("action", "tap")
                .with("level", level)
                .with("success", success)
        };
        let window = |a: GameState, b: GameState| {
            vec![
                Observation::from_frame(CapturedFrame::at(0, vec![], a), vec![]),
                Observation::from_frame(CapturedFrame::at(100, vec![], b), vec![]),
            ]
        };
        let steps_of = |w: &[Observation]| {
            vec![
                PatternStep::from_observation(&w[0], None),
                PatternStep::from_observation(&w[1], Some(&w[0])),
            ]
        };

        let level_up = window(state(1.0, false), state(2.0, true));
        assert_eq!(PatternKind::for_window(&level_up, &steps_of(&level_up)), PatternKind::Level);

        let won = window(state(1.0, false), state(1.0, true));
        assert_eq!(PatternKind::for_window(&won, &steps_of(&won)), PatternKind::Strategy);

        let plain = window(state(1.0, false), state(1.0, false));
        assert_eq!(PatternKind::for_window(&plain, &steps_of(&plain)), PatternKind::Behavior);
    }
}
