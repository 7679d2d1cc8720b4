//! Entity and enemy tracking
//!
//! Tracked entities are pulled out of each frame's detected elements. Their
//! consecutive positions are folded into direction-classified movement
//! steps, and the step sequences of enemies are mined for recurring
//! movement patterns with a synthesized counter-strategy.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tracing::{debug, info};

use crate::analysis::observation::TrackingSnapshot;
use crate::analysis::patterns::{sequences_match, MatchTolerance, Pattern, PatternKind, PatternStep};
use crate::capture::DetectedElement;
use crate::config::TrackingSettings;
use crate::shared::keys;

/// Action type of derived movement steps
pub const MOVE_ACTION: &str = "move";

/// Entities not seen for this long are dropped from tracking
const ENTITY_STALE_MS: u64 = 30_000;

const DIRECTIONS: [&str; 4] = ["left", "right", "up", "down"];

/// Pull tracking snapshots for tracked categories out of a frame's elements
pub fn extract_snapshots(
    elements: &[DetectedElement],
    timestamp_ms: u64,
    settings: &TrackingSettings,
) -> Vec<TrackingSnapshot> {
    elements
        .iter()
        .filter(|e| {
            e.attributes.bool("tracked").unwrap_or(false)
                || contains_ignore_case(&settings.tracked_categories, &e.category)
        })
        .map(|e| TrackingSnapshot {
            entity_id: e.id.clone(),
            entity_type: e
                .attributes
                .text("entity_type")
                .unwrap_or(e.category.as_str())
                .to_string(),
            category: e.category.clone(),
            bounds: e.bounds,
            health: e.attributes.number(keys::HEALTH).unwrap_or(1.0),
            attributes: e.attributes.clone(),
            timestamp_ms,
        })
        .collect()
}

fn contains_ignore_case(list: &[String], value: &str) -> bool {
    list.iter().any(|c| c.eq_ignore_ascii_case(value))
}

/// Direction of the dominant displacement axis (screen y grows downward)
pub fn classify_direction(dx: f64, dy: f64) -> Option<&'static str> {
    if dx == 0.0 && dy == 0.0 {
        return None;
    }
    if dx.abs() >= dy.abs() {
        Some(if dx > 0.0 { "right" } else { "left" })
    } else {
        Some(if dy > 0.0 { "down" } else { "up" })
    }
}

/// Direction to favor against an enemy moving in `direction`
pub fn opposite(direction: &str) -> Option<&'static str> {
    match direction {
        "left" => Some("right"),
        "right" => Some("left"),
        "up" => Some("down"),
        "down" => Some("up"),
        _ => None,
    }
}

/// Most frequent cardinal direction across the steps, with its count
pub fn dominant_direction(steps: &[PatternStep]) -> Option<(&'static str, usize)> {
    let mut counts = [0usize; 4];
    for step in steps {
        if let Some(i) = step.direction().and_then(|d| DIRECTIONS.iter().position(|x| *x == d)) {
            counts[i] += 1;
        }
    }

    let mut best: Option<(&'static str, usize)> = None;
    for (dir, count) in DIRECTIONS.iter().zip(counts) {
        if count > 0 && best.map_or(true, |(_, c)| count > c) {
            best = Some((*dir, count));
        }
    }
    best
}

/// Natural-language counter-strategy for an enemy movement pattern
pub fn counter_strategy(entity_type: &str, steps: &[PatternStep]) -> String {
    let period_s = steps.iter().map(|s| s.duration_ms).sum::<u64>() as f64 / 1000.0;

    let positioning = match dominant_direction(steps) {
        Some((dir, count)) => {
            let advice = match dir {
                "right" => "keep to its left",
                "left" => "keep to its right",
                "down" => "stay above it",
                _ => "stay below it",
            };
            format!(
                "{} moves mostly {} ({} of {} steps): {}.",
                entity_type,
                dir,
                count,
                steps.len(),
                advice
            )
        }
        None => format!("No dominant movement observed for {}.", entity_type),
    };

    format!(
        "{} Pattern repeats roughly every {:.1}s. Attack when it changes direction.",
        positioning, period_s
    )
}

/// A recurring movement pattern of one enemy type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnemyPattern {
    pub pattern: Pattern,
    pub entity_type: String,
    pub counter_strategy: String,
}

impl EnemyPattern {
    pub fn detection_count(&self) -> u32 {
        self.pattern.match_count
    }

    /// Direction to move in to counter this enemy
    pub fn counter_direction(&self) -> Option<&'static str> {
        dominant_direction(&self.pattern.steps).and_then(|(dir, _)| opposite(dir))
    }
}

/// Outcome of feeding an enemy's new movement step to the matcher
#[derive(Debug, Clone, PartialEq)]
pub struct EnemyPatternUpdate {
    pub pattern_id: String,
    pub created: bool,
}

#[derive(Debug, Clone)]
struct EntityTrack {
    entity_type: String,
    is_enemy: bool,
    snapshots: VecDeque<TrackingSnapshot>,
    steps: VecDeque<PatternStep>,
    /// Time of the last observation that contributed to the current step
    step_time_ms: Option<u64>,
}

impl EntityTrack {
    fn last_seen_ms(&self) -> u64 {
        self.snapshots.back().map_or(0, |s| s.timestamp_ms)
    }
}

/// Per-entity movement tracking and enemy pattern mining
pub struct EntityTracker {
    settings: TrackingSettings,
    history_size: usize,
    tolerance: MatchTolerance,
    initial_consistency: f64,
    tracks: HashMap<String, EntityTrack>,
    enemy_patterns: Vec<EnemyPattern>,
}

impl EntityTracker {
    pub fn new(
        settings: TrackingSettings,
        history_size: usize,
        tolerance: MatchTolerance,
        initial_consistency: f64,
    ) -> Self {
        Self {
            settings,
            history_size: history_size.max(2),
            tolerance,
            initial_consistency,
            tracks: HashMap::new(),
            enemy_patterns: Vec::new(),
        }
    }

    /// Feed one frame's snapshots
    pub fn observe(&mut self, snapshots: &[TrackingSnapshot]) -> Vec<EnemyPatternUpdate> {
        let mut updates = Vec::new();

        for snapshot in snapshots {
            let new_step = self.push_snapshot(snapshot);
            if new_step {
                if let Some(update) = self.mine_entity(&snapshot.entity_id) {
                    updates.push(update);
                }
            }
        }

        if let Some(newest) = snapshots.iter().map(|s| s.timestamp_ms).max() {
            self.evict_stale(newest);
        }

        updates
    }

    /// Record a snapshot and extend or start a movement step.
    /// Returns true when a new step was started.
    fn push_snapshot(&mut self, snapshot: &TrackingSnapshot) -> bool {
        let is_enemy = contains_ignore_case(&self.settings.enemy_categories, &snapshot.category)
            || contains_ignore_case(&self.settings.enemy_categories, &snapshot.entity_type);
        let track = self
            .tracks
            .entry(snapshot.entity_id.clone())
            .or_insert_with(|| EntityTrack {
                entity_type: snapshot.entity_type.clone(),
                is_enemy,
                snapshots: VecDeque::new(),
                steps: VecDeque::new(),
                step_time_ms: None,
            });

        let previous = track.snapshots.back().cloned();
        track.snapshots.push_back(snapshot.clone());
        while track.snapshots.len() > self.history_size {
            track.snapshots.pop_front();
        }

        let Some(previous) = previous else {
            return false;
        };
        if snapshot.timestamp_ms < previous.timestamp_ms {
            return false;
        }

        let (x0, y0) = previous.bounds.center();
        let (x1, y1) = snapshot.bounds.center();
        let (dx, dy) = (x1 - x0, y1 - y0);
        let Some(direction) = classify_direction(dx, dy) else {
            return false;
        };

        let dt_ms = snapshot.timestamp_ms - previous.timestamp_ms;
        let distance = (dx * dx + dy * dy).sqrt();
        let gap_ms = track
            .step_time_ms
            .map(|t| snapshot.timestamp_ms.saturating_sub(t));

        let continues = match (track.steps.back(), gap_ms) {
            (Some(last), Some(gap)) => {
                last.direction() == Some(direction) && gap <= self.settings.step_interval_ms
            }
            _ => false,
        };

        track.step_time_ms = Some(snapshot.timestamp_ms);

        if continues {
            if let Some(last) = track.steps.back_mut() {
                let duration_ms = last.duration_ms + dt_ms;
                let total = last.parameters.number("distance").unwrap_or(0.0) + distance;
                last.duration_ms = duration_ms;
                last.parameters.insert("distance", total);
                last.parameters.insert("speed", speed(total, duration_ms));
            }
            return false;
        }

        let step = PatternStep::new(MOVE_ACTION)
            .with_parameter(keys::DIRECTION, direction)
            .with_parameter("distance", distance)
            .with_parameter("speed", speed(distance, dt_ms))
            .with_duration(dt_ms);
        track.steps.push_back(step);
        while track.steps.len() > self.history_size {
            track.steps.pop_front();
        }
        true
    }

    /// Match the entity's recent steps against known enemy patterns
    fn mine_entity(&mut self, entity_id: &str) -> Option<EnemyPatternUpdate> {
        let track = self.tracks.get(entity_id)?;
        if !track.is_enemy
            || track.snapshots.len() < self.settings.min_observations
            || track.steps.len() < self.settings.min_steps.max(1)
        {
            return None;
        }

        let take = track.steps.len().min(self.settings.max_pattern_steps.max(self.settings.min_steps));
        let candidate: Vec<PatternStep> = track.steps.iter().skip(track.steps.len() - take).cloned().collect();
        let entity_type = track.entity_type.clone();
        let seen_ms = track.last_seen_ms();

        if let Some(existing) = self.enemy_patterns.iter_mut().find(|p| {
            p.entity_type == entity_type && sequences_match(&p.pattern.steps, &candidate, self.tolerance)
        }) {
            existing.pattern.record_match(seen_ms);
            debug!(
                "Enemy pattern {} for {} detected again ({} times)",
                existing.pattern.id,
                entity_type,
                existing.detection_count()
            );
            return Some(EnemyPatternUpdate {
                pattern_id: existing.pattern.id.clone(),
                created: false,
            });
        }

        if self.enemy_patterns.len() >= self.settings.max_enemy_patterns {
            return None;
        }

        let strategy = counter_strategy(&entity_type, &candidate);
        let pattern = Pattern::new(
            PatternKind::Enemy {
                entity_type: entity_type.clone(),
            },
            candidate,
            self.initial_consistency,
            seen_ms,
        );
        info!(
            "New enemy pattern {} for {} ({} steps)",
            pattern.id,
            entity_type,
            pattern.len()
        );

        let pattern_id = pattern.id.clone();
        self.enemy_patterns.push(EnemyPattern {
            pattern,
            entity_type,
            counter_strategy: strategy,
        });

        Some(EnemyPatternUpdate {
            pattern_id,
            created: true,
        })
    }

    fn evict_stale(&mut self, newest_ms: u64) {
        let before = self.tracks.len();
        self.tracks
            .retain(|_, t| newest_ms.saturating_sub(t.last_seen_ms()) <= ENTITY_STALE_MS);
        let dropped = before - self.tracks.len();
        if dropped > 0 {
            debug!("Dropped {} stale tracked entities", dropped);
        }
    }

    /// Movement steps derived so far for an entity
    pub fn steps(&self, entity_id: &str) -> Vec<PatternStep> {
        self.tracks
            .get(entity_id)
            .map(|t| t.steps.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Latest snapshot of an entity
    pub fn latest(&self, entity_id: &str) -> Option<&TrackingSnapshot> {
        self.tracks.get(entity_id).and_then(|t| t.snapshots.back())
    }

    pub fn tracked_entities(&self) -> usize {
        self.tracks.len()
    }

    pub fn enemy_patterns(&self) -> &[EnemyPattern] {
        &self.enemy_patterns
    }

    pub fn enemy_pattern(&self, id: &str) -> Option<&EnemyPattern> {
        self.enemy_patterns.iter().find(|p| p.pattern.id == id)
    }

    /// Restore previously exported enemy patterns, skipping ids already known
    pub fn import(&mut self, patterns: Vec<EnemyPattern>) {
        for pattern in patterns {
            if self.enemy_pattern(&pattern.pattern.id).is_none() {
                self.enemy_patterns.push(pattern);
            }
        }
    }

    pub fn clear(&mut self) {
        self.tracks.clear();
        self.enemy_patterns.clear();
    }
}

fn speed(distance: f64, duration_ms: u64) -> f64 {
    if duration_ms == 0 {
        0.0
    } else {
        distance / (duration_ms as f64 / 1000.0)
    }
}
