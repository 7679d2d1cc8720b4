//! End-to-end runs of the insight engine through its public API

use std::io::Cursor;

use game_insight::analysis::{Rule, RuleType};
use game_insight::capture::{CapturedFrame, DetectedElement, FrameSource, ReplaySource};
use game_insight::priority::{CriticalFlags, GameAction};
use game_insight::shared::{GameState, Rect};
use game_insight::storage::{GameProfile, RuleDefinition};
use game_insight::{AppConfig, InsightEngine};

fn enemy_at(x: f64) -> DetectedElement {
    DetectedElement::new("e1", "enemy", Rect::new(x, 100.0, 20.0, 20.0))
}

#[test]
fn rightward_enemy_yields_a_single_step() {
    let engine = InsightEngine::default();

    for (i, x) in [0.0, 50.0, 100.0].into_iter().enumerate() {
        engine.ingest_frame(CapturedFrame::at(i as u64 * 1000, vec![enemy_at(x)], GameState::new()));
    }
    let steps = engine.entity_steps("e1");
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0].direction(), Some("right"));

    // Still moving right, within a second of the previous observation
    engine.ingest_frame(CapturedFrame::at(2500, vec![enemy_at(125.0)], GameState::new()));
    assert_eq!(engine.entity_steps("e1").len(), 1);
}

#[test]
fn low_health_puts_heal_above_attack() {
    let engine = InsightEngine::default();
    engine.set_critical_flags(CriticalFlags {
        low_health: true,
        ..Default::default()
    });

    let attack = GameAction::new("attack").with_id("attack");
    let heal = GameAction::new("heal").with_id("heal");
    let state = GameState::new().with("health", 0.15);

    let ranked = engine.prioritize_actions(&[attack, heal], &state);
    assert_eq!(ranked[0].action_id, "heal");
    assert!(ranked[0].final_priority > ranked[1].final_priority);
}

#[test]
fn recorded_successes_lift_collect_over_move() {
    let engine = InsightEngine::default();
    let gem = GameAction::new("collect").with_target("gem");
    for _ in 0..10 {
        engine.record_action_result(&gem, true, 0.5, 80.0);
    }

    let collect = GameAction::new("collect").with_target("gem").with_id("collect");
    let walk = GameAction::new("move").with_id("move");
    let ranked = engine.prioritize_actions(&[walk, collect], &GameState::new());

    assert_eq!(ranked[0].action_id, "collect");
    assert!(ranked[0].factor("success_rate").is_some_and(|f| f > 1.0));
}

#[test]
fn same_rule_twice_is_merged() {
    let engine = InsightEngine::default();
    let rule = Rule::new(RuleType::Scoring, "Collecting a coin adds 10 points", 0.6);

    let first = engine.add_rule(rule.clone()).unwrap();
    let second = engine.add_rule(rule).unwrap();

    let rules = engine.rules();
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].observation_count, 2);
    assert!(second.confidence > first.confidence);
    assert!(!second.created);
}

#[test]
fn empty_candidates_and_missing_health() {
    let engine = InsightEngine::default();
    assert!(engine.prioritize_actions(&[], &GameState::new()).is_empty());

    let ranked = engine.prioritize_actions(&[GameAction::new("heal")], &GameState::new().with("score", 5.0));
    assert!(ranked[0].factor("emergency_health").is_none());
}

#[test]
fn replayed_session_produces_rules_and_recommendations() {
    let mut lines = String::new();
    for i in 0..12u64 {
        let (action, score) = if i % 2 == 0 { ("tap", 100.0) } else { ("collect", 160.0) };
        let frame = CapturedFrame::at(
            i * 250,
            vec![],
            GameState::new().with("action", action).with("score", score).with("health", 0.4),
        );
        lines.push_str(&serde_json::to_string(&frame).unwrap());
        lines.push('\n');
    }
    lines.push_str("not json\n");

    let engine = InsightEngine::new(AppConfig::default());
    let profile = GameProfile {
        id: "arcade".to_string(),
        name: "Arcade".to_string(),
        game_type: Some("platformer".to_string()),
        rules: vec![RuleDefinition {
            rule_type: RuleType::Goal,
            description: "Grab the health pack when hurt".to_string(),
            confidence: 0.9,
            parameters: Default::default(),
            condition: Some("state.health < 0.5".to_string()),
        }],
    };
    assert_eq!(engine.load_profile(&profile).unwrap(), 1);

    let mut source = ReplaySource::from_reader(Cursor::new(lines));
    while let Some(frame) = source.next_frame() {
        engine.ingest_frame(frame);
    }
    assert_eq!(source.skipped(), 1);

    engine.analyze_now();
    let stats = engine.stats();
    assert_eq!(stats.frames_ingested, 12);
    assert!(stats.patterns > 0);
    assert!(engine.rules_by_type(RuleType::Scoring).len() >= 1);

    let recommendations = engine.recommend(&engine.current_state());
    assert_eq!(recommendations.len(), 1);
    assert_eq!(recommendations[0].action.action_type, "interact");

    engine.stop();
    assert!(engine.rules().is_empty());
    assert_eq!(engine.stats().observations, 0);
}
