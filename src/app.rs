//! Insight Engine
//!
//! Owns the observation history, the miners and the rule base, and runs the
//! periodic analysis on a background thread. Frame ingestion happens on the
//! caller's thread and may run concurrently with an analysis tick: ingestion
//! is the only writer of the store and the entity tracker, the analyzer the
//! only writer of patterns, rules and causal links.

use crossbeam_channel::{after, bounded, select, tick, Receiver, RecvTimeoutError, Sender};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::analysis::entities::extract_snapshots;
use crate::analysis::patterns::MatchTolerance;
use crate::analysis::rules::RuleUpdate;
use crate::analysis::{
    CausalRelationship, CausalTracker, EnemyPattern, EntityTracker, EventBus, Observation,
    ObservationStore, Pattern, PatternMiner, PatternStep, Rule, RuleEngine, RuleType,
};
use crate::capture::CapturedFrame;
use crate::config::AppConfig;
use crate::error::{EngineError, EngineResult};
use crate::priority::{
    ActionPrioritizer, ActionValueModel, CriticalFlags, GameAction, PrioritizedAction,
};
use crate::shared::{GameState, RecognitionEvent};
use crate::storage::{GameProfile, KnowledgeSnapshot};

/// Counters and sizes describing the engine
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EngineStats {
    pub running: bool,
    pub frames_ingested: u64,
    pub analysis_runs: u64,
    pub observations: usize,
    pub observation_capacity: usize,
    pub tracked_entities: usize,
    pub patterns: usize,
    pub enemy_patterns: usize,
    pub rules: usize,
    pub causal_relationships: usize,
}

/// Outcome of one analysis tick
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisReport {
    pub patterns_discovered: usize,
    pub patterns_matched: usize,
    pub rules_created: usize,
    pub rules_reinforced: usize,
    pub causal_updated: usize,
}

struct Inner {
    store: ObservationStore,
    tracker: RwLock<EntityTracker>,
    miner: RwLock<PatternMiner>,
    rules: RwLock<RuleEngine>,
    causal: RwLock<CausalTracker>,
    prioritizer: RwLock<ActionPrioritizer>,
    events: EventBus,
    /// Held for the duration of an analysis tick and while clearing state
    analysis: Mutex<()>,
    /// Shared by ingestions, taken exclusively while clearing state
    ingest_gate: RwLock<()>,
    frames_ingested: AtomicU64,
    analysis_runs: AtomicU64,
    config: AppConfig,
}

impl Inner {
    fn analyze(&self) -> AnalysisReport {
        let guard = self.analysis.lock();
        let observations = self.store.snapshot();
        let mut report = AnalysisReport::default();
        let mut events = Vec::new();

        // Pattern mining
        let patterns = {
            let mut miner = self.miner.write();
            let mining = miner.mine(&observations);
            report.patterns_discovered = mining.discovered.len();
            report.patterns_matched = mining.matched.len();

            for id in &mining.discovered {
                if let Some(p) = miner.pattern(id) {
                    events.push(RecognitionEvent::PatternDiscovered {
                        pattern_id: p.id.clone(),
                        steps: p.len(),
                    });
                }
            }
            for id in unique(&mining.matched) {
                if let Some(p) = miner.pattern(id) {
                    events.push(RecognitionEvent::PatternMatched {
                        pattern_id: p.id.clone(),
                        match_count: p.match_count,
                        consistency: p.consistency,
                    });
                }
            }
            miner.patterns().to_vec()
        };

        // Causal links
        let relationships = {
            let mut causal = self.causal.write();
            let analysis = causal.analyze(&observations);
            report.causal_updated = analysis.updated.len();
            for id in unique(&analysis.updated) {
                if let Some(rel) = causal.relationship(id) {
                    events.push(RecognitionEvent::CausalLinkObserved {
                        cause_event: rel.cause_event.clone(),
                        effect_key: rel.effect_key.clone(),
                        strength: rel.strength,
                    });
                }
            }
            causal.relationships()
        };

        let enemy_patterns = self.tracker.read().enemy_patterns().to_vec();

        // Rule inference
        {
            let mut rules = self.rules.write();
            let mut updates = rules.infer_from_patterns(&patterns);
            updates.extend(rules.infer_from_causal(&relationships));
            updates.extend(rules.infer_from_enemy_patterns(&enemy_patterns));

            for update in &updates {
                if update.created {
                    report.rules_created += 1;
                } else {
                    report.rules_reinforced += 1;
                }
                events.push(rule_event(&rules, update));
            }
        }

        self.analysis_runs.fetch_add(1, Ordering::Relaxed);
        debug!("Analysis tick over {} observations: {:?}", observations.len(), report);
        drop(guard);

        for event in events {
            self.events.emit(event);
        }
        report
    }

    fn clear(&self) {
        let _guard = self.analysis.lock();
        let _ingest = self.ingest_gate.write();
        self.store.clear();
        self.tracker.write().clear();
        self.miner.write().clear();
        self.rules.write().clear();
        self.causal.write().clear();
        self.prioritizer.write().reset();
        self.frames_ingested.store(0, Ordering::Relaxed);
        self.analysis_runs.store(0, Ordering::Relaxed);
    }
}

fn unique(ids: &[String]) -> Vec<&String> {
    let mut seen = HashSet::new();
    ids.iter().filter(|id| seen.insert(id.as_str())).collect()
}

fn rule_event(rules: &RuleEngine, update: &RuleUpdate) -> RecognitionEvent {
    match (update.created, rules.rule(&update.rule_id)) {
        (true, Some(rule)) => RecognitionEvent::RuleInferred {
            rule_id: rule.id.clone(),
            rule_type: rule.rule_type,
            description: rule.description.clone(),
            confidence: rule.confidence,
        },
        _ => RecognitionEvent::RuleReinforced {
            rule_id: update.rule_id.clone(),
            observation_count: update.observation_count,
            confidence: update.confidence,
        },
    }
}

/// Handle to the background analysis thread
struct Worker {
    shutdown: Sender<()>,
    done: Receiver<()>,
    cancelled: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Gameplay insight engine
pub struct InsightEngine {
    inner: Arc<Inner>,
    worker: Mutex<Option<Worker>>,
}

impl InsightEngine {
    /// Create a stopped engine
    pub fn new(config: AppConfig) -> Self {
        let tolerance = MatchTolerance::from(&config.mining);
        let inner = Inner {
            store: ObservationStore::new(config.observation.history_size),
            tracker: RwLock::new(EntityTracker::new(
                config.tracking.clone(),
                config.observation.entity_history_size,
                tolerance,
                config.mining.initial_consistency,
            )),
            miner: RwLock::new(PatternMiner::new(config.mining.clone())),
            rules: RwLock::new(RuleEngine::new(config.inference.clone())),
            causal: RwLock::new(CausalTracker::new(config.inference.causal_change_threshold)),
            prioritizer: RwLock::new(ActionPrioritizer::new(config.priority.clone())),
            events: EventBus::new(),
            analysis: Mutex::new(()),
            ingest_gate: RwLock::new(()),
            frames_ingested: AtomicU64::new(0),
            analysis_runs: AtomicU64::new(0),
            config,
        };

        Self {
            inner: Arc::new(inner),
            worker: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.inner.config
    }

    /// Feed one processed frame
    ///
    /// Tracks entities (mining enemy patterns as their movement changes) and
    /// records the observation for the next analysis tick.
    pub fn ingest_frame(&self, frame: CapturedFrame) {
        let inner = &self.inner;
        let snapshots = extract_snapshots(&frame.elements, frame.timestamp_ms, &inner.config.tracking);

        let mut events = Vec::new();
        let gate = inner.ingest_gate.read();
        {
            let mut tracker = inner.tracker.write();
            for update in tracker.observe(&snapshots) {
                if let Some(enemy) = tracker.enemy_pattern(&update.pattern_id) {
                    events.push(RecognitionEvent::EnemyPatternRecognized {
                        pattern_id: enemy.pattern.id.clone(),
                        entity_type: enemy.entity_type.clone(),
                        detection_count: enemy.detection_count(),
                        counter_strategy: enemy.counter_strategy.clone(),
                    });
                }
            }
        }

        inner.store.record(Observation::from_frame(frame, snapshots));
        inner.frames_ingested.fetch_add(1, Ordering::Relaxed);
        drop(gate);

        for event in events {
            inner.events.emit(event);
        }
    }

    /// Run one analysis tick on the caller's thread
    pub fn analyze_now(&self) -> AnalysisReport {
        self.inner.analyze()
    }

    /// Start periodic analysis on a background thread
    pub fn start(&self) -> EngineResult<()> {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return Err(EngineError::AlreadyRunning);
        }

        let delay_ms = self.inner.config.scheduler.initial_delay_ms;
        let interval_ms = self.inner.config.scheduler.interval_ms.max(1);
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
        let (done_tx, done_rx) = bounded::<()>(1);
        let cancelled = Arc::new(AtomicBool::new(false));

        let inner = self.inner.clone();
        let thread_cancelled = cancelled.clone();
        let handle = std::thread::Builder::new()
            .name("insight-analysis".to_string())
            .spawn(move || {
                info!("Analysis thread starting...");
                let first = after(Duration::from_millis(delay_ms));
                let proceed = select! {
                    recv(shutdown_rx) -> _ => false,
                    recv(first) -> _ => true,
                };

                if proceed {
                    let ticker = tick(Duration::from_millis(interval_ms));
                    loop {
                        if thread_cancelled.load(Ordering::SeqCst) {
                            break;
                        }
                        inner.analyze();
                        select! {
                            recv(shutdown_rx) -> _ => break,
                            recv(ticker) -> _ => {}
                        }
                    }
                }

                info!("Analysis thread exiting...");
                let _ = done_tx.send(());
            })?;

        *worker = Some(Worker {
            shutdown: shutdown_tx,
            done: done_rx,
            cancelled,
            handle,
        });
        info!(
            "Background analysis started (delay {}ms, interval {}ms)",
            delay_ms, interval_ms
        );
        Ok(())
    }

    /// Whether the background analysis is running
    pub fn is_running(&self) -> bool {
        self.worker.lock().is_some()
    }

    /// Stop periodic analysis and clear all learned state
    ///
    /// Waits at most `shutdown_wait_ms` for the analysis thread; a thread
    /// that has not finished by then is detached and exits at its next
    /// wake-up without doing further work.
    pub fn stop(&self) {
        self.shutdown_worker();
        self.inner.clear();
        info!("Engine stopped and cleared");
    }

    fn shutdown_worker(&self) {
        let Some(worker) = self.worker.lock().take() else {
            return;
        };

        worker.cancelled.store(true, Ordering::SeqCst);
        let _ = worker.shutdown.try_send(());

        let wait = Duration::from_millis(self.inner.config.scheduler.shutdown_wait_ms);
        match worker.done.recv_timeout(wait) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if worker.handle.join().is_err() {
                    error!("Analysis thread panicked");
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!("Analysis thread did not stop within {:?}; detaching it", wait);
            }
        }
    }

    /// Clear all learned state without touching the lifecycle
    pub fn reset(&self) {
        self.inner.clear();
        info!("Engine state reset");
    }

    /// Recognition events
    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    // Rules and patterns

    pub fn rules(&self) -> Vec<Rule> {
        self.inner.rules.read().rules()
    }

    pub fn rules_by_type(&self, rule_type: RuleType) -> Vec<Rule> {
        self.inner.rules.read().rules_by_type(rule_type)
    }

    pub fn rules_above_confidence(&self, threshold: f64) -> Vec<Rule> {
        self.inner.rules.read().rules_above_confidence(threshold)
    }

    pub fn patterns(&self) -> Vec<Pattern> {
        self.inner.miner.read().patterns().to_vec()
    }

    pub fn enemy_patterns(&self) -> Vec<EnemyPattern> {
        self.inner.tracker.read().enemy_patterns().to_vec()
    }

    /// Movement steps derived for a tracked entity
    pub fn entity_steps(&self, entity_id: &str) -> Vec<PatternStep> {
        self.inner.tracker.read().steps(entity_id)
    }

    pub fn causal_relationships(&self) -> Vec<CausalRelationship> {
        self.inner.causal.read().relationships()
    }

    /// Game state of the newest observation
    pub fn current_state(&self) -> GameState {
        self.inner
            .store
            .latest()
            .map(|o| o.game_state)
            .unwrap_or_default()
    }

    pub fn stats(&self) -> EngineStats {
        let inner = &self.inner;
        let tracker = inner.tracker.read();
        EngineStats {
            running: self.is_running(),
            frames_ingested: inner.frames_ingested.load(Ordering::Relaxed),
            analysis_runs: inner.analysis_runs.load(Ordering::Relaxed),
            observations: inner.store.len(),
            observation_capacity: inner.store.capacity(),
            tracked_entities: tracker.tracked_entities(),
            patterns: inner.miner.read().len(),
            enemy_patterns: tracker.enemy_patterns().len(),
            rules: inner.rules.read().len(),
            causal_relationships: inner.causal.read().len(),
        }
    }

    /// Add or reinforce an externally authored rule
    ///
    /// The rule's condition, if any, must compile.
    pub fn add_rule(&self, rule: Rule) -> EngineResult<RuleUpdate> {
        if let Some(condition) = &rule.condition {
            self.inner
                .prioritizer
                .read()
                .conditions()
                .validate(&rule.id, condition)?;
        }

        let event = {
            let mut rules = self.inner.rules.write();
            let update = rules.add_rule(rule);
            (rule_event(&rules, &update), update)
        };
        self.inner.events.emit(event.0);
        Ok(event.1)
    }

    /// Seed rules and game type from a profile
    ///
    /// All conditions are validated before any rule is added.
    pub fn load_profile(&self, profile: &GameProfile) -> EngineResult<usize> {
        let rules: Vec<Rule> = profile.rules.iter().map(|d| d.to_rule()).collect();
        {
            let prioritizer = self.inner.prioritizer.read();
            for rule in &rules {
                if let Some(condition) = &rule.condition {
                    prioritizer.conditions().validate(&rule.id, condition)?;
                }
            }
        }

        if profile.game_type.is_some() {
            self.set_game_type(profile.game_type.clone());
        }

        let count = rules.len();
        for rule in rules {
            self.add_rule(rule)?;
        }
        info!("Loaded profile '{}' with {} rules", profile.name, count);
        Ok(count)
    }

    /// Everything learned so far
    pub fn export_knowledge(&self) -> KnowledgeSnapshot {
        KnowledgeSnapshot {
            rules: self.rules(),
            patterns: self.patterns(),
            enemy_patterns: self.enemy_patterns(),
            causal: self.causal_relationships(),
        }
    }

    /// Restore exported knowledge; known items are kept as they are
    pub fn import_knowledge(&self, snapshot: KnowledgeSnapshot) {
        let inner = &self.inner;
        let _guard = inner.analysis.lock();
        info!(
            "Importing {} rules, {} patterns, {} enemy patterns, {} causal links",
            snapshot.rules.len(),
            snapshot.patterns.len(),
            snapshot.enemy_patterns.len(),
            snapshot.causal.len()
        );
        inner.rules.write().import(snapshot.rules);
        inner.miner.write().import(snapshot.patterns);
        inner.tracker.write().import(snapshot.enemy_patterns);
        inner.causal.write().import(snapshot.causal);
    }

    // Prioritization

    pub fn prioritize_actions(&self, candidates: &[GameAction], state: &GameState) -> Vec<PrioritizedAction> {
        self.inner.prioritizer.read().prioritize(candidates, state)
    }

    pub fn prioritize_with_model(
        &self,
        model: &mut dyn ActionValueModel,
        candidates: &[GameAction],
        state: &GameState,
    ) -> Vec<PrioritizedAction> {
        self.inner
            .prioritizer
            .read()
            .prioritize_with_model(model, candidates, state)
    }

    pub fn recommend_from_rules(&self, state: &GameState, rules: &[Rule]) -> Vec<PrioritizedAction> {
        self.inner.prioritizer.read().recommend_from_rules(state, rules)
    }

    /// Recommendations from the engine's own rules
    pub fn recommend(&self, state: &GameState) -> Vec<PrioritizedAction> {
        let rules = self.rules();
        self.recommend_from_rules(state, &rules)
    }

    pub fn record_action_result(&self, action: &GameAction, success: bool, reward: f64, exec_time_ms: f64) {
        self.inner
            .prioritizer
            .write()
            .record_action_result(action, success, reward, exec_time_ms);
    }

    pub fn record_user_feedback(&self, action: &GameAction, positive: bool, delta: f64) {
        self.inner
            .prioritizer
            .write()
            .record_user_feedback(action, positive, delta);
    }

    pub fn set_game_type(&self, game_type: Option<String>) {
        info!("Game type set to {:?}", game_type);
        self.inner.prioritizer.write().set_game_type(game_type);
    }

    pub fn set_critical_flags(&self, flags: CriticalFlags) {
        self.inner.prioritizer.write().set_critical_flags(flags);
    }
}

impl Default for InsightEngine {
    fn default() -> Self {
        Self::new(AppConfig::default())
    }
}

impl Drop for InsightEngine {
    fn drop(&mut self) {
        self.shutdown_worker();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::DetectedElement;
    use crate::shared::Rect;
    use std::time::Instant;

    fn fast_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.scheduler.initial_delay_ms = 0;
        config.scheduler.interval_ms = 10;
        config
    }

    fn frame(ts: u64, action: &str, score: f64) -> CapturedFrame {
        CapturedFrame::at(
            ts,
            vec![],
            GameState::new().with("action", action).with("score", score),
        )
    }

    fn feed_scoring_loop(engine: &InsightEngine, rounds: u64) {
        for i in 0..rounds {
            engine.ingest_frame(frame(i * 200, "tap", 100.0));
            engine.ingest_frame(frame(i * 200 + 100, "collect", 150.0));
        }
    }

    #[test]
    fn test_ingest_records_observations() {
        let engine = InsightEngine::default();
        engine.ingest_frame(frame(0, "tap", 1.0));
        engine.ingest_frame(frame(100, "tap", 2.0));

        let stats = engine.stats();
        assert_eq!(stats.frames_ingested, 2);
        assert_eq!(stats.observations, 2);
        assert!(!stats.running);
        assert_eq!(engine.current_state().number("score"), Some(2.0));
    }

    #[test]
    fn test_analysis_infers_rules() {
        let engine = InsightEngine::default();
        feed_scoring_loop(&engine, 10);

        let report = engine.analyze_now();
        assert!(report.patterns_discovered > 0);
        assert!(report.rules_created > 0);
        assert!(!engine.rules().is_empty());
        assert_eq!(engine.stats().analysis_runs, 1);
    }

    #[test]
    fn test_reads_are_idempotent() {
        let engine = InsightEngine::default();
        feed_scoring_loop(&engine, 6);
        engine.analyze_now();

        assert_eq!(engine.stats(), engine.stats());
        assert_eq!(engine.rules(), engine.rules());
    }

    #[test]
    fn test_events_are_emitted() {
        let engine = InsightEngine::default();
        let rx = engine.events().subscribe_channel();
        feed_scoring_loop(&engine, 10);
        engine.analyze_now();

        let events: Vec<RecognitionEvent> = rx.try_iter().collect();
        assert!(events.iter().any(|e| matches!(e, RecognitionEvent::PatternDiscovered { .. })));
        assert!(events.iter().any(|e| matches!(e, RecognitionEvent::RuleInferred { .. })));
    }

    #[test]
    fn test_panicking_subscriber_does_not_stop_analysis() {
        let engine = InsightEngine::default();
        engine.events().subscribe(|_| panic!("bad subscriber"));
        feed_scoring_loop(&engine, 10);

        engine.analyze_now();
        assert!(!engine.rules().is_empty());
    }

    #[test]
    fn test_start_twice_fails() {
        let engine = InsightEngine::new(fast_config());
        engine.start().unwrap();
        assert!(matches!(engine.start(), Err(EngineError::AlreadyRunning)));
        engine.stop();
        assert!(!engine.is_running());
    }

    #[test]
    fn test_background_analysis_and_stop() {
        let engine = InsightEngine::new(fast_config());
        feed_scoring_loop(&engine, 10);
        engine.start().unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while engine.stats().analysis_runs == 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(engine.stats().analysis_runs > 0);
        assert!(!engine.rules().is_empty());

        engine.stop();
        let stats = engine.stats();
        assert_eq!(stats, EngineStats {
            observation_capacity: stats.observation_capacity,
            ..Default::default()
        });

        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(engine.stats().analysis_runs, 0);
    }

    #[test]
    fn test_ingestion_during_background_ticks() {
        let mut config = fast_config();
        config.scheduler.interval_ms = 1;
        let engine = Arc::new(InsightEngine::new(config));
        engine.start().unwrap();

        let feeder = {
            let engine = engine.clone();
            std::thread::spawn(move || {
                for i in 0..200u64 {
                    engine.ingest_frame(frame(i * 200, "tap", 100.0));
                    engine.ingest_frame(frame(i * 200 + 100, "collect", 150.0));
                    if i % 20 == 0 {
                        std::thread::sleep(Duration::from_millis(2));
                    }
                }
            })
        };
        feeder.join().unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while engine.stats().analysis_runs < 2 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        engine.analyze_now();

        let stats = engine.stats();
        assert_eq!(stats.frames_ingested, 400);
        assert_eq!(stats.observations, stats.observation_capacity.min(400));
        assert!(stats.analysis_runs >= 2);
        assert!(stats.patterns > 0);

        let rules = engine.rules();
        assert!(!rules.is_empty());
        assert_eq!(stats.rules, rules.len());
        assert!(rules
            .iter()
            .all(|r| r.observation_count >= 1 && r.confidence <= crate::analysis::patterns::MAX_CONSISTENCY));

        // Nothing new to learn once every frame has been analyzed
        let idle = engine.analyze_now();
        assert_eq!(idle.rules_created + idle.rules_reinforced, 0);
        assert_eq!(engine.rules(), rules);

        engine.stop();
    }

    #[test]
    fn test_reset_racing_ingestion_keeps_counts_aligned() {
        let engine = Arc::new(InsightEngine::default());
        let feeder = {
            let engine = engine.clone();
            std::thread::spawn(move || {
                for i in 0..2000u64 {
                    engine.ingest_frame(frame(i * 10, "tap", (i % 7) as f64));
                }
            })
        };
        for _ in 0..50 {
            engine.reset();
            std::thread::yield_now();
        }
        feeder.join().unwrap();

        let stats = engine.stats();
        assert_eq!(
            stats.observations as u64,
            stats.frames_ingested.min(stats.observation_capacity as u64)
        );
    }

    #[test]
    fn test_restart_after_stop() {
        let engine = InsightEngine::new(fast_config());
        engine.start().unwrap();
        engine.stop();
        engine.start().unwrap();
        assert!(engine.is_running());
        engine.stop();
    }

    #[test]
    fn test_reset_keeps_lifecycle() {
        let mut config = fast_config();
        config.scheduler.initial_delay_ms = 60_000;
        let engine = InsightEngine::new(config);
        feed_scoring_loop(&engine, 10);
        engine.analyze_now();
        engine.start().unwrap();

        engine.reset();
        assert!(engine.rules().is_empty());
        assert!(engine.patterns().is_empty());
        assert!(engine.is_running());
        engine.stop();
    }

    #[test]
    fn test_add_rule_validates_condition() {
        let engine = InsightEngine::default();
        let bad = Rule::new(RuleType::Goal, "broken", 0.9).with_condition("state.health <");
        assert!(matches!(engine.add_rule(bad), Err(EngineError::InvalidCondition { .. })));
        assert!(engine.rules().is_empty());

        let good = Rule::new(RuleType::Goal, "heal when hurt", 0.9).with_condition("state.health < 0.5");
        assert!(engine.add_rule(good).unwrap().created);

        let hurt = GameState::new().with("health", 0.2);
        assert_eq!(engine.recommend(&hurt).len(), 1);
        assert!(engine.recommend(&GameState::new().with("health", 0.9)).is_empty());
    }

    #[test]
    fn test_enemy_pattern_event_from_ingestion() {
        let engine = InsightEngine::default();
        let rx = engine.events().subscribe_channel();

        // Zig-zag enemy: right, left, right, left ...
        for i in 0..12u64 {
            let x = if i % 2 == 0 { 0.0 } else { 50.0 };
            let enemy = DetectedElement::new("e1", "enemy", Rect::new(x, 0.0, 10.0, 10.0));
            engine.ingest_frame(CapturedFrame::at(i * 300, vec![enemy], GameState::new()));
        }

        assert!(!engine.enemy_patterns().is_empty());
        assert!(rx
            .try_iter()
            .any(|e| matches!(e, RecognitionEvent::EnemyPatternRecognized { .. })));
    }

    #[test]
    fn test_knowledge_round_trip_between_engines() {
        let source = InsightEngine::default();
        feed_scoring_loop(&source, 10);
        source.analyze_now();
        let snapshot = source.export_knowledge();
        assert!(!snapshot.is_empty());

        let target = InsightEngine::default();
        target.import_knowledge(snapshot.clone());
        assert_eq!(target.rules(), snapshot.rules);
        assert_eq!(target.patterns().len(), snapshot.patterns.len());
    }
}
