//! game-insight - Replay recorded frames through the insight engine
//!
//! Reads detected frames from a JSON-lines recording, runs pattern mining
//! and rule inference over them and prints what was learned.

use anyhow::Result;
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use game_insight::capture::{FrameSource, ReplaySource};
use game_insight::config::{self, AppConfig};
use game_insight::shared::RecognitionEvent;
use game_insight::storage;
use game_insight::InsightEngine;

/// game-insight - Learn game rules from recorded gameplay
#[derive(Parser, Debug)]
#[command(name = "game-insight")]
#[command(about = "Mines gameplay patterns and rules from recorded detector output")]
struct Args {
    /// Configuration file (defaults to config.toml in the config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Game profile with seed rules
    #[arg(short, long)]
    profile: Option<PathBuf>,

    /// Recorded frames, one JSON object per line
    #[arg(short, long)]
    frames: PathBuf,

    /// Run an analysis pass every N frames (0 = only at the end)
    #[arg(long, default_value = "0")]
    analyze_every: usize,

    /// Write learned knowledge to this JSON file
    #[arg(long)]
    export: Option<PathBuf>,

    /// Previously exported knowledge to start from
    #[arg(long)]
    import: Option<PathBuf>,

    /// Game type for game-specific weights (rpg, shooter, puzzle, ...)
    #[arg(long)]
    game_type: Option<String>,
}

fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();
    info!("game-insight starting...");

    let config = match &args.config {
        Some(path) => config::load_config(path)?,
        None => load_or_default_config(),
    };

    let engine = InsightEngine::new(config);
    engine.events().subscribe(log_event);

    if let Some(path) = &args.import {
        engine.import_knowledge(storage::load_knowledge(path)?);
    }

    if let Some(path) = &args.profile {
        let profile = storage::load_profile(path)?;
        engine.load_profile(&profile)?;
    }

    if args.game_type.is_some() {
        engine.set_game_type(args.game_type.clone());
    }

    replay(&engine, &args.frames, args.analyze_every)?;
    print_summary(&engine);

    if let Some(path) = &args.export {
        storage::save_knowledge(&engine.export_knowledge(), path)?;
        info!("Knowledge written to {:?}", path);
    }

    info!("game-insight finished");
    Ok(())
}

/// Load configuration from the config directory, or use defaults
fn load_or_default_config() -> AppConfig {
    if let Ok(config_dir) = storage::get_config_dir() {
        let config_path = config_dir.join("config.toml");
        if config_path.exists() {
            match config::load_config(&config_path) {
                Ok(config) => {
                    info!("Loaded configuration from {:?}", config_path);
                    return config;
                }
                Err(e) => warn!("Ignoring configuration: {:#}", e),
            }
        }
    }
    info!("Using default configuration");
    AppConfig::default()
}

fn replay(engine: &InsightEngine, path: &Path, analyze_every: usize) -> Result<()> {
    let mut source = ReplaySource::open(path)?;
    let mut frames = 0usize;

    while let Some(frame) = source.next_frame() {
        engine.ingest_frame(frame);
        frames += 1;
        if analyze_every > 0 && frames % analyze_every == 0 {
            engine.analyze_now();
        }
    }
    engine.analyze_now();

    info!("Replayed {} frames ({} skipped)", frames, source.skipped());
    Ok(())
}

fn log_event(event: &RecognitionEvent) {
    match event {
        RecognitionEvent::RuleInferred {
            rule_type,
            description,
            confidence,
            ..
        } => info!("Rule [{}] {} ({:.2})", rule_type, description, confidence),
        RecognitionEvent::EnemyPatternRecognized {
            entity_type,
            detection_count,
            counter_strategy,
            ..
        } if *detection_count == 1 => info!("Enemy pattern for {}: {}", entity_type, counter_strategy),
        _ => {}
    }
}

fn print_summary(engine: &InsightEngine) {
    let stats = engine.stats();
    println!(
        "Observations: {}/{}  Patterns: {}  Enemy patterns: {}  Rules: {}  Causal links: {}",
        stats.observations,
        stats.observation_capacity,
        stats.patterns,
        stats.enemy_patterns,
        stats.rules,
        stats.causal_relationships
    );

    let mut rules = engine.rules();
    rules.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    for rule in &rules {
        println!(
            "  [{:.2}] {:<12} {} (x{})",
            rule.confidence, rule.rule_type, rule.description, rule.observation_count
        );
    }

    let recommendations = engine.recommend(&engine.current_state());
    if !recommendations.is_empty() {
        println!("Recommended:");
        for rec in recommendations.iter().take(5) {
            println!(
                "  {:.2}  {} {}",
                rec.final_priority,
                rec.action.action_type,
                rec.action.target_name().unwrap_or("")
            );
        }
    }
}
