//! game-insight - Gameplay pattern mining and action prioritization
//!
//! Observes a stream of detected game frames, mines recurring patterns,
//! infers rules about the game's mechanics and ranks candidate next actions.

pub mod analysis;
pub mod app;
pub mod capture;
pub mod config;
pub mod error;
pub mod priority;
pub mod shared;
pub mod storage;

pub use app::{AnalysisReport, EngineStats, InsightEngine};
pub use config::AppConfig;
pub use error::{EngineError, EngineResult};
