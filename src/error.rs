//! Error types for the insight engine

use thiserror::Error;

/// Errors surfaced by the engine lifecycle and rule registration
///
/// The analysis pipeline itself never fails on missing or malformed data;
/// these cover misuse of the lifecycle and invalid user-authored input.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("background analysis is already running")]
    AlreadyRunning,

    #[error("failed to spawn analysis thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("invalid condition for rule '{rule}': {message}")]
    InvalidCondition { rule: String, message: String },
}

pub type EngineResult<T> = Result<T, EngineError>;
