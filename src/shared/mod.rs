//! Shared data types
//!
//! Tagged values, the game-state map and the recognition events passed
//! between frame ingestion, the periodic analyzer and subscribers.

pub mod messages;
pub mod state;
pub mod value;

pub use messages::RecognitionEvent;
pub use state::{keys, GameState};
pub use value::{Rect, Value, ValueMap};
