//! Analysis Layer
//!
//! Observation history, pattern mining, entity tracking, rule inference and
//! causal tracking. Everything here is process-local and driven either by
//! frame ingestion or by the periodic analysis tick.

pub mod causal;
pub mod conditions;
pub mod entities;
pub mod events;
pub mod observation;
pub mod patterns;
pub mod rules;

pub use causal::{CausalRelationship, CausalTracker};
pub use conditions::ConditionEngine;
pub use entities::{EnemyPattern, EntityTracker};
pub use events::{EventBus, SubscriptionId};
pub use observation::{Observation, ObservationStore, TrackingSnapshot};
pub use patterns::{Pattern, PatternKind, PatternMiner, PatternStep};
pub use rules::{Rule, RuleEngine, RuleType};

use sha2::{Digest, Sha256};

/// Stable identifier derived from the given parts
///
/// Parts are separated so that `["ab", "c"]` and `["a", "bc"]` differ.
pub fn content_id(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0x1f]);
    }
    let digest = hasher.finalize();
    digest[..8].iter().map(|b| format!("{:02x}", b)).collect()
}
