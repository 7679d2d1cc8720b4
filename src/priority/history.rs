//! Per-action success and feedback statistics

use serde::{Deserialize, Serialize};

/// Initial satisfaction of an action without feedback
pub const NEUTRAL_SATISFACTION: f64 = 0.5;

/// Outcomes recorded for one action key
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionSuccessRecord {
    pub attempts: u32,
    pub successes: u32,
    /// Exponentially smoothed reward
    pub avg_reward: f64,
    /// Exponentially smoothed execution time
    pub avg_exec_time_ms: f64,
}

impl ActionSuccessRecord {
    /// Add one outcome; the first sets the averages, later ones blend 90/10
    pub fn record(&mut self, success: bool, reward: f64, exec_time_ms: f64) {
        let first = self.attempts == 0;
        self.attempts = self.attempts.saturating_add(1);
        if success {
            self.successes = self.successes.saturating_add(1);
        }

        let reward = if reward.is_finite() { reward } else { 0.0 };
        let exec_time_ms = if exec_time_ms.is_finite() { exec_time_ms.max(0.0) } else { 0.0 };
        if first {
            self.avg_reward = reward;
            self.avg_exec_time_ms = exec_time_ms;
        } else {
            self.avg_reward = 0.9 * self.avg_reward + 0.1 * reward;
            self.avg_exec_time_ms = 0.9 * self.avg_exec_time_ms + 0.1 * exec_time_ms;
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.attempts == 0 {
            0.0
        } else {
            self.successes as f64 / self.attempts as f64
        }
    }
}

/// User feedback recorded for one action key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserFeedbackRecord {
    pub positive: u32,
    pub negative: u32,
    /// 0.0 - 1.0, starts neutral
    pub satisfaction: f64,
}

impl Default for UserFeedbackRecord {
    fn default() -> Self {
        Self {
            positive: 0,
            negative: 0,
            satisfaction: NEUTRAL_SATISFACTION,
        }
    }
}

impl UserFeedbackRecord {
    /// Move satisfaction by `|delta|` up for positive feedback, down otherwise
    pub fn record(&mut self, positive: bool, delta: f64) {
        let delta = if delta.is_finite() { delta.abs() } else { 0.0 };
        if positive {
            self.positive = self.positive.saturating_add(1);
            self.satisfaction += delta;
        } else {
            self.negative = self.negative.saturating_add(1);
            self.satisfaction -= delta;
        }
        self.satisfaction = self.satisfaction.clamp(0.0, 1.0);
    }
}
