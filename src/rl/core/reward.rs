//! Reward Functions
//!
//! The reward model shared by simulated closes and real trade outcomes.

use serde::{Deserialize, Serialize};

// Re-export config
pub use crate::rl::config::RewardConfig;

/// Confidence used when a close carries no conviction (no bonus either way).
pub const NEUTRAL_CONFIDENCE: f64 = 0.5;

/// Reward components of a closed position
///
/// Keeping the pieces separate makes it obvious which term drives behavior.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RewardSignal {
    /// `tanh(pl / pnl_scale)`
    pub pnl_reward: f64,
    /// Multiplier in [time_factor_floor, 1]
    pub time_factor: f64,
    /// Bonus for conviction that matched the outcome
    pub confidence_bonus: f64,
    /// Clipped total
    pub total: f64,
}

/// A closed position as seen by the reward function
#[derive(Debug, Clone, Copy)]
pub struct CloseTransition {
    pub profit_loss_percent: f64,
    pub holding_days: i64,
    pub confidence: f64,
}

/// Trait for computing close rewards
pub trait RewardFunction: Send + Sync {
    fn compute(&self, close: &CloseTransition) -> RewardSignal;
}

/// Profit/loss reward with holding-time decay and a confidence bonus
#[derive(Debug, Clone, Default)]
pub struct CloseRewardFunction {
    config: RewardConfig,
}

impl CloseRewardFunction {
    /// Create with default config
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with custom config
    pub fn with_config(config: RewardConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RewardConfig {
        &self.config
    }

    /// Total reward for a close
    pub fn reward(&self, profit_loss_percent: f64, holding_days: i64, confidence: f64) -> f64 {
        self.compute(&CloseTransition {
            profit_loss_percent,
            holding_days,
            confidence,
        })
        .total
    }

    /// Immediate reward for an accepted BUY
    pub fn buy_reward(&self, confidence: f64, gem_score: f64) -> f64 {
        confidence * (gem_score / 100.0) * self.config.buy_reward_scale
    }

    /// Reward for holding through a setup of the given quality
    pub fn hold_reward(&self, gem_score: f64) -> f64 {
        let c = &self.config;
        if gem_score < c.hold_weak_threshold {
            c.hold_weak_reward
        } else if gem_score > c.hold_strong_threshold {
            c.hold_strong_penalty
        } else {
            c.hold_idle_penalty
        }
    }

    fn time_factor(&self, holding_days: i64) -> f64 {
        let c = &self.config;
        let days = holding_days.max(0) as f64;
        (1.0 - (days / c.holding_horizon_days) * c.holding_decay).max(c.time_factor_floor)
    }
}

impl RewardFunction for CloseRewardFunction {
    fn compute(&self, close: &CloseTransition) -> RewardSignal {
        let c = &self.config;

        if !close.profit_loss_percent.is_finite() {
            return RewardSignal::default();
        }

        let pnl_reward = (close.profit_loss_percent / c.pnl_scale).tanh();
        let time_factor = self.time_factor(close.holding_days);

        let confidence_bonus =
            if close.profit_loss_percent > 0.0 && close.confidence > c.high_confidence_threshold {
                c.high_confidence_bonus
            } else if close.profit_loss_percent < 0.0
                && close.confidence < c.low_confidence_threshold
            {
                c.low_confidence_bonus
            } else {
                0.0
            };

        let total = (pnl_reward * time_factor + confidence_bonus).clamp(-c.reward_clip, c.reward_clip);

        RewardSignal {
            pnl_reward,
            time_factor,
            confidence_bonus,
            total,
        }
    }
}

/// Profit or loss of a full close, in percent of cost basis
pub fn profit_loss_percent(entry_price: f64, exit_price: f64) -> f64 {
    (exit_price - entry_price) / entry_price * 100.0
}
