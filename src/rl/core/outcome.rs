//! Trade Outcomes
//!
//! A closed position, simulated or real, scored with the shared close reward.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::reward::{profit_loss_percent, CloseTransition, RewardFunction};

/// Where a closed trade came from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeSource {
    #[default]
    Simulated,
    Real,
}

/// A fully closed position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeOutcome {
    pub id: Uuid,
    pub symbol: String,
    pub entry_price: f64,
    pub exit_price: f64,
    pub holding_days: i64,
    pub profit_loss_percent: f64,
    pub reward: f64,
    /// `profit_loss_percent > 0`
    pub success: bool,
    #[serde(default)]
    pub source: OutcomeSource,
    pub closed_at: DateTime<Utc>,
}

impl TradeOutcome {
    /// Score a close with the given reward function
    #[allow(clippy::too_many_arguments)]
    pub fn close<R: RewardFunction + ?Sized>(
        reward_fn: &R,
        symbol: impl Into<String>,
        entry_price: f64,
        exit_price: f64,
        holding_days: i64,
        confidence: f64,
        source: OutcomeSource,
        closed_at: DateTime<Utc>,
    ) -> Self {
        let holding_days = holding_days.max(0);
        let pl = profit_loss_percent(entry_price, exit_price);
        let signal = reward_fn.compute(&CloseTransition {
            profit_loss_percent: pl,
            holding_days,
            confidence,
        });

        Self {
            id: Uuid::new_v4(),
            symbol: symbol.into(),
            entry_price,
            exit_price,
            holding_days,
            profit_loss_percent: pl,
            reward: signal.total,
            success: pl > 0.0,
            source,
            closed_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rl::core::reward::CloseRewardFunction;

    #[test]
    fn close_scores_with_shared_reward() {
        let f = CloseRewardFunction::new();
        let outcome = TradeOutcome::close(
            &f,
            "BTC",
            50_000.0,
            55_000.0,
            10,
            0.8,
            OutcomeSource::Simulated,
            Utc::now(),
        );

        assert!((outcome.profit_loss_percent - 10.0).abs() < 1e-9);
        assert!((outcome.reward - 0.3946).abs() < 1e-3);
        assert!(outcome.success);
    }

    #[test]
    fn flat_trade_is_not_a_success() {
        let f = CloseRewardFunction::new();
        let outcome = TradeOutcome::close(&f, "ETH", 10.0, 10.0, 0, 0.5, OutcomeSource::Real, Utc::now());
        assert!(!outcome.success);
        assert_eq!(outcome.reward, 0.0);
    }
}
