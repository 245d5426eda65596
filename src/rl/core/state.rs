//! State Representation
//!
//! Account state of the simulated environment and its encoding into the
//! fixed-width vector the value network consumes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::FeatureSnapshot;

/// Total number of features in the encoded state
pub const STATE_DIM: usize = 10;

/// Number of environment-derived features at the head of the vector
pub const ENV_FEATURES: usize = 4;

/// Normalizers for the environment part of the vector
const BALANCE_SCALE: f64 = 10_000.0;
const POSITION_SCALE: f64 = 10.0;
const STEP_SCALE: f64 = 1_000.0;

/// An open position in one symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub quantity: f64,
    /// Quantity-weighted average entry
    pub entry_price: f64,
    /// Date of the first buy; preserved across merges
    pub entry_date: DateTime<Utc>,
}

impl Position {
    pub fn new(symbol: impl Into<String>, quantity: f64, entry_price: f64, entry_date: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.into(),
            quantity,
            entry_price,
            entry_date,
        }
    }

    /// Cost basis of the position
    pub fn cost(&self) -> f64 {
        self.quantity * self.entry_price
    }

    /// Fold an additional fill into this position
    pub fn merge(&mut self, quantity: f64, price: f64) {
        let total = self.quantity + quantity;
        if total > 0.0 {
            self.entry_price = (self.cost() + quantity * price) / total;
            self.quantity = total;
        }
    }

    /// Whole days held as of `now`, never negative
    pub fn holding_days(&self, now: DateTime<Utc>) -> i64 {
        (now - self.entry_date).num_days().max(0)
    }
}

/// Account state of one simulated episode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentState {
    pub balance: f64,
    /// Ordered so snapshots compare and serialize deterministically
    pub positions: BTreeMap<String, Position>,
    pub step_count: u64,
    pub initial_balance: f64,
}

impl EnvironmentState {
    pub fn new(initial_balance: f64) -> Self {
        Self {
            balance: initial_balance,
            positions: BTreeMap::new(),
            step_count: 0,
            initial_balance,
        }
    }

    /// Balance plus open positions marked at cost basis
    pub fn portfolio_value(&self) -> f64 {
        self.balance + self.positions.values().map(Position::cost).sum::<f64>()
    }

    pub fn cash_ratio(&self) -> f64 {
        if self.initial_balance > 0.0 {
            self.balance / self.initial_balance
        } else {
            0.0
        }
    }

    /// Total return in percent of the initial balance
    pub fn total_return_percent(&self) -> f64 {
        if self.initial_balance > 0.0 {
            (self.portfolio_value() - self.initial_balance) / self.initial_balance * 100.0
        } else {
            0.0
        }
    }

    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }
}

/// Trait for encoding state into the network input
pub trait StateEncoder: Send + Sync {
    /// Encode environment state plus features to a vector of `dim()` values
    fn encode(&self, state: &EnvironmentState, features: &FeatureSnapshot) -> Vec<f64>;

    /// Get feature dimension
    fn dim(&self) -> usize;
}

/// Default encoder: four normalized account fields followed by six signals
#[derive(Debug, Clone, Copy, Default)]
pub struct GemStateEncoder;

impl GemStateEncoder {
    pub fn new() -> Self {
        Self
    }
}

impl StateEncoder for GemStateEncoder {
    fn encode(&self, state: &EnvironmentState, features: &FeatureSnapshot) -> Vec<f64> {
        let raw = [
            // Account
            state.balance / BALANCE_SCALE,
            state.positions.len() as f64 / POSITION_SCALE,
            state.cash_ratio(),
            state.step_count as f64 / STEP_SCALE,
            // Signals
            features.gem_fraction(),
            features.fear_opportunity_score,
            features.volume_surge_anomaly,
            features.whale_accumulation_score,
            features.ecosystem_beta_score,
            features.asymmetric_payoff_score,
        ];

        raw.iter()
            .map(|v| if v.is_finite() { *v } else { 0.0 })
            .collect()
    }

    fn dim(&self) -> usize {
        STATE_DIM
    }
}
