//! Action Space
//!
//! Discrete trading actions and the concrete order the environment executes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::FeatureSnapshot;

/// Number of discrete actions
pub const NUM_ACTIONS: usize = 3;

/// Discrete action space
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum DiscreteAction {
    /// Do nothing
    #[default]
    Hold = 0,
    /// Open or add to a position
    Buy = 1,
    /// Close the whole position
    Sell = 2,
}

impl DiscreteAction {
    /// Convert from action index
    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Self::Hold),
            1 => Some(Self::Buy),
            2 => Some(Self::Sell),
            _ => None,
        }
    }

    /// Convert to action index
    pub fn to_index(self) -> usize {
        self as usize
    }

    /// Get all possible actions
    pub fn all() -> &'static [DiscreteAction] {
        &[Self::Hold, Self::Buy, Self::Sell]
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Hold => "Hold",
            Self::Buy => "Buy",
            Self::Sell => "Sell",
        }
    }
}

impl std::fmt::Display for DiscreteAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A fully specified action submitted to the environment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingAction {
    pub kind: DiscreteAction,
    /// Conviction in [0, 1]
    pub confidence: f64,
    pub symbol: String,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
    /// Gem score (0-100) at decision time
    pub gem_score: f64,
    pub features: FeatureSnapshot,
}

impl TradingAction {
    /// Build an action from a policy decision on a snapshot; confidence is
    /// clamped to [0, 1].
    pub fn new(kind: DiscreteAction, confidence: f64, price: f64, features: FeatureSnapshot) -> Self {
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            kind,
            confidence,
            symbol: features.symbol.clone(),
            price,
            timestamp: features.timestamp,
            gem_score: features.gem_score,
            features,
        }
    }

    /// Override the execution time (snapshots carry their own by default)
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn has_valid_price(&self) -> bool {
        self.price.is_finite() && self.price > 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_roundtrip() {
        for action in DiscreteAction::all() {
            assert_eq!(DiscreteAction::from_index(action.to_index()), Some(*action));
        }
        assert_eq!(DiscreteAction::from_index(3), None);
    }

    #[test]
    fn confidence_is_clamped() {
        let snap = FeatureSnapshot::empty("BTC", Utc::now());
        let action = TradingAction::new(DiscreteAction::Buy, 1.7, 100.0, snap.clone());
        assert_eq!(action.confidence, 1.0);

        let action = TradingAction::new(DiscreteAction::Buy, f64::NAN, 100.0, snap);
        assert_eq!(action.confidence, 0.0);
    }

    #[test]
    fn invalid_prices_detected() {
        let snap = FeatureSnapshot::empty("BTC", Utc::now());
        assert!(!TradingAction::new(DiscreteAction::Buy, 0.5, 0.0, snap.clone()).has_valid_price());
        assert!(!TradingAction::new(DiscreteAction::Buy, 0.5, f64::NAN, snap.clone()).has_valid_price());
        assert!(TradingAction::new(DiscreteAction::Buy, 0.5, 1.0, snap).has_valid_price());
    }
}
