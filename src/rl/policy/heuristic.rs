//! Heuristic policy: a fixed rule over three signals, used whenever no trained
//! value function is available.

use crate::domain::FeatureSnapshot;
use crate::error::Result;
use crate::rl::config::AgentConfig;
use crate::rl::core::DiscreteAction;

use super::{DecisionSource, Policy, PolicyDecision};

const HOLD_CONFIDENCE: f64 = 0.5;

#[derive(Debug, Clone)]
pub struct HeuristicPolicy {
    buy_threshold: f64,
    sell_threshold: f64,
}

impl Default for HeuristicPolicy {
    fn default() -> Self {
        Self::from_config(&AgentConfig::default())
    }
}

impl HeuristicPolicy {
    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            buy_threshold: config.heuristic_buy_threshold,
            sell_threshold: config.heuristic_sell_threshold,
        }
    }

    /// Mean of normalized gem score, fear opportunity and volume surge
    pub fn buy_score(features: &FeatureSnapshot) -> f64 {
        (features.gem_fraction() + features.fear_opportunity_score + features.volume_surge_anomaly)
            / 3.0
    }

    pub fn evaluate(&self, features: &FeatureSnapshot) -> PolicyDecision {
        let score = Self::buy_score(features);
        let (action, confidence) = if score > self.buy_threshold {
            (DiscreteAction::Buy, score)
        } else if score < self.sell_threshold {
            (DiscreteAction::Sell, 1.0 - score)
        } else {
            (DiscreteAction::Hold, HOLD_CONFIDENCE)
        };
        PolicyDecision::new(action, confidence.clamp(0.0, 1.0), DecisionSource::Heuristic)
    }
}

impl Policy for HeuristicPolicy {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    fn is_ready(&self) -> bool {
        true
    }

    fn decide(&self, _state: &[f64], features: &FeatureSnapshot) -> Result<PolicyDecision> {
        Ok(self.evaluate(features))
    }
}
