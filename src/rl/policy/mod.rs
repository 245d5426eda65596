//! Policy Agent
//!
//! Two interchangeable strategies behind one [`Policy`] interface: a learned
//! action-value function and a deterministic heuristic. [`PolicyAgent`] adds
//! epsilon-greedy exploration on top and decides which one answers.

pub mod agent;
pub mod heuristic;
pub mod learned;

use serde::{Deserialize, Serialize};

use crate::domain::FeatureSnapshot;
use crate::error::Result;
use crate::rl::core::DiscreteAction;

pub use agent::{greedy_decision, ExplorationSchedule, PolicyAgent};
pub use heuristic::HeuristicPolicy;
pub use learned::{LearnedPolicy, ParameterStore, PolicySnapshot};

/// Which strategy produced a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    /// Greedy action from the value network
    Learned,
    /// Uniform random action (epsilon branch)
    Exploration,
    Heuristic,
}

/// Observable operating mode of the agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyMode {
    /// Learned backend with trained weights
    Learned,
    /// Learned backend, but no trained weights yet
    HeuristicFallback,
    /// Built without a trainable backend; learning is disabled
    HeuristicOnly,
}

impl PolicyMode {
    pub fn is_heuristic(&self) -> bool {
        !matches!(self, PolicyMode::Learned)
    }
}

impl std::fmt::Display for PolicyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            PolicyMode::Learned => "learned",
            PolicyMode::HeuristicFallback => "heuristic_fallback",
            PolicyMode::HeuristicOnly => "heuristic_only",
        })
    }
}

/// An action with the policy's conviction in it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyDecision {
    pub action: DiscreteAction,
    /// In [0, 1]
    pub confidence: f64,
    pub source: DecisionSource,
    /// Raw action values when the network was consulted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub q_values: Option<Vec<f64>>,
}

impl PolicyDecision {
    pub fn new(action: DiscreteAction, confidence: f64, source: DecisionSource) -> Self {
        Self {
            action,
            confidence,
            source,
            q_values: None,
        }
    }
}

/// A strategy mapping (encoded state, features) to an action
pub trait Policy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether the policy can answer meaningfully right now
    fn is_ready(&self) -> bool;

    fn decide(&self, state: &[f64], features: &FeatureSnapshot) -> Result<PolicyDecision>;
}
