//! Epsilon-greedy agent over the learned and heuristic policies.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::domain::FeatureSnapshot;
use crate::rl::config::{AgentConfig, PolicyBackend};
use crate::rl::core::{DiscreteAction, NUM_ACTIONS};

use super::{
    DecisionSource, HeuristicPolicy, LearnedPolicy, ParameterStore, Policy, PolicyDecision,
    PolicyMode,
};

/// Exponentially decaying exploration rate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExplorationSchedule {
    epsilon: f64,
    start: f64,
    decay: f64,
    min: f64,
}

impl ExplorationSchedule {
    pub fn new(start: f64, decay: f64, min: f64) -> Self {
        let min = min.clamp(0.0, 1.0);
        let start = start.clamp(min, 1.0);
        Self {
            epsilon: start,
            start,
            decay,
            min,
        }
    }

    pub fn from_config(config: &AgentConfig) -> Self {
        Self::new(config.epsilon_start, config.epsilon_decay, config.epsilon_min)
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    /// `epsilon = max(min, epsilon * decay)`
    pub fn decay(&mut self) -> f64 {
        self.epsilon = (self.epsilon * self.decay).max(self.min);
        self.epsilon
    }

    /// Restore a persisted value; it can never raise epsilon above the start
    pub fn restore(&mut self, epsilon: f64) {
        if epsilon.is_finite() {
            self.epsilon = epsilon.clamp(self.min, self.start);
        }
    }

    /// Back to the starting rate
    pub fn reset(&mut self) {
        self.epsilon = self.start;
    }

    pub fn min(&self) -> f64 {
        self.min
    }
}

/// Chooses actions for the engine
///
/// The backend is fixed at construction. A learned backend answers from the
/// current parameter snapshot once it is trained and falls back to the
/// heuristic until then.
pub struct PolicyAgent {
    backend: PolicyBackend,
    heuristic: HeuristicPolicy,
    store: Arc<ParameterStore>,
    exploration: ExplorationSchedule,
    exploration_confidence: f64,
    rng: StdRng,
}

impl PolicyAgent {
    pub fn new(config: &AgentConfig, store: Arc<ParameterStore>) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            backend: config.backend,
            heuristic: HeuristicPolicy::from_config(config),
            store,
            exploration: ExplorationSchedule::from_config(config),
            exploration_confidence: config.exploration_confidence,
            rng,
        }
    }

    pub fn backend(&self) -> PolicyBackend {
        self.backend
    }

    pub fn mode(&self) -> PolicyMode {
        Self::mode_of(self.backend, &self.store)
    }

    fn mode_of(backend: PolicyBackend, store: &ParameterStore) -> PolicyMode {
        match backend {
            PolicyBackend::Heuristic => PolicyMode::HeuristicOnly,
            PolicyBackend::Learned if store.is_trained() => PolicyMode::Learned,
            PolicyBackend::Learned => PolicyMode::HeuristicFallback,
        }
    }

    /// Epsilon-greedy action selection
    ///
    /// Exploration only applies to the learned backend; the heuristic-only
    /// agent is deterministic.
    pub fn act(&mut self, state: &[f64], features: &FeatureSnapshot) -> PolicyDecision {
        if self.backend == PolicyBackend::Learned && self.rng.gen::<f64>() < self.exploration.epsilon()
        {
            let index = self.rng.gen_range(0..NUM_ACTIONS);
            let action = DiscreteAction::from_index(index).unwrap_or_default();
            debug!(%action, epsilon = self.exploration.epsilon(), "exploring");
            return PolicyDecision::new(action, self.exploration_confidence, DecisionSource::Exploration);
        }
        self.greedy(state, features)
    }

    /// Greedy decision without exploration or mutation
    pub fn greedy(&self, state: &[f64], features: &FeatureSnapshot) -> PolicyDecision {
        greedy_decision(self.backend, &self.store, &self.heuristic, state, features)
    }

    pub fn epsilon(&self) -> f64 {
        self.exploration.epsilon()
    }

    /// Called once per learning step
    pub fn decay_epsilon(&mut self) -> f64 {
        self.exploration.decay()
    }

    pub fn restore_epsilon(&mut self, epsilon: f64) {
        self.exploration.restore(epsilon);
    }

    /// The only operation that raises epsilon
    pub fn reset_exploration(&mut self) {
        self.exploration.reset();
    }

    pub fn exploration(&self) -> &ExplorationSchedule {
        &self.exploration
    }

    pub fn store(&self) -> &Arc<ParameterStore> {
        &self.store
    }

    pub fn heuristic(&self) -> &HeuristicPolicy {
        &self.heuristic
    }
}

/// Greedy decision shared by the agent and lock-free inference
pub fn greedy_decision(
    backend: PolicyBackend,
    store: &ParameterStore,
    heuristic: &HeuristicPolicy,
    state: &[f64],
    features: &FeatureSnapshot,
) -> PolicyDecision {
    if backend == PolicyBackend::Heuristic {
        return heuristic.evaluate(features);
    }

    let learned = LearnedPolicy::new(store.current());
    if !learned.is_ready() {
        return heuristic.evaluate(features);
    }

    match learned.decide(state, features) {
        Ok(decision) => decision,
        Err(e) => {
            warn!(error = %e, "learned policy failed, using heuristic");
            heuristic.evaluate(features)
        }
    }
}
