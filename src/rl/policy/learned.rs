//! Learned policy over a versioned parameter snapshot.
//!
//! The learning loop publishes a new immutable [`PolicySnapshot`] after each
//! update and swaps it in behind a short write lock. Readers clone the `Arc`
//! and run inference without holding any lock.

use chrono::{DateTime, Utc};
use std::sync::{Arc, RwLock};

use crate::domain::FeatureSnapshot;
use crate::error::Result;
use crate::rl::core::DiscreteAction;
use crate::rl::networks::{argmax, softmax, QNetwork};

use super::{DecisionSource, Policy, PolicyDecision};

/// Immutable published weights
#[derive(Debug, Clone)]
pub struct PolicySnapshot {
    /// Monotonic, starts at 0 for the initial weights
    pub version: u64,
    pub network: QNetwork,
    /// At least one gradient step ran, or the weights were loaded from disk
    pub trained: bool,
    pub published_at: DateTime<Utc>,
}

/// Holder of the current snapshot
#[derive(Debug)]
pub struct ParameterStore {
    current: RwLock<Arc<PolicySnapshot>>,
}

impl ParameterStore {
    pub fn new(network: QNetwork, trained: bool) -> Self {
        Self {
            current: RwLock::new(Arc::new(PolicySnapshot {
                version: 0,
                network,
                trained,
                published_at: Utc::now(),
            })),
        }
    }

    /// Snapshot in effect right now
    pub fn current(&self) -> Arc<PolicySnapshot> {
        // A poisoned lock still holds a complete snapshot: only whole Arcs are swapped in.
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Swap in new weights; returns the new version
    pub fn publish(&self, network: QNetwork, trained: bool) -> u64 {
        let mut guard = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let version = guard.version + 1;
        *guard = Arc::new(PolicySnapshot {
            version,
            network,
            trained,
            published_at: Utc::now(),
        });
        version
    }

    pub fn version(&self) -> u64 {
        self.current().version
    }

    pub fn is_trained(&self) -> bool {
        self.current().trained
    }
}

/// Greedy policy over one snapshot's value estimates
#[derive(Debug, Clone)]
pub struct LearnedPolicy {
    snapshot: Arc<PolicySnapshot>,
}

impl LearnedPolicy {
    pub fn new(snapshot: Arc<PolicySnapshot>) -> Self {
        Self { snapshot }
    }

    pub fn version(&self) -> u64 {
        self.snapshot.version
    }
}

impl Policy for LearnedPolicy {
    fn name(&self) -> &'static str {
        "learned"
    }

    fn is_ready(&self) -> bool {
        self.snapshot.trained
    }

    /// Argmax action; confidence is that action's softmax share
    fn decide(&self, state: &[f64], _features: &FeatureSnapshot) -> Result<PolicyDecision> {
        let q = self.snapshot.network.forward(state)?;
        let best = argmax(&q);
        let probs = softmax(&q);
        let confidence = probs.get(best).copied().unwrap_or(0.0);
        let action = DiscreteAction::from_index(best).unwrap_or_default();

        Ok(PolicyDecision {
            action,
            confidence: if confidence.is_finite() { confidence } else { 0.0 },
            source: DecisionSource::Learned,
            q_values: Some(q),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rl::core::NUM_ACTIONS;
    use crate::rl::networks::DenseLayer;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn fixed_network(bias: [f64; 3]) -> QNetwork {
        QNetwork {
            input_dim: 2,
            layers: vec![DenseLayer {
                weights: vec![vec![0.0, 0.0]; 3],
                bias: bias.to_vec(),
                activation: Default::default(),
            }],
            metadata: serde_json::json!({}),
        }
    }

    #[test]
    fn greedy_action_with_softmax_confidence() {
        let store = ParameterStore::new(fixed_network([0.0, 2.0, 1.0]), true);
        let policy = LearnedPolicy::new(store.current());
        let d = policy
            .decide(&[0.0, 0.0], &FeatureSnapshot::empty("X", Utc::now()))
            .unwrap();

        assert_eq!(d.action, DiscreteAction::Buy);
        let expected = 2f64.exp() / (1.0 + 2f64.exp() + 1f64.exp());
        assert!((d.confidence - expected).abs() < 1e-12);
        assert_eq!(d.q_values.as_ref().map(Vec::len), Some(NUM_ACTIONS));
    }

    #[test]
    fn publish_bumps_version_and_keeps_old_readers_valid() {
        let mut rng = StdRng::seed_from_u64(9);
        let store = ParameterStore::new(QNetwork::new(2, &[4], 3, &mut rng), false);
        let old = store.current();
        assert!(!store.is_trained());

        let v = store.publish(fixed_network([1.0, 0.0, 0.0]), true);
        assert_eq!(v, 1);
        assert_eq!(store.version(), 1);
        assert!(store.is_trained());
        assert_eq!(old.version, 0);
        assert!(old.network.forward(&[0.0, 0.0]).is_ok());
    }

    #[test]
    fn shape_mismatch_is_an_error() {
        let store = ParameterStore::new(fixed_network([0.0; 3]), true);
        let policy = LearnedPolicy::new(store.current());
        assert!(policy
            .decide(&[0.0; 5], &FeatureSnapshot::empty("X", Utc::now()))
            .is_err());
    }
}
