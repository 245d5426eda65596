//! Learning Loop
//!
//! Stores transitions and runs the DQN update schedule: a gradient step every
//! `learn_stride` stored experiences once the buffer is past warm-up, and a
//! target sync every `target_sync_interval` stored experiences.

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info, warn};

use crate::rl::algorithms::{build_learner, DqnUpdate, ValueLearner};
use crate::rl::config::{AgentConfig, PolicyBackend, TrainingConfig};
use crate::rl::core::{NUM_ACTIONS, STATE_DIM};
use crate::rl::memory::{ReplayBuffer, Transition};
use crate::rl::networks::QNetwork;
use crate::rl::policy::PolicyAgent;

/// Training statistics
#[derive(Debug, Clone, Default)]
pub struct TrainingStats {
    /// Gradient steps taken
    pub updates: u64,
    pub target_syncs: u64,
    pub last_loss: Option<f64>,
}

/// What happened to one stored transition
#[derive(Debug, Clone, PartialEq)]
pub enum LearnReport {
    /// No trainable backend, or learning switched off
    Disabled,
    /// Stored, no gradient step on this insertion
    Stored { total_stored: u64, target_synced: bool },
    /// Stored and a gradient step ran
    Trained {
        total_stored: u64,
        update: DqnUpdate,
        version: u64,
        epsilon: f64,
        target_synced: bool,
    },
}

/// Experience store plus learner
pub struct LearningLoop {
    config: TrainingConfig,
    buffer: ReplayBuffer,
    learner: Option<Box<dyn ValueLearner>>,
    stats: TrainingStats,
    rng: StdRng,
}

impl LearningLoop {
    /// A learner exists only for the learned backend
    pub fn new(config: TrainingConfig, agent: &AgentConfig, initial: Option<QNetwork>) -> Self {
        let rng = match agent.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(1)),
            None => StdRng::from_entropy(),
        };

        let learner = match agent.backend {
            PolicyBackend::Learned => {
                let network = initial.unwrap_or_else(|| {
                    let mut init_rng = match agent.seed {
                        Some(seed) => StdRng::seed_from_u64(seed),
                        None => StdRng::from_entropy(),
                    };
                    QNetwork::new(STATE_DIM, &agent.hidden_layers, NUM_ACTIONS, &mut init_rng)
                });
                match build_learner(network, &config) {
                    Ok(learner) => Some(learner),
                    Err(e) => {
                        warn!(error = %e, "no trainable backend, running on the heuristic");
                        None
                    }
                }
            }
            PolicyBackend::Heuristic => {
                info!("heuristic backend selected, learning loop disabled");
                None
            }
        };

        if learner.is_some() && !config.learning_enabled {
            info!("learning disabled by configuration, weights stay frozen");
        }

        Self {
            buffer: ReplayBuffer::new(config.buffer_capacity),
            config,
            learner,
            stats: TrainingStats::default(),
            rng,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.learner.is_some() && self.config.learning_enabled
    }

    /// Store a transition and advance the schedule
    pub fn remember(&mut self, transition: Transition, agent: &mut PolicyAgent) -> LearnReport {
        if !self.is_enabled() {
            return LearnReport::Disabled;
        }
        let Some(learner) = self.learner.as_mut() else {
            return LearnReport::Disabled;
        };

        self.buffer.push(transition);
        let total = self.buffer.total_pushed();

        let mut trained = None;
        if self.buffer.len() > self.config.warmup
            && self.config.learn_stride > 0
            && total % self.config.learn_stride == 0
        {
            let batch = self.buffer.sample(self.config.batch_size, &mut self.rng);
            match learner.train_batch(&batch) {
                Ok(update) => {
                    let version = agent.store().publish(learner.live().clone(), true);
                    let epsilon = agent.decay_epsilon();
                    self.stats.updates += 1;
                    self.stats.last_loss = Some(update.loss);
                    debug!(version, epsilon, loss = update.loss, "policy updated");
                    trained = Some((update, version, epsilon));
                }
                Err(e) => warn!(error = %e, "learning step failed"),
            }
        }

        let target_synced = self.config.target_sync_interval > 0
            && total % self.config.target_sync_interval == 0;
        if target_synced {
            learner.sync_target();
            self.stats.target_syncs += 1;
            debug!(total, "target network synced");
        }

        match trained {
            Some((update, version, epsilon)) => LearnReport::Trained {
                total_stored: total,
                update,
                version,
                epsilon,
                target_synced,
            },
            None => LearnReport::Stored {
                total_stored: total,
                target_synced,
            },
        }
    }

    /// Replace live and target weights with loaded ones and publish them
    ///
    /// Returns whether the weights are now in effect.
    pub fn install_network(&mut self, network: QNetwork, agent: &PolicyAgent) -> bool {
        if agent.backend() == PolicyBackend::Heuristic {
            warn!("ignoring network weights, heuristic backend selected");
            return false;
        }
        match build_learner(network.clone(), &self.config) {
            Ok(learner) => self.learner = Some(learner),
            Err(e) => {
                warn!(error = %e, "loaded weights not trainable, heuristic fallback");
                return false;
            }
        }
        let version = agent.store().publish(network, true);
        info!(version, "loaded network weights");
        true
    }

    /// Live weights, if there is a learned backend
    pub fn network(&self) -> Option<&QNetwork> {
        self.learner.as_deref().map(|learner| learner.live())
    }

    pub fn learner(&self) -> Option<&dyn ValueLearner> {
        self.learner.as_deref()
    }

    pub fn buffer(&self) -> &ReplayBuffer {
        &self.buffer
    }

    pub fn stats(&self) -> &TrainingStats {
        &self.stats
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rl::core::DiscreteAction;
    use crate::rl::policy::{ParameterStore, PolicyMode};
    use std::sync::Arc;

    fn setup(backend: PolicyBackend) -> (LearningLoop, PolicyAgent) {
        let agent_cfg = AgentConfig {
            backend,
            hidden_layers: vec![16, 8],
            seed: Some(3),
            ..Default::default()
        };
        let lp = LearningLoop::new(TrainingConfig::default(), &agent_cfg, None);
        let network = lp
            .network()
            .cloned()
            .unwrap_or_else(|| QNetwork::new(STATE_DIM, &[4], 3, &mut StdRng::seed_from_u64(0)));
        let store = Arc::new(ParameterStore::new(network, false));
        (lp, PolicyAgent::new(&agent_cfg, store))
    }

    fn transition(i: usize) -> Transition {
        let s = vec![i as f64 / 1000.0; STATE_DIM];
        Transition::new(s.clone(), DiscreteAction::from_index(i % 3).unwrap_or_default(), 0.1, s, false)
    }

    #[test]
    #[cfg(feature = "rl")]
    fn schedule_follows_total_stored() {
        let (mut lp, mut agent) = setup(PolicyBackend::Learned);
        let mut trained_at = Vec::new();
        let mut synced_at = Vec::new();

        for i in 1..=300 {
            match lp.remember(transition(i), &mut agent) {
                LearnReport::Trained { total_stored, target_synced, .. } => {
                    trained_at.push(total_stored);
                    if target_synced {
                        synced_at.push(total_stored);
                    }
                }
                LearnReport::Stored { total_stored, target_synced } => {
                    if target_synced {
                        synced_at.push(total_stored);
                    }
                }
                LearnReport::Disabled => panic!("learning should be enabled"),
            }
        }

        // len > 100 first holds at 101, first multiple of 10 after that is 110
        assert_eq!(trained_at.first(), Some(&110));
        assert_eq!(trained_at.len(), 20);
        assert_eq!(synced_at, vec![100, 200, 300]);
        assert_eq!(lp.stats().updates, 20);
        assert!((agent.epsilon() - 0.995f64.powi(20)).abs() < 1e-9);
        assert_eq!(agent.mode(), PolicyMode::Learned);
        assert_eq!(agent.store().version(), 20);
    }

    #[test]
    #[cfg(feature = "rl")]
    fn schedule_keeps_running_when_buffer_full() {
        let agent_cfg = AgentConfig {
            hidden_layers: vec![8],
            seed: Some(4),
            ..Default::default()
        };
        let cfg = TrainingConfig {
            buffer_capacity: 20,
            warmup: 5,
            ..Default::default()
        };
        let mut lp = LearningLoop::new(cfg, &agent_cfg, None);
        let store = Arc::new(ParameterStore::new(lp.network().cloned().unwrap(), false));
        let mut agent = PolicyAgent::new(&agent_cfg, store);

        for i in 1..=100 {
            lp.remember(transition(i), &mut agent);
        }
        assert_eq!(lp.buffer().len(), 20);
        assert_eq!(lp.stats().updates, 10);
    }

    #[test]
    #[cfg(not(feature = "rl"))]
    fn learned_backend_without_feature_falls_back() {
        let (mut lp, mut agent) = setup(PolicyBackend::Learned);
        assert!(!lp.is_enabled());
        assert!(lp.network().is_none());
        assert_eq!(lp.remember(transition(1), &mut agent), LearnReport::Disabled);
        assert_eq!(agent.mode(), PolicyMode::HeuristicFallback);
    }

    #[test]
    fn heuristic_backend_is_noop() {
        let (mut lp, mut agent) = setup(PolicyBackend::Heuristic);
        assert!(!lp.is_enabled());
        for i in 0..200 {
            assert_eq!(lp.remember(transition(i), &mut agent), LearnReport::Disabled);
        }
        assert!(lp.buffer().is_empty());
        assert_eq!(agent.epsilon(), 1.0);
        assert_eq!(agent.mode(), PolicyMode::HeuristicOnly);
    }

    #[test]
    #[cfg(feature = "rl")]
    fn install_network_publishes_trained_weights() {
        let (mut lp, agent) = setup(PolicyBackend::Learned);
        let net = QNetwork::new(STATE_DIM, &[16, 8], 3, &mut StdRng::seed_from_u64(99));
        assert!(lp.install_network(net.clone(), &agent));

        assert_eq!(agent.mode(), PolicyMode::Learned);
        assert_eq!(lp.network(), Some(&net));
        assert_eq!(lp.learner().map(|l| l.target()), Some(&net));
    }
}
