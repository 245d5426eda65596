//! RL Algorithms
//!
//! Implementations of reinforcement learning algorithms. The burn-backed
//! learners are compiled with the `rl` feature; without it the engine runs
//! on the heuristic policy only.

#[cfg(feature = "rl")]
pub mod dqn;

#[cfg(feature = "rl")]
pub use dqn::{adam_learner, DqnLearner, TrainBackend};

use crate::error::Result;
use crate::rl::config::TrainingConfig;
use crate::rl::memory::Transition;
use crate::rl::networks::QNetwork;

/// Statistics from one gradient step
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DqnUpdate {
    /// Mean squared TD error before the step
    pub loss: f64,
    pub batch_size: usize,
}

/// A value learner the training loop can drive
pub trait ValueLearner: Send {
    /// One gradient step on `batch`
    fn train_batch(&mut self, batch: &[Transition]) -> Result<DqnUpdate>;

    /// Copy live parameters into the target network
    fn sync_target(&mut self);

    /// Live weights as last exported
    fn live(&self) -> &QNetwork;

    /// Frozen bootstrap weights
    fn target(&self) -> &QNetwork;

    /// Gradient steps taken since construction
    fn updates(&self) -> u64;
}

/// Learner for the configured training settings, starting from `network`
#[cfg(feature = "rl")]
pub fn build_learner(network: QNetwork, config: &TrainingConfig) -> Result<Box<dyn ValueLearner>> {
    Ok(Box::new(adam_learner(network, config)?))
}

#[cfg(not(feature = "rl"))]
pub fn build_learner(_network: QNetwork, _config: &TrainingConfig) -> Result<Box<dyn ValueLearner>> {
    Err(crate::error::GemError::Validation(
        "learned backend needs the `rl` feature".to_string(),
    ))
}
