//! Deep Q-Learning
//!
//! One-step DQN with a periodically synced target network. The live model is
//! a burn module trained with Adam on minibatches; the target is a frozen
//! dense snapshot that only produces bootstrap values.

use burn::backend::Autodiff;
use burn::grad_clipping::GradientClippingConfig;
use burn::nn::loss::{MseLoss, Reduction};
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::{ElementConversion, TensorData};
use burn_ndarray::{NdArray, NdArrayDevice};
use tracing::{debug, warn};

use crate::error::{GemError, Result};
use crate::rl::config::TrainingConfig;
use crate::rl::core::NUM_ACTIONS;
use crate::rl::memory::Transition;
use crate::rl::networks::{QModel, QNetwork};

use super::{DqnUpdate, ValueLearner};

/// CPU autodiff backend used for training
pub type TrainBackend = Autodiff<NdArray>;

/// Live model, optimizer state and the frozen target
pub struct DqnLearner<O> {
    model: QModel<TrainBackend>,
    optimizer: O,
    device: NdArrayDevice,
    /// Dense export of `model` after the last step
    live: QNetwork,
    target: QNetwork,
    gamma: f64,
    learning_rate: f64,
    updates: u64,
}

/// DQN learner using Adam with global-norm gradient clipping
pub fn adam_learner(
    network: QNetwork,
    config: &TrainingConfig,
) -> Result<DqnLearner<impl Optimizer<QModel<TrainBackend>, TrainBackend>>> {
    let clipping = (config.max_grad_norm > 0.0)
        .then(|| GradientClippingConfig::Norm(config.max_grad_norm as f32));
    let optimizer = AdamConfig::new()
        .with_grad_clipping(clipping)
        .init::<TrainBackend, QModel<TrainBackend>>();
    DqnLearner::with_optimizer(network, optimizer, config)
}

impl<O> DqnLearner<O>
where
    O: Optimizer<QModel<TrainBackend>, TrainBackend>,
{
    /// Start from existing weights; the target is a copy of them
    pub fn with_optimizer(network: QNetwork, optimizer: O, config: &TrainingConfig) -> Result<Self> {
        let device = NdArrayDevice::Cpu;
        let model = QModel::from_network(&network, &device)?;
        Ok(Self {
            model,
            optimizer,
            device,
            target: network.clone(),
            live: network,
            gamma: config.gamma,
            learning_rate: config.learning_rate,
            updates: 0,
        })
    }

    /// One gradient step on `batch` minimizing MSE against the DQN target
    ///
    /// `target = r + gamma * max_a Q_target(s', a) * (1 - done)`
    pub fn train_batch(&mut self, batch: &[Transition]) -> Result<DqnUpdate> {
        if batch.is_empty() {
            return Err(GemError::Validation("empty training batch".into()));
        }

        let input_dim = self.live.input_dim;
        let n = batch.len();
        let mut states = Vec::with_capacity(n * input_dim);
        let mut mask = vec![0.0f32; n * NUM_ACTIONS];
        let mut targets = Vec::with_capacity(n);

        for (row, t) in batch.iter().enumerate() {
            if t.state.len() != input_dim {
                return Err(GemError::ShapeMismatch(format!(
                    "transition state dim {}, expected {input_dim}",
                    t.state.len()
                )));
            }
            let bootstrap = if t.done {
                0.0
            } else {
                self.target.max_value(&t.next_state)?
            };
            states.extend(t.state.iter().map(|v| *v as f32));
            mask[row * NUM_ACTIONS + t.action.to_index()] = 1.0;
            targets.push((t.reward + self.gamma * bootstrap) as f32);
        }

        let states = Tensor::<TrainBackend, 2>::from_data(TensorData::new(states, [n, input_dim]), &self.device);
        let mask = Tensor::<TrainBackend, 2>::from_data(TensorData::new(mask, [n, NUM_ACTIONS]), &self.device);
        let targets = Tensor::<TrainBackend, 2>::from_data(TensorData::new(targets, [n, 1]), &self.device);

        let chosen = (self.model.forward(states) * mask).sum_dim(1);
        let loss = MseLoss::new().forward(chosen, targets, Reduction::Mean);
        let loss_value: f64 = loss.clone().into_scalar().elem();

        if !loss_value.is_finite() {
            warn!(loss = loss_value, "non-finite loss, skipping update");
            return Err(GemError::Internal("non-finite loss".into()));
        }

        let grads = GradientsParams::from_grads(loss.backward(), &self.model);
        self.model = self
            .optimizer
            .step(self.learning_rate, self.model.clone(), grads);
        self.live = self.model.to_network(self.live.metadata.clone());
        self.updates += 1;

        debug!(loss = loss_value, batch = n, updates = self.updates, "dqn update");

        Ok(DqnUpdate {
            loss: loss_value,
            batch_size: n,
        })
    }

    pub fn q_values(&self, state: &[f64]) -> Result<Vec<f64>> {
        self.live.forward(state)
    }
}

impl<O> ValueLearner for DqnLearner<O>
where
    O: Optimizer<QModel<TrainBackend>, TrainBackend>,
{
    fn train_batch(&mut self, batch: &[Transition]) -> Result<DqnUpdate> {
        DqnLearner::train_batch(self, batch)
    }

    fn sync_target(&mut self) {
        self.target.clone_from(&self.live);
    }

    fn live(&self) -> &QNetwork {
        &self.live
    }

    fn target(&self) -> &QNetwork {
        &self.target
    }

    fn updates(&self) -> u64 {
        self.updates
    }
}
