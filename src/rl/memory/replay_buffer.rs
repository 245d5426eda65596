//! Replay Buffer
//!
//! Fixed-capacity experience store for off-policy learning.

use rand::seq::index;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::rl::core::DiscreteAction;

/// A single transition in the environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    /// Encoded state before action
    pub state: Vec<f64>,
    pub action: DiscreteAction,
    pub reward: f64,
    /// Encoded state after action
    pub next_state: Vec<f64>,
    /// Whether episode terminated
    pub done: bool,
}

impl Transition {
    /// Create a new transition
    pub fn new(
        state: Vec<f64>,
        action: DiscreteAction,
        reward: f64,
        next_state: Vec<f64>,
        done: bool,
    ) -> Self {
        Self {
            state,
            action,
            reward,
            next_state,
            done,
        }
    }

    /// Terminal transition whose next state is irrelevant to the target
    pub fn terminal(state: Vec<f64>, action: DiscreteAction, reward: f64) -> Self {
        let next_state = state.clone();
        Self::new(state, action, reward, next_state, true)
    }
}

/// Ring buffer for experience storage
///
/// Insertion past capacity evicts the oldest entry. `total_pushed` keeps
/// counting after the buffer fills so stride-based schedules keep firing.
#[derive(Debug)]
pub struct ReplayBuffer {
    /// Storage for transitions
    buffer: VecDeque<Transition>,
    /// Maximum capacity
    capacity: usize,
    total_pushed: u64,
}

impl ReplayBuffer {
    /// Create a new replay buffer with given capacity (at least 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buffer: VecDeque::with_capacity(capacity),
            capacity,
            total_pushed: 0,
        }
    }

    /// Add a transition to the buffer
    pub fn push(&mut self, transition: Transition) {
        if self.buffer.len() >= self.capacity {
            self.buffer.pop_front();
        }
        self.buffer.push_back(transition);
        self.total_pushed += 1;
    }

    /// Sample a uniform random batch without replacement
    pub fn sample<R: Rng + ?Sized>(&self, batch_size: usize, rng: &mut R) -> Vec<Transition> {
        let amount = batch_size.min(self.buffer.len());
        index::sample(rng, self.buffer.len(), amount)
            .into_iter()
            .map(|i| self.buffer[i].clone())
            .collect()
    }

    /// Iterate transitions oldest first
    pub fn iter(&self) -> impl Iterator<Item = &Transition> {
        self.buffer.iter()
    }

    /// Clear all transitions
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Get current number of transitions
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if buffer is empty
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Check if buffer has enough samples for training
    pub fn has_enough_samples(&self, min_samples: usize) -> bool {
        self.buffer.len() >= min_samples
    }

    /// Get buffer capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Transitions ever stored, including evicted ones
    pub fn total_pushed(&self) -> u64 {
        self.total_pushed
    }

    /// Get fill ratio (0.0 to 1.0)
    pub fn fill_ratio(&self) -> f64 {
        self.buffer.len() as f64 / self.capacity as f64
    }
}
