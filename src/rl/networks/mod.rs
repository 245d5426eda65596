//! Neural Network Architectures
//!
//! Dense action-value weights for inference and persistence, plus the burn
//! model they are trained through when the `rl` feature is enabled.

pub mod q_network;

#[cfg(feature = "rl")]
pub mod q_model;

pub use q_network::{argmax, softmax, Activation, DenseLayer, QNetwork};

#[cfg(feature = "rl")]
pub use q_model::QModel;
