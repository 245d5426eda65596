//! Trainable Action-Value Model
//!
//! Burn module mirroring a [`QNetwork`]: ReLU hidden layers and a linear
//! head. Weights move in and out through [`QModel::from_network`] and
//! [`QModel::to_network`], so the published and persisted form stays the
//! plain dense snapshot.

use burn::module::Param;
use burn::nn::{Linear, Relu};
use burn::prelude::*;
use burn::tensor::TensorData;

use crate::error::{GemError, Result};

use super::q_network::{Activation, DenseLayer, QNetwork};

/// Dense Q-value model
#[derive(Module, Debug)]
pub struct QModel<B: Backend> {
    layers: Vec<Linear<B>>,
    activation: Relu,
}

impl<B: Backend> QModel<B> {
    /// Load dense weights; hidden layers must be ReLU and the head linear
    pub fn from_network(network: &QNetwork, device: &B::Device) -> Result<Self> {
        network.validate().map_err(GemError::ShapeMismatch)?;

        let last = network.layers.len() - 1;
        let mut layers = Vec::with_capacity(network.layers.len());
        for (idx, layer) in network.layers.iter().enumerate() {
            let expected = if idx == last {
                Activation::Linear
            } else {
                Activation::Relu
            };
            if layer.activation != expected {
                return Err(GemError::ShapeMismatch(format!(
                    "layer[{idx}] activation {:?} is not trainable here, expected {expected:?}",
                    layer.activation
                )));
            }
            layers.push(linear_from_dense(layer, device));
        }

        Ok(Self {
            layers,
            activation: Relu::new(),
        })
    }

    /// Export the current weights as a dense snapshot
    pub fn to_network(&self, metadata: serde_json::Value) -> QNetwork {
        let last = self.layers.len().saturating_sub(1);
        let layers: Vec<DenseLayer> = self
            .layers
            .iter()
            .enumerate()
            .map(|(idx, linear)| {
                let activation = if idx == last {
                    Activation::Linear
                } else {
                    Activation::Relu
                };
                dense_from_linear(linear, activation)
            })
            .collect();

        QNetwork {
            input_dim: layers.first().map(DenseLayer::in_dim).unwrap_or(0),
            layers,
            metadata,
        }
    }

    /// Q-values, shape `[batch, actions]`
    pub fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        let last = self.layers.len().saturating_sub(1);
        let mut x = input;
        for (idx, layer) in self.layers.iter().enumerate() {
            x = layer.forward(x);
            if idx < last {
                x = self.activation.forward(x);
            }
        }
        x
    }
}

/// Burn stores the weight as `[d_input, d_output]`, the dense form as `[out][in]`
fn linear_from_dense<B: Backend>(layer: &DenseLayer, device: &B::Device) -> Linear<B> {
    let (in_dim, out_dim) = (layer.in_dim(), layer.out_dim());
    let mut weight = vec![0.0f32; in_dim * out_dim];
    for (o, row) in layer.weights.iter().enumerate() {
        for (i, w) in row.iter().enumerate() {
            weight[i * out_dim + o] = *w as f32;
        }
    }
    let bias: Vec<f32> = layer.bias.iter().map(|b| *b as f32).collect();

    Linear {
        weight: Param::from_tensor(Tensor::from_data(
            TensorData::new(weight, [in_dim, out_dim]),
            device,
        )),
        bias: Some(Param::from_tensor(Tensor::from_data(
            TensorData::new(bias, [out_dim]),
            device,
        ))),
    }
}

fn dense_from_linear<B: Backend>(linear: &Linear<B>, activation: Activation) -> DenseLayer {
    let weight = linear.weight.val();
    let [in_dim, out_dim] = weight.dims();
    let flat: Vec<f64> = weight.into_data().iter::<f32>().map(f64::from).collect();

    let weights = (0..out_dim)
        .map(|o| (0..in_dim).map(|i| flat[i * out_dim + o]).collect())
        .collect();
    let bias = match &linear.bias {
        Some(bias) => bias.val().into_data().iter::<f32>().map(f64::from).collect(),
        None => vec![0.0; out_dim],
    };

    DenseLayer {
        weights,
        bias,
        activation,
    }
}
