//! Action-Value Network
//!
//! Plain dense weights mapping an encoded state to one value per discrete
//! action. This is the form the policy reads and the form written to disk;
//! training happens on the tensor model in `q_model` and is exported back
//! here after every update.

use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{GemError, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    #[default]
    Linear,
    Relu,
    Tanh,
}

impl Activation {
    fn apply(self, x: f64) -> f64 {
        match self {
            Self::Linear => x,
            Self::Relu => x.max(0.0),
            Self::Tanh => x.tanh(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseLayer {
    /// Weights shape: [out_dim][in_dim]
    pub weights: Vec<Vec<f64>>,
    /// Bias shape: [out_dim]
    pub bias: Vec<f64>,
    #[serde(default)]
    pub activation: Activation,
}

impl DenseLayer {
    /// He-initialised layer (normal with std sqrt(2 / fan_in)), zero bias
    fn he_init<R: Rng + ?Sized>(in_dim: usize, out_dim: usize, activation: Activation, rng: &mut R) -> Self {
        let std = (2.0 / in_dim.max(1) as f64).sqrt();
        let weights = match Normal::new(0.0, std) {
            Ok(normal) => (0..out_dim)
                .map(|_| (0..in_dim).map(|_| normal.sample(rng)).collect())
                .collect(),
            Err(_) => vec![vec![0.0; in_dim]; out_dim],
        };
        Self {
            weights,
            bias: vec![0.0; out_dim],
            activation,
        }
    }

    pub fn in_dim(&self) -> usize {
        self.weights.first().map(|r| r.len()).unwrap_or(0)
    }

    pub fn out_dim(&self) -> usize {
        self.weights.len()
    }

    fn forward(&self, x: &[f64]) -> Vec<f64> {
        self.weights
            .iter()
            .zip(&self.bias)
            .map(|(row, b)| {
                let sum = row.iter().zip(x).fold(*b, |acc, (w, xi)| acc + w * xi);
                self.activation.apply(sum)
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QNetwork {
    /// Expected input dimension.
    pub input_dim: usize,

    pub layers: Vec<DenseLayer>,

    /// Optional free-form metadata (versioning, training info, etc).
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl QNetwork {
    /// ReLU hidden layers and a linear head
    pub fn new<R: Rng + ?Sized>(input_dim: usize, hidden: &[usize], output_dim: usize, rng: &mut R) -> Self {
        let mut layers = Vec::with_capacity(hidden.len() + 1);
        let mut in_dim = input_dim;
        for &width in hidden {
            layers.push(DenseLayer::he_init(in_dim, width, Activation::Relu, rng));
            in_dim = width;
        }
        layers.push(DenseLayer::he_init(in_dim, output_dim, Activation::Linear, rng));

        Self {
            input_dim,
            layers,
            metadata: serde_json::json!({ "kind": "dqn", "hidden": hidden }),
        }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        let model: Self = serde_json::from_str(&content)?;
        model.validate().map_err(GemError::ShapeMismatch)?;
        Ok(model)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.input_dim == 0 {
            return Err("input_dim must be > 0".to_string());
        }
        if self.layers.is_empty() {
            return Err("layers must not be empty".to_string());
        }

        let mut expected_in = self.input_dim;
        for (idx, layer) in self.layers.iter().enumerate() {
            if layer.out_dim() == 0 {
                return Err(format!("layer[{idx}] out_dim must be > 0"));
            }
            if layer.bias.len() != layer.out_dim() {
                return Err(format!(
                    "layer[{idx}] bias len {} != out_dim {}",
                    layer.bias.len(),
                    layer.out_dim()
                ));
            }
            for (r, row) in layer.weights.iter().enumerate() {
                if row.len() != expected_in {
                    return Err(format!(
                        "layer[{idx}] weights row {r} len {} != expected in_dim {expected_in}",
                        row.len()
                    ));
                }
                if row.iter().any(|v| !v.is_finite()) {
                    return Err(format!("layer[{idx}] weights contain non-finite values"));
                }
            }
            if layer.bias.iter().any(|v| !v.is_finite()) {
                return Err(format!("layer[{idx}] bias contain non-finite values"));
            }
            expected_in = layer.out_dim();
        }
        Ok(())
    }

    pub fn output_dim(&self) -> usize {
        self.layers.last().map(|l| l.out_dim()).unwrap_or(0)
    }

    /// Check that this network can stand in for one built with the given shape
    pub fn expect_shape(&self, input_dim: usize, output_dim: usize) -> Result<()> {
        self.validate().map_err(GemError::ShapeMismatch)?;
        if self.input_dim != input_dim || self.output_dim() != output_dim {
            return Err(GemError::ShapeMismatch(format!(
                "expected {input_dim} -> {output_dim}, got {} -> {}",
                self.input_dim,
                self.output_dim()
            )));
        }
        Ok(())
    }

    pub fn forward(&self, input: &[f64]) -> Result<Vec<f64>> {
        if input.len() != self.input_dim {
            return Err(GemError::ShapeMismatch(format!(
                "QNetwork input dim mismatch: got {}, expected {}",
                input.len(),
                self.input_dim
            )));
        }

        let mut x = input.to_vec();
        for layer in &self.layers {
            x = layer.forward(&x);
        }
        Ok(x)
    }

    /// Largest action value for `input`
    pub fn max_value(&self, input: &[f64]) -> Result<f64> {
        Ok(self
            .forward(input)?
            .into_iter()
            .fold(f64::NEG_INFINITY, f64::max))
    }

    /// `(in_dim, out_dim)` of every layer, input first
    pub fn layer_dims(&self) -> Vec<(usize, usize)> {
        self.layers.iter().map(|l| (l.in_dim(), l.out_dim())).collect()
    }
}

/// Numerically stable softmax
pub fn softmax(values: &[f64]) -> Vec<f64> {
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return vec![1.0 / values.len().max(1) as f64; values.len()];
    }
    let exps: Vec<f64> = values.iter().map(|v| (v - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.iter().map(|e| e / sum).collect()
}

/// Index of the largest value (first one on ties)
pub fn argmax(values: &[f64]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |(bi, bv), (i, v)| if *v > bv { (i, *v) } else { (bi, bv) })
        .0
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn net() -> QNetwork {
        let mut rng = StdRng::seed_from_u64(11);
        QNetwork::new(4, &[8, 6], 3, &mut rng)
    }

    #[test]
    fn shapes_and_validation() {
        let n = net();
        n.validate().unwrap();
        assert_eq!(n.output_dim(), 3);
        assert_eq!(n.forward(&[0.1, 0.2, 0.3, 0.4]).unwrap().len(), 3);
        assert!(n.forward(&[0.1]).is_err());
        assert!(n.expect_shape(4, 3).is_ok());
        assert!(n.expect_shape(10, 3).is_err());
        assert_eq!(n.layer_dims(), vec![(4, 8), (8, 6), (6, 3)]);
    }

    #[test]
    fn he_init_scales_with_fan_in() {
        let mut rng = StdRng::seed_from_u64(3);
        let n = QNetwork::new(200, &[400], 3, &mut rng);
        let weights: Vec<f64> = n.layers[0].weights.iter().flatten().copied().collect();
        let mean = weights.iter().sum::<f64>() / weights.len() as f64;
        let var = weights.iter().map(|w| (w - mean).powi(2)).sum::<f64>() / weights.len() as f64;
        // 2 / fan_in = 0.01
        assert!(mean.abs() < 0.005);
        assert!((var - 0.01).abs() < 0.001, "variance {var}");
        assert!(n.layers[0].bias.iter().all(|b| *b == 0.0));
    }

    #[test]
    fn validates_shapes() {
        let mut bad = net();
        bad.layers[1].weights[0].pop();
        assert!(bad.validate().is_err());

        let mut nan = net();
        nan.layers[0].bias[0] = f64::NAN;
        assert!(nan.validate().is_err());
    }

    #[test]
    fn softmax_and_argmax() {
        let p = softmax(&[1.0, 3.0, 2.0]);
        assert!((p.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert_eq!(argmax(&[1.0, 3.0, 2.0]), 1);
        assert_eq!(argmax(&[2.0, 2.0]), 0);
        let uniform = softmax(&[0.0, 0.0, 0.0, 0.0]);
        assert!(uniform.iter().all(|v| (v - 0.25).abs() < 1e-12));
    }

    #[test]
    fn json_roundtrip_file() {
        let n = net();
        let path = std::env::temp_dir().join(format!("qnet-{}.json", uuid::Uuid::new_v4()));
        n.save_to_file(&path).unwrap();
        let loaded = QNetwork::from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();

        let x = [0.1, 0.2, 0.3, 0.4];
        let a = n.forward(&x).unwrap();
        let b = loaded.forward(&x).unwrap();
        assert!(a.iter().zip(&b).all(|(x, y)| (x - y).abs() < 1e-9));
    }
}
