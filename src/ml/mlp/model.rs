use ndarray::{Array1, Array2, ArrayView1};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::ml::softmax;

/// Fully connected layer, `out x in` weights.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dense {
    pub weights: Array2<f64>,
    pub bias: Array1<f64>,
}

impl Dense {
    /// Uniform Glorot initialization.
    pub fn random<R: Rng + ?Sized>(inputs: usize, outputs: usize, rng: &mut R) -> Self {
        let limit = (6.0 / (inputs + outputs).max(1) as f64).sqrt();
        let weights =
            Array2::from_shape_fn((outputs, inputs), |_| (rng.random::<f64>() * 2.0 - 1.0) * limit);
        Self {
            weights,
            bias: Array1::zeros(outputs),
        }
    }

    pub fn inputs(&self) -> usize {
        self.weights.ncols()
    }

    pub fn outputs(&self) -> usize {
        self.weights.nrows()
    }

    pub fn forward(&self, input: ArrayView1<f64>) -> Array1<f64> {
        self.weights.dot(&input) + &self.bias
    }

    pub fn is_finite(&self) -> bool {
        self.weights.iter().chain(self.bias.iter()).all(|v| v.is_finite())
    }
}

/// Trained network: ReLU hidden layers followed by a softmax output layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MlpModel {
    pub classes: Vec<String>,
    pub layers: Vec<Dense>,
}

impl MlpModel {
    pub fn validate(&self) -> Result<(), String> {
        let Some(last) = self.layers.last() else {
            return Err("network has no layers".to_string());
        };
        if last.outputs() != self.classes.len() {
            return Err(format!(
                "output layer has {} units for {} classes",
                last.outputs(),
                self.classes.len()
            ));
        }
        for pair in self.layers.windows(2) {
            if pair[0].outputs() != pair[1].inputs() {
                return Err("layer widths do not line up".to_string());
            }
        }
        for layer in &self.layers {
            if layer.bias.len() != layer.outputs() {
                return Err("bias length mismatch".to_string());
            }
        }
        Ok(())
    }

    pub fn feature_len(&self) -> usize {
        self.layers.first().map(Dense::inputs).unwrap_or(0)
    }

    pub fn predict_proba_row(&self, features: ArrayView1<f64>) -> Array1<f64> {
        forward(&self.layers, features)
    }

    /// False once any weight or bias is NaN or infinite.
    pub fn is_finite(&self) -> bool {
        self.layers.iter().all(Dense::is_finite)
    }
}

/// Run `features` through the layers, returning class probabilities.
pub(super) fn forward(layers: &[Dense], features: ArrayView1<f64>) -> Array1<f64> {
    let Some((output, hidden)) = layers.split_last() else {
        return Array1::zeros(0);
    };
    let mut activation = features.to_owned();
    for layer in hidden {
        activation = layer.forward(activation.view()).mapv(|v| v.max(0.0));
    }
    softmax(output.forward(activation.view()).view())
}
