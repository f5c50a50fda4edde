//! Multi-layer perceptron classifier with ReLU hidden layers.

mod model;
mod train;

use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

pub use model::{Dense, MlpModel};

use super::optimizer::Optimizer;
use super::{TrainError, argmax};

/// Hyperparameters for [`MultilayerPerceptron`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MlpParams {
    /// Width of each hidden layer, input side first.
    pub hidden_layers: Vec<usize>,
    pub batch_size: usize,
    pub optimizer: Optimizer,
    pub l2_penalty: f64,
    /// Probability of zeroing a hidden activation during training.
    pub dropout: f64,
    pub epochs: usize,
    pub min_change: f64,
    pub window: usize,
    /// Share of the training rows held out to score each epoch.
    pub holdout: f64,
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for MlpParams {
    fn default() -> Self {
        Self {
            hidden_layers: vec![100, 100],
            batch_size: 128,
            optimizer: Optimizer::adam(0.001),
            l2_penalty: 1e-4,
            dropout: 0.0,
            epochs: 1000,
            min_change: 1e-4,
            window: 5,
            holdout: 0.1,
            seed: None,
        }
    }
}

impl MlpParams {
    pub fn validate(&self) -> Result<(), TrainError> {
        if self.hidden_layers.contains(&0) {
            return Err(TrainError::InvalidParameter(
                "hidden layers must have at least one neuron".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(TrainError::InvalidParameter(
                "batch_size must be > 0".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(TrainError::InvalidParameter(
                "dropout must be in [0, 1)".to_string(),
            ));
        }
        if !(0.0..0.5).contains(&self.holdout) {
            return Err(TrainError::InvalidParameter(
                "holdout must be in [0, 0.5)".to_string(),
            ));
        }
        if !self.l2_penalty.is_finite() || self.l2_penalty < 0.0 {
            return Err(TrainError::InvalidParameter(
                "l2_penalty must be >= 0".to_string(),
            ));
        }
        self.optimizer.validate().map_err(TrainError::InvalidParameter)
    }
}

/// Neural network classifier with loss and holdout score histories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultilayerPerceptron {
    pub params: MlpParams,
    #[serde(default)]
    model: Option<MlpModel>,
    #[serde(default)]
    losses: Vec<f64>,
    #[serde(default)]
    scores: Vec<f64>,
}

impl MultilayerPerceptron {
    pub fn new(params: MlpParams) -> Self {
        Self {
            params,
            model: None,
            losses: Vec::new(),
            scores: Vec::new(),
        }
    }

    pub fn trained(&self) -> bool {
        self.model.is_some()
    }

    pub fn model(&self) -> Option<&MlpModel> {
        self.model.as_ref()
    }

    pub fn steps(&self) -> &[f64] {
        &self.losses
    }

    /// Holdout accuracy per epoch, parallel to [`Self::steps`].
    pub fn scores(&self) -> &[f64] {
        &self.scores
    }

    pub fn train(&mut self, x: &Array2<f64>, labels: &[String]) -> Result<(), TrainError> {
        let outcome = train::train_mlp(x, labels, &self.params)?;
        self.model = Some(outcome.model);
        self.losses = outcome.losses;
        self.scores = outcome.scores;
        Ok(())
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Vec<String>, TrainError> {
        let model = self.model.as_ref().ok_or(TrainError::Untrained)?;
        if x.ncols() != model.feature_len() {
            return Err(TrainError::DimensionMismatch {
                expected: model.feature_len(),
                found: x.ncols(),
            });
        }
        Ok(x.axis_iter(Axis(0))
            .map(|row| model.classes[argmax(model.predict_proba_row(row).view())].clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn xor_like() -> (Array2<f64>, Vec<String>) {
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for i in 0..40 {
            let jitter = (i as f64) * 0.005;
            let (a, b) = match i % 4 {
                0 => (1.0, 1.0),
                1 => (-1.0, -1.0),
                2 => (1.0, -1.0),
                _ => (-1.0, 1.0),
            };
            rows.extend([a + jitter, b - jitter]);
            labels.push(if a * b > 0.0 { "SAME" } else { "DIFF" }.to_string());
        }
        (Array2::from_shape_vec((40, 2), rows).unwrap(), labels)
    }

    #[test]
    fn learns_a_non_linear_boundary() {
        let (x, labels) = xor_like();
        let mut mlp = MultilayerPerceptron::new(MlpParams {
            hidden_layers: vec![16, 8],
            batch_size: 8,
            optimizer: Optimizer::adam(0.05),
            epochs: 300,
            min_change: 0.0,
            window: 300,
            holdout: 0.0,
            seed: Some(11),
            ..MlpParams::default()
        });
        mlp.train(&x, &labels).unwrap();

        let predictions = mlp.predict(&x).unwrap();
        let correct = predictions
            .iter()
            .zip(&labels)
            .filter(|(p, l)| p == l)
            .count();
        assert!(correct >= 36, "only {correct}/40 correct");
        assert_eq!(mlp.steps().len(), mlp.scores().len());
    }

    #[test]
    fn zero_width_layer_is_rejected() {
        let (x, labels) = xor_like();
        let mut mlp = MultilayerPerceptron::new(MlpParams {
            hidden_layers: vec![4, 0],
            ..MlpParams::default()
        });
        assert!(matches!(
            mlp.train(&x, &labels),
            Err(TrainError::InvalidParameter(_))
        ));
    }

    #[test]
    fn single_class_is_rejected() {
        let x = Array2::zeros((3, 2));
        let labels = vec!["WALKING".to_string(); 3];
        let mut mlp = MultilayerPerceptron::new(MlpParams::default());
        assert!(matches!(
            mlp.train(&x, &labels),
            Err(TrainError::TooFewClasses(1))
        ));
    }

    #[test]
    fn diverging_network_is_an_error() {
        let x = Array2::from_shape_fn((20, 2), |(i, _)| if i % 2 == 0 { 1e308 } else { -1e308 });
        let labels: Vec<String> = (0..20)
            .map(|i| if (i / 2) % 2 == 0 { "UP" } else { "DOWN" }.to_string())
            .collect();
        let mut mlp = MultilayerPerceptron::new(MlpParams {
            hidden_layers: vec![4],
            optimizer: Optimizer::Stochastic { rate: 1e300 },
            epochs: 5,
            holdout: 0.0,
            seed: Some(7),
            ..MlpParams::default()
        });
        assert!(matches!(
            mlp.train(&x, &labels),
            Err(TrainError::NonFinite { .. })
        ));
        assert!(!mlp.trained());
    }
}
