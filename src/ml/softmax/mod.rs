//! Multinomial logistic regression (softmax) classifier.

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use super::optimizer::Optimizer;
use super::{TrainError, argmax, softmax};

mod train;

/// Hyperparameters for [`SoftmaxClassifier`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoftmaxParams {
    pub batch_size: usize,
    pub optimizer: Optimizer,
    /// L2 penalty applied to the weights.
    pub l2_penalty: f64,
    /// Maximum number of epochs.
    pub epochs: usize,
    /// Stop once the loss changes by less than this between epochs.
    pub min_change: f64,
    /// Stop after this many epochs without a new best loss.
    pub window: usize,
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for SoftmaxParams {
    fn default() -> Self {
        Self {
            batch_size: 256,
            optimizer: Optimizer::momentum(0.001),
            l2_penalty: 1e-4,
            epochs: 1000,
            min_change: 1e-4,
            window: 5,
            seed: None,
        }
    }
}

impl SoftmaxParams {
    pub fn validate(&self) -> Result<(), TrainError> {
        if self.batch_size == 0 {
            return Err(TrainError::InvalidParameter(
                "batch_size must be > 0".to_string(),
            ));
        }
        if !self.l2_penalty.is_finite() || self.l2_penalty < 0.0 {
            return Err(TrainError::InvalidParameter(
                "l2_penalty must be >= 0".to_string(),
            ));
        }
        if self.min_change < 0.0 {
            return Err(TrainError::InvalidParameter(
                "min_change must be >= 0".to_string(),
            ));
        }
        self.optimizer.validate().map_err(TrainError::InvalidParameter)
    }
}

/// Fitted weights for a softmax classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoftmaxModel {
    pub classes: Vec<String>,
    /// `K x D` weight matrix.
    pub weights: Array2<f64>,
    pub bias: Array1<f64>,
}

impl SoftmaxModel {
    pub fn feature_len(&self) -> usize {
        self.weights.ncols()
    }

    pub fn is_finite(&self) -> bool {
        self.weights.iter().chain(self.bias.iter()).all(|v| v.is_finite())
    }
}

/// Softmax classifier with its training history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoftmaxClassifier {
    pub params: SoftmaxParams,
    #[serde(default)]
    model: Option<SoftmaxModel>,
    #[serde(default)]
    losses: Vec<f64>,
}

impl SoftmaxClassifier {
    pub fn new(params: SoftmaxParams) -> Self {
        Self {
            params,
            model: None,
            losses: Vec::new(),
        }
    }

    pub fn trained(&self) -> bool {
        self.model.is_some()
    }

    pub fn model(&self) -> Option<&SoftmaxModel> {
        self.model.as_ref()
    }

    /// Mean cross-entropy loss for each completed epoch.
    pub fn steps(&self) -> &[f64] {
        &self.losses
    }

    /// Train from scratch on `x` (rows are samples).
    pub fn train(&mut self, x: &Array2<f64>, labels: &[String]) -> Result<(), TrainError> {
        let (model, losses) = train::train_softmax(x, labels, &self.params)?;
        self.model = Some(model);
        self.losses = losses;
        Ok(())
    }

    /// `N x K` class probabilities.
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>, TrainError> {
        let model = self.model.as_ref().ok_or(TrainError::Untrained)?;
        if x.ncols() != model.feature_len() {
            return Err(TrainError::DimensionMismatch {
                expected: model.feature_len(),
                found: x.ncols(),
            });
        }
        let mut logits = x.dot(&model.weights.t());
        for mut row in logits.axis_iter_mut(Axis(0)) {
            row += &model.bias;
            let probs = softmax(row.view());
            row.assign(&probs);
        }
        Ok(logits)
    }

    /// Most likely class label for each row.
    pub fn predict(&self, x: &Array2<f64>) -> Result<Vec<String>, TrainError> {
        let model = self.model.as_ref().ok_or(TrainError::Untrained)?;
        let proba = self.predict_proba(x)?;
        Ok(proba
            .axis_iter(Axis(0))
            .map(|row| model.classes[argmax(row)].clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn two_blobs() -> (Array2<f64>, Vec<String>) {
        let x = array![
            [-2.0, -1.5],
            [-1.8, -2.2],
            [-2.5, -1.9],
            [-1.6, -1.7],
            [2.1, 1.8],
            [1.7, 2.4],
            [2.3, 2.0],
            [1.9, 1.6],
        ];
        let labels = ["SITTING", "WALKING"]
            .iter()
            .flat_map(|label| std::iter::repeat_n(label.to_string(), 4))
            .collect();
        (x, labels)
    }

    #[test]
    fn predicting_before_training_fails() {
        let classifier = SoftmaxClassifier::new(SoftmaxParams::default());
        assert!(matches!(
            classifier.predict(&array![[0.0, 0.0]]),
            Err(TrainError::Untrained)
        ));
    }

    #[test]
    fn separates_two_blobs() {
        let (x, labels) = two_blobs();
        let mut classifier = SoftmaxClassifier::new(SoftmaxParams {
            batch_size: 4,
            optimizer: Optimizer::Stochastic { rate: 0.5 },
            epochs: 200,
            min_change: 0.0,
            window: 200,
            seed: Some(1),
            ..SoftmaxParams::default()
        });
        classifier.train(&x, &labels).unwrap();
        assert_eq!(classifier.predict(&x).unwrap(), labels);

        let steps = classifier.steps();
        assert!(!steps.is_empty());
        assert!(steps.last().unwrap() < steps.first().unwrap());

        let proba = classifier.predict_proba(&x).unwrap();
        for row in proba.axis_iter(Axis(0)) {
            assert!((row.sum() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn wrong_width_is_rejected() {
        let (x, labels) = two_blobs();
        let mut classifier = SoftmaxClassifier::new(SoftmaxParams {
            epochs: 2,
            seed: Some(3),
            ..SoftmaxParams::default()
        });
        classifier.train(&x, &labels).unwrap();
        assert!(matches!(
            classifier.predict(&array![[1.0, 2.0, 3.0]]),
            Err(TrainError::DimensionMismatch {
                expected: 2,
                found: 3
            })
        ));
    }

    #[test]
    fn exploding_step_size_fails_instead_of_returning_nan_weights() {
        let x = Array2::from_shape_fn((20, 2), |(i, _)| if i % 2 == 0 { 1e308 } else { -1e308 });
        let labels: Vec<String> = (0..20)
            .map(|i| if (i / 2) % 2 == 0 { "UP" } else { "DOWN" }.to_string())
            .collect();
        let mut classifier = SoftmaxClassifier::new(SoftmaxParams {
            optimizer: Optimizer::Stochastic { rate: 1e300 },
            epochs: 5,
            seed: Some(7),
            ..SoftmaxParams::default()
        });
        assert!(matches!(
            classifier.train(&x, &labels),
            Err(TrainError::NonFinite { epoch: 1 })
        ));
        assert!(!classifier.trained());
        assert!(matches!(
            classifier.predict(&x),
            Err(TrainError::Untrained)
        ));
    }
}
