//! Pipelines: ordered transformers feeding a single estimator.
//!
//! Transformers are fitted and applied in order during training. At
//! prediction time the same fitted transformers run in the same order and
//! the estimator is never refitted.

mod transformers;

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

pub use transformers::{Transformer, apply};

use crate::dataset::{DatasetError, Feature, Labeled, samples_to_matrix};
use crate::ml::TrainError;
use crate::ml::embed::EmbedError;
use crate::ml::mlp::{MlpModel, MlpParams, MultilayerPerceptron};
use crate::ml::softmax::{SoftmaxClassifier, SoftmaxModel, SoftmaxParams};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Dataset(#[from] DatasetError),
    #[error(transparent)]
    Train(#[from] TrainError),
    #[error(transparent)]
    Embed(#[from] EmbedError),
    #[error("{0} has not been fitted")]
    Unfitted(&'static str),
    #[error("expected {expected} features, found {found}")]
    DimensionMismatch { expected: usize, found: usize },
    #[error("cannot fit on an empty dataset")]
    EmptyDataset,
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Terminal classifier of a pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Estimator {
    Softmax(SoftmaxClassifier),
    Mlp(MultilayerPerceptron),
}

impl Estimator {
    pub fn softmax(params: SoftmaxParams) -> Self {
        Estimator::Softmax(SoftmaxClassifier::new(params))
    }

    pub fn mlp(params: MlpParams) -> Self {
        Estimator::Mlp(MultilayerPerceptron::new(params))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Estimator::Softmax(_) => "softmax classifier",
            Estimator::Mlp(_) => "multilayer perceptron",
        }
    }

    pub fn trained(&self) -> bool {
        match self {
            Estimator::Softmax(inner) => inner.trained(),
            Estimator::Mlp(inner) => inner.trained(),
        }
    }

    pub fn train(&mut self, x: &Array2<f64>, labels: &[String]) -> Result<(), TrainError> {
        match self {
            Estimator::Softmax(inner) => inner.train(x, labels),
            Estimator::Mlp(inner) => inner.train(x, labels),
        }
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Vec<String>, TrainError> {
        match self {
            Estimator::Softmax(inner) => inner.predict(x),
            Estimator::Mlp(inner) => inner.predict(x),
        }
    }

    /// Loss per training epoch.
    pub fn steps(&self) -> &[f64] {
        match self {
            Estimator::Softmax(inner) => inner.steps(),
            Estimator::Mlp(inner) => inner.steps(),
        }
    }

    /// Validation score per epoch, for estimators that track one.
    pub fn scores(&self) -> Option<&[f64]> {
        match self {
            Estimator::Softmax(_) => None,
            Estimator::Mlp(inner) => Some(inner.scores()),
        }
    }

    /// True unless a trained model holds a NaN or infinite parameter.
    pub fn is_finite(&self) -> bool {
        match self {
            Estimator::Softmax(inner) => inner.model().is_none_or(SoftmaxModel::is_finite),
            Estimator::Mlp(inner) => inner.model().is_none_or(MlpModel::is_finite),
        }
    }
}

/// Ordered transformers followed by one estimator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    transformers: Vec<Transformer>,
    estimator: Estimator,
}

impl Pipeline {
    pub fn new(transformers: Vec<Transformer>, estimator: Estimator) -> Self {
        Self {
            transformers,
            estimator,
        }
    }

    pub fn trained(&self) -> bool {
        self.estimator.trained() && self.transformers.iter().all(Transformer::fitted)
    }

    /// Whether every fitted stage can be written out and read back.
    pub fn is_finite(&self) -> bool {
        self.estimator.is_finite() && self.transformers.iter().all(Transformer::is_finite)
    }

    #[cfg(test)]
    pub(crate) fn transformers_mut(&mut self) -> &mut [Transformer] {
        &mut self.transformers
    }

    /// Fit every transformer in order, then train the estimator.
    pub fn train(&mut self, dataset: &Labeled) -> Result<(), PipelineError> {
        if dataset.is_empty() {
            return Err(PipelineError::EmptyDataset);
        }
        let mut samples = dataset.samples().to_vec();
        for transformer in &mut self.transformers {
            info!(stage = transformer.name(), "Fitting transformer");
            transformer.fit(&samples)?;
            samples = transformer.transform(samples)?;
        }
        let x = samples_to_matrix(&samples)?;
        info!(
            estimator = self.estimator.name(),
            samples = x.nrows(),
            features = x.ncols(),
            "Training estimator"
        );
        self.estimator.train(&x, dataset.labels())?;
        Ok(())
    }

    /// Predict a label for every row without changing any fitted state.
    pub fn predict(&self, dataset: &Labeled) -> Result<Vec<String>, PipelineError> {
        let x = self.preprocess(dataset.samples().to_vec())?;
        Ok(self.estimator.predict(&x)?)
    }

    pub fn steps(&self) -> &[f64] {
        self.estimator.steps()
    }

    pub fn scores(&self) -> Option<&[f64]> {
        self.estimator.scores()
    }

    fn preprocess(&self, mut samples: Vec<Vec<Feature>>) -> Result<Array2<f64>, PipelineError> {
        for transformer in &self.transformers {
            samples = transformer.transform(samples)?;
        }
        Ok(samples_to_matrix(&samples)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::optimizer::Optimizer;

    fn blobs() -> Labeled {
        let mut samples = Vec::new();
        let mut labels = Vec::new();
        for i in 0..20 {
            let offset = if i % 2 == 0 { -3.0 } else { 3.0 };
            let wobble = (i as f64) * 0.05;
            samples.push(vec![
                Feature::from(format!("{}", offset + wobble)),
                Feature::from(format!("{}", offset - wobble)),
                Feature::from(format!("{}", 0.5 * offset)),
            ]);
            labels.push(if i % 2 == 0 { "LAYING" } else { "WALKING" }.to_string());
        }
        Labeled::new(samples, labels).unwrap()
    }

    fn softmax_pipeline() -> Pipeline {
        Pipeline::new(
            vec![
                Transformer::NumericStringConverter,
                Transformer::z_scale_standardizer(),
            ],
            Estimator::softmax(SoftmaxParams {
                batch_size: 5,
                optimizer: Optimizer::Stochastic { rate: 0.3 },
                epochs: 100,
                seed: Some(5),
                ..SoftmaxParams::default()
            }),
        )
    }

    #[test]
    fn trains_and_predicts_every_row() {
        let dataset = blobs();
        let mut pipeline = softmax_pipeline();
        assert!(!pipeline.trained());
        pipeline.train(&dataset).unwrap();
        assert!(pipeline.trained());

        let predictions = pipeline.predict(&dataset).unwrap();
        assert_eq!(predictions.len(), dataset.len());
        assert_eq!(predictions, dataset.labels());
        assert!(!pipeline.steps().is_empty());
        assert!(pipeline.scores().is_none());
    }

    #[test]
    fn predicting_untrained_pipeline_fails() {
        let pipeline = softmax_pipeline();
        assert!(matches!(
            pipeline.predict(&blobs()),
            Err(PipelineError::Unfitted(_))
        ));
    }

    #[test]
    fn strings_without_converter_are_rejected() {
        let mut pipeline = Pipeline::new(vec![], Estimator::softmax(SoftmaxParams::default()));
        assert!(matches!(
            pipeline.train(&blobs()),
            Err(PipelineError::Dataset(DatasetError::NotNumeric { .. }))
        ));
    }

    #[test]
    fn mlp_pipeline_tracks_scores() {
        let dataset = blobs();
        let mut pipeline = Pipeline::new(
            vec![
                Transformer::NumericStringConverter,
                Transformer::z_scale_standardizer(),
                Transformer::principal_component_analysis(2),
            ],
            Estimator::mlp(MlpParams {
                hidden_layers: vec![8],
                batch_size: 4,
                optimizer: Optimizer::adam(0.01),
                epochs: 20,
                holdout: 0.2,
                seed: Some(2),
                ..MlpParams::default()
            }),
        );
        pipeline.train(&dataset).unwrap();
        let scores = pipeline.scores().unwrap();
        assert_eq!(scores.len(), pipeline.steps().len());
        assert!(scores.iter().all(|s| (0.0..=1.0).contains(s)));
        assert_eq!(pipeline.predict(&dataset).unwrap().len(), 20);
    }

    #[test]
    fn nan_standardizer_state_marks_pipeline_non_finite() {
        let mut pipeline = softmax_pipeline();
        pipeline.train(&blobs()).unwrap();
        assert!(pipeline.is_finite());

        if let Transformer::ZScaleStandardizer {
            means: Some(means), ..
        } = &mut pipeline.transformers_mut()[1]
        {
            means[0] = f64::NAN;
        }
        assert!(!pipeline.is_finite());
    }
}
