//! Machine learning building blocks: classifiers, embedders and metrics.
//!
//! Classifiers are trained with mini-batch gradient descent on dense `f64`
//! matrices produced by the pipeline's transformers.

pub mod embed;
pub mod metrics;
pub mod mlp;
pub mod optimizer;
pub mod softmax;

use std::collections::BTreeMap;

use ndarray::{Array1, ArrayView1};
use rand::SeedableRng;
use rand::rngs::StdRng;
use thiserror::Error;

/// Errors raised while training or querying a classifier.
#[derive(Debug, Error)]
pub enum TrainError {
    #[error("cannot train on an empty dataset")]
    EmptyDataset,
    #[error("need at least 2 classes to train (found {0})")]
    TooFewClasses(usize),
    #[error("{samples} samples but {labels} labels")]
    LabelCount { samples: usize, labels: usize },
    #[error("expected {expected} features, found {found}")]
    DimensionMismatch { expected: usize, found: usize },
    #[error("estimator has not been trained")]
    Untrained,
    #[error("invalid hyperparameter: {0}")]
    InvalidParameter(String),
    #[error("training diverged at epoch {epoch}: parameters are no longer finite")]
    NonFinite { epoch: usize },
}

/// Numerically stable softmax.
pub fn softmax(logits: ArrayView1<f64>) -> Array1<f64> {
    if logits.is_empty() {
        return Array1::zeros(0);
    }
    let max = logits.fold(f64::NEG_INFINITY, |a, &b| a.max(b));
    let exps = logits.mapv(|v| (v - max).exp());
    let sum = exps.sum();
    if sum == 0.0 || !sum.is_finite() {
        return Array1::from_elem(logits.len(), 1.0 / logits.len() as f64);
    }
    exps / sum
}

/// Index of the largest value.
pub fn argmax(values: ArrayView1<f64>) -> usize {
    let mut best = 0usize;
    let mut best_val = f64::NEG_INFINITY;
    for (idx, &val) in values.iter().enumerate() {
        if val > best_val {
            best_val = val;
            best = idx;
        }
    }
    best
}

/// Sorted class list and per-row class indices.
pub(crate) fn encode_labels(labels: &[String]) -> (Vec<String>, Vec<usize>) {
    let index: BTreeMap<&str, usize> = labels
        .iter()
        .map(String::as_str)
        .collect::<std::collections::BTreeSet<_>>()
        .into_iter()
        .enumerate()
        .map(|(idx, class)| (class, idx))
        .collect();
    let classes = index.keys().map(|class| class.to_string()).collect();
    let encoded = labels.iter().map(|label| index[label.as_str()]).collect();
    (classes, encoded)
}

/// Seeded RNG when a seed is given, OS entropy otherwise.
pub fn rng_from(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    }
}

/// Tracks whether a training curve is still improving.
#[derive(Debug, Clone)]
pub(crate) struct EarlyStopping {
    min_change: f64,
    window: usize,
    best: f64,
    since_best: usize,
    previous: Option<f64>,
}

impl EarlyStopping {
    pub(crate) fn new(min_change: f64, window: usize) -> Self {
        Self {
            min_change,
            window: window.max(1),
            best: f64::INFINITY,
            since_best: 0,
            previous: None,
        }
    }

    /// Record the next loss value; returns `true` when training should stop.
    pub(crate) fn update(&mut self, loss: f64) -> bool {
        if !loss.is_finite() {
            return true;
        }
        if let Some(previous) = self.previous
            && (previous - loss).abs() < self.min_change
        {
            return true;
        }
        self.previous = Some(loss);
        if loss < self.best {
            self.best = loss;
            self.since_best = 0;
        } else {
            self.since_best += 1;
        }
        self.since_best >= self.window
    }
}
