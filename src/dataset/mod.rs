//! Labeled tabular datasets and the extractors that feed them.
//!
//! A [`Labeled`] dataset keeps feature rows and their labels side by side. Rows
//! come in as raw [`Feature`] values: CSV cells arrive as strings and are
//! converted to numbers by the pipeline, NDJSON numbers arrive as numbers.

pub mod csv;
pub mod ndjson;

use std::collections::BTreeSet;

use ndarray::Array2;
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while building or reading a dataset.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("io error reading {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
    #[error("csv error in {path}: {source}")]
    Csv {
        path: std::path::PathBuf,
        source: ::csv::Error,
    },
    #[error("invalid json on line {line} of {path}: {source}")]
    Json {
        path: std::path::PathBuf,
        line: usize,
        source: serde_json::Error,
    },
    #[error("line {line} of {path} is not a record: {reason}")]
    InvalidRecord {
        path: std::path::PathBuf,
        line: usize,
        reason: String,
    },
    #[error("feature rows ({samples}) and labels ({labels}) differ in count")]
    CountMismatch { samples: usize, labels: usize },
    #[error("row {row} has {found} features (expected {expected})")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("row {row} has an empty label")]
    EmptyLabel { row: usize },
    #[error("row {row} column {column} is not numeric: {value:?}")]
    NotNumeric {
        row: usize,
        column: usize,
        value: String,
    },
}

/// A single feature value as read from disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Feature {
    Continuous(f64),
    Categorical(String),
}

impl Feature {
    /// Numeric value, if this feature is continuous.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Feature::Continuous(value) => Some(*value),
            Feature::Categorical(_) => None,
        }
    }
}

impl From<f64> for Feature {
    fn from(value: f64) -> Self {
        Feature::Continuous(value)
    }
}

impl From<&str> for Feature {
    fn from(value: &str) -> Self {
        Feature::Categorical(value.to_string())
    }
}

impl From<String> for Feature {
    fn from(value: String) -> Self {
        Feature::Categorical(value)
    }
}

/// Ordered feature rows paired with categorical labels.
#[derive(Debug, Clone, PartialEq)]
pub struct Labeled {
    samples: Vec<Vec<Feature>>,
    labels: Vec<String>,
}

impl Labeled {
    /// Pair feature rows with labels, rejecting mismatched counts and ragged rows.
    pub fn new(samples: Vec<Vec<Feature>>, labels: Vec<String>) -> Result<Self, DatasetError> {
        if samples.len() != labels.len() {
            return Err(DatasetError::CountMismatch {
                samples: samples.len(),
                labels: labels.len(),
            });
        }
        if let Some(first) = samples.first() {
            let expected = first.len();
            for (row, sample) in samples.iter().enumerate() {
                if sample.len() != expected {
                    return Err(DatasetError::RaggedRow {
                        row,
                        expected,
                        found: sample.len(),
                    });
                }
            }
        }
        for (row, label) in labels.iter().enumerate() {
            if label.trim().is_empty() {
                return Err(DatasetError::EmptyLabel { row });
            }
        }
        Ok(Self { samples, labels })
    }

    /// Build a dataset from whole records whose last value is the label.
    pub fn from_records(records: Vec<Vec<Feature>>) -> Result<Self, DatasetError> {
        let mut samples = Vec::with_capacity(records.len());
        let mut labels = Vec::with_capacity(records.len());
        for (row, mut record) in records.into_iter().enumerate() {
            let label = match record.pop() {
                Some(Feature::Categorical(label)) => label,
                Some(Feature::Continuous(value)) => value.to_string(),
                None => return Err(DatasetError::EmptyLabel { row }),
            };
            samples.push(record);
            labels.push(label);
        }
        Self::new(samples, labels)
    }

    pub fn samples(&self) -> &[Vec<Feature>] {
        &self.samples
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Number of features per row, or zero for an empty dataset.
    pub fn feature_width(&self) -> usize {
        self.samples.first().map(|row| row.len()).unwrap_or(0)
    }

    /// Distinct labels in sorted order.
    pub fn possible_outcomes(&self) -> Vec<String> {
        self.labels
            .iter()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Iterate over `(features, label)` pairs in row order.
    pub fn zip(&self) -> impl Iterator<Item = (&[Feature], &str)> {
        self.samples
            .iter()
            .map(Vec::as_slice)
            .zip(self.labels.iter().map(String::as_str))
    }

    /// Shuffle rows uniformly, keeping each row with its label.
    pub fn randomize<R: Rng + ?Sized>(mut self, rng: &mut R) -> Self {
        let mut order: Vec<usize> = (0..self.samples.len()).collect();
        order.shuffle(rng);
        let mut samples = Vec::with_capacity(order.len());
        let mut labels = Vec::with_capacity(order.len());
        for idx in order {
            samples.push(std::mem::take(&mut self.samples[idx]));
            labels.push(std::mem::take(&mut self.labels[idx]));
        }
        Self { samples, labels }
    }

    /// Keep only the first `n` rows.
    pub fn head(mut self, n: usize) -> Self {
        self.samples.truncate(n);
        self.labels.truncate(n);
        self
    }

    /// Replace the feature rows, keeping labels. Used by transformers.
    pub(crate) fn set_samples(&mut self, samples: Vec<Vec<Feature>>) {
        self.samples = samples;
    }

    /// Dense numeric matrix of the features.
    ///
    /// Fails on the first categorical value; run the numeric string converter first.
    pub fn to_matrix(&self) -> Result<Array2<f64>, DatasetError> {
        samples_to_matrix(&self.samples)
    }
}

/// Convert rows of continuous features into a dense matrix.
pub fn samples_to_matrix(samples: &[Vec<Feature>]) -> Result<Array2<f64>, DatasetError> {
    let width = samples.first().map(|row| row.len()).unwrap_or(0);
    let mut data = Vec::with_capacity(samples.len() * width);
    for (row, sample) in samples.iter().enumerate() {
        if sample.len() != width {
            return Err(DatasetError::RaggedRow {
                row,
                expected: width,
                found: sample.len(),
            });
        }
        for (column, feature) in sample.iter().enumerate() {
            match feature {
                Feature::Continuous(value) => data.push(*value),
                Feature::Categorical(value) => {
                    return Err(DatasetError::NotNumeric {
                        row,
                        column,
                        value: value.clone(),
                    });
                }
            }
        }
    }
    Array2::from_shape_vec((samples.len(), width), data).map_err(|_| DatasetError::RaggedRow {
        row: 0,
        expected: width,
        found: 0,
    })
}

/// Convert a dense matrix back into continuous feature rows.
pub fn matrix_to_samples(matrix: &Array2<f64>) -> Vec<Vec<Feature>> {
    matrix
        .rows()
        .into_iter()
        .map(|row| row.iter().map(|&value| Feature::Continuous(value)).collect())
        .collect()
}
