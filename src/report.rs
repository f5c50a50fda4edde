//! Cross-validation reports written after validating a model.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ml::metrics::{ConfusionMatrix, MulticlassBreakdown};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("{predictions} predictions for {labels} labels")]
    LengthMismatch { predictions: usize, labels: usize },
    #[error("cannot report on an empty set of predictions")]
    Empty,
    #[error("failed to serialize report: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Multiclass breakdown plus confusion matrix, as written to `report.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateReport {
    pub multiclass_breakdown: MulticlassBreakdown,
    /// `{predicted: {actual: count}}`.
    pub confusion_matrix: BTreeMap<String, BTreeMap<String, u32>>,
}

impl AggregateReport {
    pub fn generate(predictions: &[String], labels: &[String]) -> Result<Self, ReportError> {
        if predictions.len() != labels.len() {
            return Err(ReportError::LengthMismatch {
                predictions: predictions.len(),
                labels: labels.len(),
            });
        }
        if predictions.is_empty() {
            return Err(ReportError::Empty);
        }
        let cm = ConfusionMatrix::from_labels(predictions, labels);
        Ok(Self {
            multiclass_breakdown: MulticlassBreakdown::from_confusion(&cm),
            confusion_matrix: cm.to_map(),
        })
    }

    pub fn to_json(&self) -> Result<String, ReportError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write(&self, path: &Path) -> Result<(), ReportError> {
        let json = self.to_json()?;
        std::fs::write(path, json).map_err(|source| ReportError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl fmt::Display for AggregateReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string_pretty(self).map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn mismatched_lengths_fail() {
        let err = AggregateReport::generate(&strings(&["A"]), &strings(&["A", "B"])).unwrap_err();
        assert!(matches!(
            err,
            ReportError::LengthMismatch {
                predictions: 1,
                labels: 2
            }
        ));
    }

    #[test]
    fn json_has_both_sections() {
        let report =
            AggregateReport::generate(&strings(&["A", "B", "B"]), &strings(&["A", "B", "A"]))
                .unwrap();
        let value: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        // One row labelled A was predicted as B.
        assert_eq!(value["confusion_matrix"]["B"]["A"], 1);
        assert_eq!(value["confusion_matrix"]["A"]["B"], 0);
        assert_eq!(value["multiclass_breakdown"]["overall"]["cardinality"], 3);
        assert!(value["multiclass_breakdown"]["classes"]["B"]["precision"].is_number());
    }
}
