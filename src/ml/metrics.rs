//! Evaluation metrics for classification models.
//!
//! [`ConfusionMatrix`] stores counts indexed by actual class first. The JSON
//! form from [`ConfusionMatrix::to_map`], which `report.json` carries, is
//! keyed by predicted class first: `{predicted: {actual: count}}`.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq)]
/// Confusion matrix for a `K`-class classifier.
pub struct ConfusionMatrix {
    /// Class names, sorted.
    pub classes: Vec<String>,
    /// Row-major `KxK` counts (`truth * K + predicted`).
    pub counts: Vec<u32>,
}

impl ConfusionMatrix {
    /// Create an empty `KxK` confusion matrix.
    pub fn new(classes: Vec<String>) -> Self {
        let k = classes.len();
        Self {
            classes,
            counts: vec![0; k * k],
        }
    }

    /// Tally predictions against ground truth.
    ///
    /// The class set is the sorted union of actual and predicted labels.
    pub fn from_labels(predictions: &[String], labels: &[String]) -> Self {
        let classes: Vec<String> = labels
            .iter()
            .chain(predictions)
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let index: BTreeMap<&str, usize> = classes
            .iter()
            .enumerate()
            .map(|(idx, class)| (class.as_str(), idx))
            .collect();
        let mut cm = Self::new(classes.clone());
        for (predicted, truth) in predictions.iter().zip(labels) {
            cm.add(index[truth.as_str()], index[predicted.as_str()]);
        }
        cm
    }

    pub fn n_classes(&self) -> usize {
        self.classes.len()
    }

    pub fn add(&mut self, truth: usize, predicted: usize) {
        let k = self.n_classes();
        if truth >= k || predicted >= k {
            return;
        }
        let idx = truth * k + predicted;
        self.counts[idx] = self.counts[idx].saturating_add(1);
    }

    pub fn get(&self, truth: usize, predicted: usize) -> u32 {
        self.counts[truth * self.n_classes() + predicted]
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().map(|&c| c as u64).sum()
    }

    /// Nested `{predicted: {actual: count}}` map.
    pub fn to_map(&self) -> BTreeMap<String, BTreeMap<String, u32>> {
        self.classes
            .iter()
            .enumerate()
            .map(|(predicted, guess)| {
                let column = self
                    .classes
                    .iter()
                    .enumerate()
                    .map(|(truth, actual)| (actual.clone(), self.get(truth, predicted)))
                    .collect();
                (guess.clone(), column)
            })
            .collect()
    }
}

/// Compute overall accuracy from a confusion matrix.
pub fn accuracy(cm: &ConfusionMatrix) -> f64 {
    let correct: u64 = (0..cm.n_classes()).map(|i| cm.get(i, i) as u64).sum();
    safe_div(correct as f64, cm.total() as f64)
}

/// Weighted harmonic mean of precision and recall.
pub fn f_beta(precision: f64, recall: f64, beta: f64) -> f64 {
    let beta2 = beta * beta;
    safe_div((1.0 + beta2) * precision * recall, beta2 * precision + recall)
}

/// Matthews correlation coefficient for one-vs-rest counts.
pub fn mcc(tp: f64, tn: f64, fp: f64, fn_: f64) -> f64 {
    let denom = ((tp + fp) * (tp + fn_) * (tn + fp) * (tn + fn_)).sqrt();
    safe_div(tp * tn - fp * fn_, denom)
}

fn macro_mean(
    classes: &BTreeMap<String, ClassBreakdown>,
    f: &dyn Fn(&ClassBreakdown) -> f64,
) -> f64 {
    safe_div(classes.values().map(f).sum::<f64>(), classes.len() as f64)
}

fn safe_div(num: f64, denom: f64) -> f64 {
    if denom == 0.0 { 0.0 } else { num / denom }
}

#[derive(Debug, Clone, Copy)]
struct ClassCounts {
    tp: f64,
    tn: f64,
    fp: f64,
    fn_: f64,
}

impl ClassCounts {
    fn of(cm: &ConfusionMatrix, class_idx: usize) -> Self {
        let k = cm.n_classes();
        let tp = cm.get(class_idx, class_idx) as f64;
        let mut fp = 0.0;
        let mut fn_ = 0.0;
        for other in (0..k).filter(|&j| j != class_idx) {
            fn_ += cm.get(class_idx, other) as f64;
            fp += cm.get(other, class_idx) as f64;
        }
        let tn = cm.total() as f64 - tp - fp - fn_;
        Self { tp, tn, fp, fn_ }
    }
}

/// One-vs-rest scores for a single class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassBreakdown {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub specificity: f64,
    pub negative_predictive_value: f64,
    pub false_discovery_rate: f64,
    pub miss_rate: f64,
    pub fall_out: f64,
    pub false_omission_rate: f64,
    pub f1_score: f64,
    pub mcc: f64,
    pub informedness: f64,
    pub markedness: f64,
    pub true_positives: u64,
    pub true_negatives: u64,
    pub false_positives: u64,
    pub false_negatives: u64,
    /// Number of rows whose actual label is this class.
    pub cardinality: u64,
    /// Share of all rows whose actual label is this class.
    pub proportion: f64,
}

impl ClassBreakdown {
    fn from_counts(counts: ClassCounts, total: f64) -> Self {
        let ClassCounts { tp, tn, fp, fn_ } = counts;
        let precision = safe_div(tp, tp + fp);
        let recall = safe_div(tp, tp + fn_);
        let specificity = safe_div(tn, tn + fp);
        let npv = safe_div(tn, tn + fn_);
        Self {
            accuracy: safe_div(tp + tn, total),
            precision,
            recall,
            specificity,
            negative_predictive_value: npv,
            false_discovery_rate: 1.0 - precision,
            miss_rate: 1.0 - recall,
            fall_out: 1.0 - specificity,
            false_omission_rate: 1.0 - npv,
            f1_score: f_beta(precision, recall, 1.0),
            mcc: mcc(tp, tn, fp, fn_),
            informedness: recall + specificity - 1.0,
            markedness: precision + npv - 1.0,
            true_positives: tp as u64,
            true_negatives: tn as u64,
            false_positives: fp as u64,
            false_negatives: fn_ as u64,
            cardinality: (tp + fn_) as u64,
            proportion: safe_div(tp + fn_, total),
        }
    }
}

/// Macro-averaged scores across classes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverallBreakdown {
    pub accuracy: f64,
    pub balanced_accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub specificity: f64,
    pub negative_predictive_value: f64,
    pub false_discovery_rate: f64,
    pub miss_rate: f64,
    pub fall_out: f64,
    pub false_omission_rate: f64,
    pub f1_score: f64,
    pub mcc: f64,
    pub informedness: f64,
    pub markedness: f64,
    pub true_positives: u64,
    pub true_negatives: u64,
    pub false_positives: u64,
    pub false_negatives: u64,
    pub cardinality: u64,
    pub classes: usize,
}

/// Overall and per-class classification scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MulticlassBreakdown {
    pub overall: OverallBreakdown,
    pub classes: BTreeMap<String, ClassBreakdown>,
}

impl MulticlassBreakdown {
    pub fn from_confusion(cm: &ConfusionMatrix) -> Self {
        let total = cm.total() as f64;
        let k = cm.n_classes();
        let mut classes = BTreeMap::new();
        let mut sums = ClassCounts {
            tp: 0.0,
            tn: 0.0,
            fp: 0.0,
            fn_: 0.0,
        };
        for (idx, name) in cm.classes.iter().enumerate() {
            let counts = ClassCounts::of(cm, idx);
            sums.tp += counts.tp;
            sums.tn += counts.tn;
            sums.fp += counts.fp;
            sums.fn_ += counts.fn_;
            classes.insert(name.clone(), ClassBreakdown::from_counts(counts, total));
        }

        let mean = |f: &dyn Fn(&ClassBreakdown) -> f64| macro_mean(&classes, f);
        let precision = mean(&|c| c.precision);
        let recall = mean(&|c| c.recall);
        let specificity = mean(&|c| c.specificity);
        let npv = mean(&|c| c.negative_predictive_value);
        let overall = OverallBreakdown {
            accuracy: accuracy(cm),
            balanced_accuracy: (recall + specificity) / 2.0,
            precision,
            recall,
            specificity,
            negative_predictive_value: npv,
            false_discovery_rate: 1.0 - precision,
            miss_rate: 1.0 - recall,
            fall_out: 1.0 - specificity,
            false_omission_rate: 1.0 - npv,
            f1_score: mean(&|c| c.f1_score),
            mcc: mean(&|c| c.mcc),
            informedness: recall + specificity - 1.0,
            markedness: precision + npv - 1.0,
            true_positives: sums.tp as u64,
            true_negatives: sums.tn as u64,
            false_positives: sums.fp as u64,
            false_negatives: sums.fn_ as u64,
            cardinality: cm.total(),
            classes: k,
        };
        Self { overall, classes }
    }
}
