//! Library behind the HAR experiment runners and their tests.
/// Runner configuration (`har.toml`).
pub mod config;
/// Labeled datasets and their CSV/NDJSON extractors.
pub mod dataset;
/// Tracing setup shared by the binaries.
pub mod logging;
/// Classifiers, optimizers, embedders and metrics.
pub mod ml;
/// CSV writers for embeddings and training progress.
pub mod output;
/// Model persistence and the save prompt.
pub mod persist;
/// Transformer + estimator pipelines.
pub mod pipeline;
/// Cross-validation reports.
pub mod report;
