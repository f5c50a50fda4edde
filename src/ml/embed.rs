//! Dimensionality reduction for visualizing the dataset.
//!
//! t-SNE runs through `linfa-tsne` (Barnes-Hut approximation) and PCA through
//! `linfa-reduction`.

use linfa::DatasetBase;
use linfa::traits::{Fit, Transformer};
use linfa_reduction::Pca;
use linfa_tsne::TSneParams;
use ndarray::Array2;
use rand_08::SeedableRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::dataset::{DatasetError, Labeled};

#[derive(Debug, Error)]
pub enum EmbedError {
    #[error(transparent)]
    Dataset(#[from] DatasetError),
    #[error("need more than {needed} samples to embed (found {found})")]
    TooFewSamples { needed: usize, found: usize },
    #[error("t-SNE failed: {0}")]
    TSne(#[from] linfa_tsne::TSneError),
    #[error("PCA failed: {0}")]
    Reduction(#[from] linfa_reduction::ReductionError),
}

/// t-SNE settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TSneOptions {
    pub dimensions: usize,
    pub perplexity: f64,
    /// Barnes-Hut trade-off; `0.0` computes exact gradients.
    pub approx_threshold: f64,
    pub max_iter: usize,
    /// Iterations spent in the early exaggeration phase.
    pub preliminary_iter: usize,
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for TSneOptions {
    fn default() -> Self {
        Self {
            dimensions: 2,
            perplexity: 30.0,
            approx_threshold: 0.5,
            max_iter: 1000,
            preliminary_iter: 250,
            seed: None,
        }
    }
}

/// Terminal stage of an exploration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Embedder {
    TSne(TSneOptions),
    Pca { dimensions: usize },
}

impl Embedder {
    /// One output row per dataset row, `dimensions` columns each.
    pub fn embed(&self, dataset: &Labeled) -> Result<Array2<f64>, EmbedError> {
        let records = dataset.to_matrix()?;
        match self {
            Embedder::TSne(options) => tsne(records, options),
            Embedder::Pca { dimensions } => {
                let pca = fit_pca(&records, *dimensions)?;
                Ok(project_pca(&pca, &records))
            }
        }
    }
}

fn tsne(records: Array2<f64>, options: &TSneOptions) -> Result<Array2<f64>, EmbedError> {
    // Each point needs roughly 3 * perplexity neighbours.
    let needed = (3.0 * options.perplexity).ceil() as usize + 1;
    if records.nrows() <= needed {
        return Err(EmbedError::TooFewSamples {
            needed,
            found: records.nrows(),
        });
    }
    info!(
        samples = records.nrows(),
        features = records.ncols(),
        perplexity = options.perplexity,
        "Embedding with t-SNE"
    );
    let rng = match options.seed {
        Some(seed) => rand_08::rngs::StdRng::seed_from_u64(seed),
        None => rand_08::rngs::StdRng::from_entropy(),
    };
    let embedding = TSneParams::embedding_size_with_rng(options.dimensions, rng)
        .perplexity(options.perplexity)
        .approx_threshold(options.approx_threshold)
        .max_iter(options.max_iter)
        .preliminary_iter(options.preliminary_iter.min(options.max_iter))
        .transform(records)?;
    info!("t-SNE complete");
    Ok(embedding)
}

/// Fit a PCA projection onto `dimensions` components.
pub fn fit_pca(records: &Array2<f64>, dimensions: usize) -> Result<Pca<f64>, EmbedError> {
    let limit = records.nrows().min(records.ncols());
    if dimensions == 0 || dimensions > limit {
        return Err(EmbedError::TooFewSamples {
            needed: dimensions,
            found: limit,
        });
    }
    let dataset = DatasetBase::from(records.clone());
    let pca = Pca::params(dimensions).fit(&dataset)?;
    info!(
        components = dimensions,
        explained = pca.explained_variance_ratio().sum(),
        "PCA fitted"
    );
    Ok(pca)
}

/// Project rows onto a fitted PCA basis.
pub fn project_pca(pca: &Pca<f64>, records: &Array2<f64>) -> Array2<f64> {
    use linfa::traits::Predict;
    pca.predict(records)
}
