//! Preprocessing stages applied before the estimator.

use linfa_reduction::Pca;
use ndarray::{Array1, Array2, Axis};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::PipelineError;
use crate::dataset::{Feature, Labeled, matrix_to_samples, samples_to_matrix};
use crate::ml::embed::{fit_pca, project_pca};
use crate::ml::rng_from;

/// A dataset transformer. Stateful variants are fitted before use.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Transformer {
    /// Parse numeric strings into continuous features.
    NumericStringConverter,
    /// Achlioptas sparse random projection.
    SparseRandomProjector {
        dimensions: usize,
        #[serde(default)]
        seed: Option<u64>,
        #[serde(default)]
        matrix: Option<Array2<f64>>,
    },
    /// Random projection with standard normal entries.
    GaussianRandomProjector {
        dimensions: usize,
        #[serde(default)]
        seed: Option<u64>,
        #[serde(default)]
        matrix: Option<Array2<f64>>,
    },
    /// Center each column on its mean and scale to unit variance.
    ZScaleStandardizer {
        #[serde(default)]
        means: Option<Array1<f64>>,
        #[serde(default)]
        stddevs: Option<Array1<f64>>,
    },
    /// Project onto the leading principal components.
    PrincipalComponentAnalysis {
        dimensions: usize,
        #[serde(default)]
        pca: Option<Pca<f64>>,
    },
}

impl Transformer {
    pub fn sparse_random_projector(dimensions: usize) -> Self {
        Transformer::SparseRandomProjector {
            dimensions,
            seed: None,
            matrix: None,
        }
    }

    pub fn gaussian_random_projector(dimensions: usize) -> Self {
        Transformer::GaussianRandomProjector {
            dimensions,
            seed: None,
            matrix: None,
        }
    }

    pub fn z_scale_standardizer() -> Self {
        Transformer::ZScaleStandardizer {
            means: None,
            stddevs: None,
        }
    }

    pub fn principal_component_analysis(dimensions: usize) -> Self {
        Transformer::PrincipalComponentAnalysis {
            dimensions,
            pca: None,
        }
    }

    /// Fix the seed of a random projector. Other variants are unchanged.
    pub fn with_seed(mut self, value: Option<u64>) -> Self {
        if let Transformer::SparseRandomProjector { seed, .. }
        | Transformer::GaussianRandomProjector { seed, .. } = &mut self
        {
            *seed = value;
        }
        self
    }

    pub fn name(&self) -> &'static str {
        match self {
            Transformer::NumericStringConverter => "numeric string converter",
            Transformer::SparseRandomProjector { .. } => "sparse random projector",
            Transformer::GaussianRandomProjector { .. } => "gaussian random projector",
            Transformer::ZScaleStandardizer { .. } => "z-scale standardizer",
            Transformer::PrincipalComponentAnalysis { .. } => "principal component analysis",
        }
    }

    pub fn fitted(&self) -> bool {
        match self {
            Transformer::NumericStringConverter => true,
            Transformer::SparseRandomProjector { matrix, .. }
            | Transformer::GaussianRandomProjector { matrix, .. } => matrix.is_some(),
            Transformer::ZScaleStandardizer { means, stddevs } => {
                means.is_some() && stddevs.is_some()
            }
            Transformer::PrincipalComponentAnalysis { pca, .. } => pca.is_some(),
        }
    }

    /// False when fitted state holds a NaN or infinite value.
    pub fn is_finite(&self) -> bool {
        match self {
            Transformer::SparseRandomProjector { matrix, .. }
            | Transformer::GaussianRandomProjector { matrix, .. } => {
                matrix.iter().all(|m| all_finite(m.iter()))
            }
            Transformer::ZScaleStandardizer { means, stddevs } => {
                means.iter().chain(stddevs).all(|column| all_finite(column.iter()))
            }
            Transformer::NumericStringConverter => true,
            Transformer::PrincipalComponentAnalysis { .. } => true,
        }
    }

    /// Learn the transformer's state from `samples`. Stateless variants do nothing.
    pub fn fit(&mut self, samples: &[Vec<Feature>]) -> Result<(), PipelineError> {
        match self {
            Transformer::NumericStringConverter => Ok(()),
            Transformer::SparseRandomProjector {
                dimensions,
                seed,
                matrix,
            } => {
                let width = feature_width(samples);
                check_dimensions(*dimensions)?;
                let mut rng = rng_from(*seed);
                let scale = (3.0 / *dimensions as f64).sqrt();
                *matrix = Some(Array2::from_shape_fn((width, *dimensions), |_| {
                    let draw = rng.random::<f64>();
                    if draw < 1.0 / 6.0 {
                        scale
                    } else if draw < 1.0 / 3.0 {
                        -scale
                    } else {
                        0.0
                    }
                }));
                debug!(from = width, to = *dimensions, "Fitted sparse random projector");
                Ok(())
            }
            Transformer::GaussianRandomProjector {
                dimensions,
                seed,
                matrix,
            } => {
                let width = feature_width(samples);
                check_dimensions(*dimensions)?;
                let mut rng = rng_from(*seed);
                let scale = 1.0 / (*dimensions as f64).sqrt();
                *matrix = Some(Array2::from_shape_fn((width, *dimensions), |_| {
                    standard_normal(&mut rng) * scale
                }));
                debug!(from = width, to = *dimensions, "Fitted gaussian random projector");
                Ok(())
            }
            Transformer::ZScaleStandardizer { means, stddevs } => {
                let x = samples_to_matrix(samples)?;
                if x.nrows() == 0 {
                    return Err(PipelineError::EmptyDataset);
                }
                let mean = x.mean_axis(Axis(0)).ok_or(PipelineError::EmptyDataset)?;
                let std = x
                    .std_axis(Axis(0), 0.0)
                    .mapv(|s| if s > 0.0 && s.is_finite() { s } else { 1.0 });
                *means = Some(mean);
                *stddevs = Some(std);
                Ok(())
            }
            Transformer::PrincipalComponentAnalysis { dimensions, pca } => {
                let x = samples_to_matrix(samples)?;
                *pca = Some(fit_pca(&x, *dimensions)?);
                Ok(())
            }
        }
    }

    /// Transform rows with the fitted state.
    pub fn transform(
        &self,
        samples: Vec<Vec<Feature>>,
    ) -> Result<Vec<Vec<Feature>>, PipelineError> {
        match self {
            Transformer::NumericStringConverter => Ok(samples
                .into_iter()
                .map(|row| row.into_iter().map(convert_numeric_string).collect())
                .collect()),
            Transformer::SparseRandomProjector { matrix, .. }
            | Transformer::GaussianRandomProjector { matrix, .. } => {
                let matrix = matrix.as_ref().ok_or(PipelineError::Unfitted(self.name()))?;
                let x = checked_matrix(&samples, matrix.nrows())?;
                Ok(matrix_to_samples(&x.dot(matrix)))
            }
            Transformer::ZScaleStandardizer { means, stddevs } => {
                let (Some(means), Some(stddevs)) = (means, stddevs) else {
                    return Err(PipelineError::Unfitted(self.name()));
                };
                let mut x = checked_matrix(&samples, means.len())?;
                for mut row in x.axis_iter_mut(Axis(0)) {
                    row -= means;
                    row /= stddevs;
                }
                Ok(matrix_to_samples(&x))
            }
            Transformer::PrincipalComponentAnalysis { pca, .. } => {
                let pca = pca.as_ref().ok_or(PipelineError::Unfitted(self.name()))?;
                let x = samples_to_matrix(&samples)?;
                Ok(matrix_to_samples(&project_pca(pca, &x)))
            }
        }
    }
}

/// Fit `transformer` on the dataset when needed, then transform it in place.
pub fn apply(dataset: &mut Labeled, transformer: &mut Transformer) -> Result<(), PipelineError> {
    if !transformer.fitted() {
        transformer.fit(dataset.samples())?;
    }
    let transformed = transformer.transform(dataset.samples().to_vec())?;
    dataset.set_samples(transformed);
    Ok(())
}

fn convert_numeric_string(feature: Feature) -> Feature {
    match feature {
        Feature::Categorical(text) => match text.trim().parse::<f64>() {
            Ok(value) => Feature::Continuous(value),
            Err(_) => Feature::Categorical(text),
        },
        continuous => continuous,
    }
}

fn all_finite<'a>(mut values: impl Iterator<Item = &'a f64>) -> bool {
    values.all(|v| v.is_finite())
}

fn feature_width(samples: &[Vec<Feature>]) -> usize {
    samples.first().map(|row| row.len()).unwrap_or(0)
}

fn check_dimensions(dimensions: usize) -> Result<(), PipelineError> {
    if dimensions == 0 {
        return Err(PipelineError::InvalidParameter(
            "target dimensions must be > 0".to_string(),
        ));
    }
    Ok(())
}

fn checked_matrix(samples: &[Vec<Feature>], expected: usize) -> Result<Array2<f64>, PipelineError> {
    let x = samples_to_matrix(samples)?;
    if !samples.is_empty() && x.ncols() != expected {
        return Err(PipelineError::DimensionMismatch {
            expected,
            found: x.ncols(),
        });
    }
    Ok(x)
}

/// Box-Muller draw from N(0, 1).
fn standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    let u1 = rng.random::<f64>().max(f64::MIN_POSITIVE);
    let u2 = rng.random::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(values: &[&[f64]]) -> Vec<Vec<Feature>> {
        values
            .iter()
            .map(|row| row.iter().map(|&v| Feature::from(v)).collect())
            .collect()
    }

    #[test]
    fn numeric_strings_become_numbers() {
        let samples = vec![vec![Feature::from(" 0.25"), Feature::from("walk"), Feature::from(3.0)]];
        let out = Transformer::NumericStringConverter.transform(samples).unwrap();
        assert_eq!(
            out[0],
            vec![Feature::from(0.25), Feature::from("walk"), Feature::from(3.0)]
        );
    }

    #[test]
    fn projectors_change_width() {
        let samples = rows(&[&[1.0, 2.0, 3.0, 4.0], &[0.5, -1.0, 0.0, 2.0]]);
        for mut transformer in [
            Transformer::sparse_random_projector(2),
            Transformer::gaussian_random_projector(3),
        ] {
            assert!(!transformer.fitted());
            transformer.fit(&samples).unwrap();
            let out = transformer.transform(samples.clone()).unwrap();
            assert_eq!(out.len(), 2);
            assert!(out.iter().all(|row| row.len() < 4));
        }
    }

    #[test]
    fn seeded_projectors_are_reproducible() {
        let samples = rows(&[&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0]]);
        let project = || {
            let mut transformer = Transformer::gaussian_random_projector(2).with_seed(Some(11));
            transformer.fit(&samples).unwrap();
            transformer.transform(samples.clone()).unwrap()
        };
        assert_eq!(project(), project());
    }

    #[test]
    fn unfitted_transform_fails() {
        let samples = rows(&[&[1.0]]);
        assert!(matches!(
            Transformer::z_scale_standardizer().transform(samples),
            Err(PipelineError::Unfitted(_))
        ));
    }

    #[test]
    fn standardizer_centers_columns() {
        let samples = rows(&[&[1.0, 10.0], &[3.0, 10.0], &[5.0, 10.0]]);
        let mut transformer = Transformer::z_scale_standardizer();
        transformer.fit(&samples).unwrap();
        let out = transformer.transform(samples).unwrap();
        let x = samples_to_matrix(&out).unwrap();
        let means = x.mean_axis(Axis(0)).unwrap();
        assert!(means.iter().all(|m| m.abs() < 1e-12));
        // Constant columns are centered but not scaled.
        assert!(x.column(1).iter().all(|v| v.abs() < 1e-12));
        assert!((x.column(0).std(0.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn width_mismatch_after_fit_is_reported() {
        let mut transformer = Transformer::gaussian_random_projector(2);
        transformer.fit(&rows(&[&[1.0, 2.0, 3.0]])).unwrap();
        assert!(matches!(
            transformer.transform(rows(&[&[1.0, 2.0]])),
            Err(PipelineError::DimensionMismatch {
                expected: 3,
                found: 2
            })
        ));
    }

    #[test]
    fn apply_fits_then_transforms_dataset() {
        let mut dataset = Labeled::new(
            vec![vec![Feature::from("1"), Feature::from("2")]; 4],
            vec!["A".into(), "B".into(), "A".into(), "B".into()],
        )
        .unwrap();
        apply(&mut dataset, &mut Transformer::NumericStringConverter).unwrap();
        let mut projector = Transformer::sparse_random_projector(1);
        apply(&mut dataset, &mut projector).unwrap();
        assert!(projector.fitted());
        assert_eq!(dataset.feature_width(), 1);
        assert_eq!(dataset.len(), 4);
    }
}
