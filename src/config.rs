//! Runner configuration loaded from `har.toml`.
//!
//! Every field has a default matching the stock experiment, so a missing file
//! or a partial file is always valid input.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dataset::csv::CsvOptions;
use crate::ml::embed::TSneOptions;
use crate::ml::mlp::MlpParams;
use crate::ml::optimizer::Optimizer;
use crate::ml::softmax::SoftmaxParams;

/// Default filename looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "har.toml";
/// Environment variable naming an alternative config file.
pub const CONFIG_ENV_VAR: &str = "HAR_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid config TOML at {path}: {source}")]
    ParseToml {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Invalid config value: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HarConfig {
    #[serde(default)]
    pub data: DataSettings,
    #[serde(default)]
    pub explore: ExploreSettings,
    #[serde(default)]
    pub softmax: SoftmaxSettings,
    #[serde(default)]
    pub mlp: MlpSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Input file locations and CSV dialect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSettings {
    #[serde(default = "default_train_samples")]
    pub train_samples: PathBuf,
    #[serde(default = "default_train_labels")]
    pub train_labels: PathBuf,
    #[serde(default = "default_test_samples")]
    pub test_samples: PathBuf,
    #[serde(default = "default_test_labels")]
    pub test_labels: PathBuf,
    #[serde(default = "default_train_ndjson")]
    pub train_ndjson: PathBuf,
    #[serde(default = "default_test_ndjson")]
    pub test_ndjson: PathBuf,
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
    #[serde(default = "default_quote")]
    pub quote: char,
    /// Rows kept after shuffling for exploration.
    #[serde(default = "default_explore_limit")]
    pub explore_limit: usize,
    /// Seed for shuffling and random projections. Unset means OS entropy.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            train_samples: default_train_samples(),
            train_labels: default_train_labels(),
            test_samples: default_test_samples(),
            test_labels: default_test_labels(),
            train_ndjson: default_train_ndjson(),
            test_ndjson: default_test_ndjson(),
            delimiter: default_delimiter(),
            quote: default_quote(),
            explore_limit: default_explore_limit(),
            seed: None,
        }
    }
}

impl DataSettings {
    pub fn csv_options(&self) -> Result<CsvOptions, ConfigError> {
        Ok(CsvOptions {
            delimiter: ascii_byte("data.delimiter", self.delimiter)?,
            quote: ascii_byte("data.quote", self.quote)?,
            has_header: false,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExploreSettings {
    #[serde(default = "default_explore_projection")]
    pub projection_dimensions: usize,
    #[serde(default = "default_embedding_dimensions")]
    pub dimensions: usize,
    #[serde(default = "default_perplexity")]
    pub perplexity: f64,
    #[serde(default = "default_approx_threshold")]
    pub approx_threshold: f64,
    #[serde(default = "default_tsne_iterations")]
    pub max_iter: usize,
    #[serde(default = "default_preliminary_iterations")]
    pub preliminary_iter: usize,
    #[serde(default = "default_embedding_output")]
    pub output: PathBuf,
}

impl Default for ExploreSettings {
    fn default() -> Self {
        Self {
            projection_dimensions: default_explore_projection(),
            dimensions: default_embedding_dimensions(),
            perplexity: default_perplexity(),
            approx_threshold: default_approx_threshold(),
            max_iter: default_tsne_iterations(),
            preliminary_iter: default_preliminary_iterations(),
            output: default_embedding_output(),
        }
    }
}

impl ExploreSettings {
    pub fn tsne_options(&self, seed: Option<u64>) -> TSneOptions {
        TSneOptions {
            dimensions: self.dimensions,
            perplexity: self.perplexity,
            approx_threshold: self.approx_threshold,
            max_iter: self.max_iter,
            preliminary_iter: self.preliminary_iter,
            seed,
        }
    }
}

/// Softmax runner: Gaussian projection, standardization, softmax classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoftmaxSettings {
    #[serde(default = "default_softmax_projection")]
    pub projection_dimensions: usize,
    #[serde(default = "default_softmax_batch")]
    pub batch_size: usize,
    #[serde(default = "default_optimizer")]
    pub optimizer: Optimizer,
    #[serde(default = "default_l2_penalty")]
    pub l2_penalty: f64,
    #[serde(default = "default_epochs")]
    pub epochs: usize,
    #[serde(default = "default_min_change")]
    pub min_change: f64,
    #[serde(default = "default_window")]
    pub window: usize,
    #[serde(default = "default_softmax_model")]
    pub model: PathBuf,
    #[serde(default = "default_progress_output")]
    pub progress: PathBuf,
}

impl Default for SoftmaxSettings {
    fn default() -> Self {
        Self {
            projection_dimensions: default_softmax_projection(),
            batch_size: default_softmax_batch(),
            optimizer: default_optimizer(),
            l2_penalty: default_l2_penalty(),
            epochs: default_epochs(),
            min_change: default_min_change(),
            window: default_window(),
            model: default_softmax_model(),
            progress: default_progress_output(),
        }
    }
}

impl SoftmaxSettings {
    pub fn params(&self, seed: Option<u64>) -> SoftmaxParams {
        SoftmaxParams {
            batch_size: self.batch_size,
            optimizer: self.optimizer,
            l2_penalty: self.l2_penalty,
            epochs: self.epochs,
            min_change: self.min_change,
            window: self.window,
            seed,
        }
    }
}

/// MLP runner: standardization, PCA, multi-layer perceptron.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MlpSettings {
    #[serde(default = "default_pca_dimensions")]
    pub pca_dimensions: usize,
    #[serde(default = "default_hidden_layers")]
    pub hidden_layers: Vec<usize>,
    #[serde(default = "default_mlp_batch")]
    pub batch_size: usize,
    #[serde(default = "default_mlp_optimizer")]
    pub optimizer: Optimizer,
    #[serde(default = "default_l2_penalty")]
    pub l2_penalty: f64,
    #[serde(default)]
    pub dropout: f64,
    #[serde(default = "default_epochs")]
    pub epochs: usize,
    #[serde(default = "default_min_change")]
    pub min_change: f64,
    #[serde(default = "default_window")]
    pub window: usize,
    #[serde(default = "default_holdout")]
    pub holdout: f64,
    #[serde(default = "default_mlp_model")]
    pub model: PathBuf,
    #[serde(default = "default_progress_output")]
    pub progress: PathBuf,
}

impl Default for MlpSettings {
    fn default() -> Self {
        Self {
            pca_dimensions: default_pca_dimensions(),
            hidden_layers: default_hidden_layers(),
            batch_size: default_mlp_batch(),
            optimizer: default_mlp_optimizer(),
            l2_penalty: default_l2_penalty(),
            dropout: 0.0,
            epochs: default_epochs(),
            min_change: default_min_change(),
            window: default_window(),
            holdout: default_holdout(),
            model: default_mlp_model(),
            progress: default_progress_output(),
        }
    }
}

impl MlpSettings {
    pub fn params(&self, seed: Option<u64>) -> MlpParams {
        MlpParams {
            hidden_layers: self.hidden_layers.clone(),
            batch_size: self.batch_size,
            optimizer: self.optimizer,
            l2_penalty: self.l2_penalty,
            dropout: self.dropout,
            epochs: self.epochs,
            min_change: self.min_change,
            window: self.window,
            holdout: self.holdout,
            seed,
        }
    }
}

/// Where log files go and how many are kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: default_log_dir(),
            max_files: default_max_log_files(),
            filter: default_log_filter(),
        }
    }
}

impl HarConfig {
    /// Load from `explicit`, else `$HAR_CONFIG`, else `./har.toml`.
    ///
    /// An explicitly named file must exist. The default file may be absent,
    /// in which case defaults are returned.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let from_env = std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from);
        match explicit.map(Path::to_path_buf).or(from_env) {
            Some(path) => Self::load(&path),
            None => {
                let path = Path::new(CONFIG_FILE_NAME);
                if path.exists() {
                    Self::load(path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: HarConfig = toml::from_str(&text).map_err(|source| ConfigError::ParseToml {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.data.csv_options()?;
        if self.data.explore_limit == 0 {
            return Err(invalid("data.explore_limit must be > 0"));
        }
        if self.explore.projection_dimensions == 0 {
            return Err(invalid("explore.projection_dimensions must be > 0"));
        }
        if self.explore.dimensions != 2 {
            return Err(invalid("explore.dimensions must be 2 (embeddings are written as x,y)"));
        }
        if !self.explore.perplexity.is_finite() || self.explore.perplexity <= 0.0 {
            return Err(invalid("explore.perplexity must be > 0"));
        }
        if self.softmax.projection_dimensions == 0 {
            return Err(invalid("softmax.projection_dimensions must be > 0"));
        }
        if self.mlp.pca_dimensions == 0 {
            return Err(invalid("mlp.pca_dimensions must be > 0"));
        }
        self.softmax
            .params(None)
            .validate()
            .map_err(|err| ConfigError::Invalid(format!("softmax: {err}")))?;
        self.mlp
            .params(None)
            .validate()
            .map_err(|err| ConfigError::Invalid(format!("mlp: {err}")))?;
        if self.logging.max_files == 0 {
            return Err(invalid("logging.max_files must be > 0"));
        }
        Ok(())
    }
}

fn invalid(message: &str) -> ConfigError {
    ConfigError::Invalid(message.to_string())
}

fn ascii_byte(field: &str, value: char) -> Result<u8, ConfigError> {
    if value.is_ascii() {
        Ok(value as u8)
    } else {
        Err(ConfigError::Invalid(format!(
            "{field} must be a single ASCII character"
        )))
    }
}

fn default_train_samples() -> PathBuf {
    PathBuf::from("train/X_train.csv")
}

fn default_train_labels() -> PathBuf {
    PathBuf::from("train/y_train.csv")
}

fn default_test_samples() -> PathBuf {
    PathBuf::from("test/X_test.csv")
}

fn default_test_labels() -> PathBuf {
    PathBuf::from("test/y_test.csv")
}

fn default_train_ndjson() -> PathBuf {
    PathBuf::from("train.ndjson")
}

fn default_test_ndjson() -> PathBuf {
    PathBuf::from("test.ndjson")
}

fn default_delimiter() -> char {
    ','
}

fn default_quote() -> char {
    '"'
}

fn default_explore_limit() -> usize {
    1000
}

fn default_explore_projection() -> usize {
    120
}

fn default_embedding_dimensions() -> usize {
    2
}

fn default_perplexity() -> f64 {
    30.0
}

fn default_approx_threshold() -> f64 {
    0.5
}

fn default_tsne_iterations() -> usize {
    1000
}

fn default_preliminary_iterations() -> usize {
    250
}

fn default_embedding_output() -> PathBuf {
    PathBuf::from("embedding.csv")
}

fn default_softmax_projection() -> usize {
    110
}

fn default_softmax_batch() -> usize {
    256
}

fn default_optimizer() -> Optimizer {
    Optimizer::momentum(0.001)
}

fn default_l2_penalty() -> f64 {
    1e-4
}

fn default_epochs() -> usize {
    1000
}

fn default_min_change() -> f64 {
    1e-4
}

fn default_window() -> usize {
    5
}

fn default_softmax_model() -> PathBuf {
    PathBuf::from("har.model")
}

fn default_progress_output() -> PathBuf {
    PathBuf::from("progress.csv")
}

fn default_pca_dimensions() -> usize {
    60
}

fn default_hidden_layers() -> Vec<usize> {
    vec![100, 100]
}

fn default_mlp_batch() -> usize {
    128
}

fn default_mlp_optimizer() -> Optimizer {
    Optimizer::adam(0.001)
}

fn default_holdout() -> f64 {
    0.1
}

fn default_mlp_model() -> PathBuf {
    PathBuf::from("har.rbx")
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_max_log_files() -> usize {
    10
}

fn default_log_filter() -> String {
    "info".to_string()
}
