//! Saving and loading trained pipelines.
//!
//! `.model` files hold plain JSON. `.rbx` files hold the same JSON as a single
//! deflated entry inside a zip archive. Writes go to a temporary file in the
//! destination directory and are renamed into place once complete.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::dataset::Labeled;
use crate::pipeline::{Pipeline, PipelineError};

/// Bumped whenever the serialized pipeline layout changes.
pub const FORMAT_VERSION: u32 = 1;
const ARCHIVE_ENTRY: &str = "model.json";

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("I/O error at {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("invalid model JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("model archive error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("unsupported model extension for {0} (expected .model or .rbx)")]
    UnsupportedExtension(PathBuf),
    #[error("model format version {found} is not supported (expected {expected})")]
    FormatVersion { found: u32, expected: u32 },
    #[error("refusing to save an untrained pipeline")]
    Untrained,
    #[error("refusing to save a pipeline with NaN or infinite parameters")]
    NonFinite,
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

fn io_err(path: &Path) -> impl Fn(io::Error) -> PersistError + '_ {
    move |source| PersistError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Json,
    Archive,
}

impl Encoding {
    fn for_path(path: &Path) -> Result<Self, PersistError> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("model") => Ok(Encoding::Json),
            Some(ext) if ext.eq_ignore_ascii_case("rbx") => Ok(Encoding::Archive),
            _ => Err(PersistError::UnsupportedExtension(path.to_path_buf())),
        }
    }
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    format_version: u32,
    pipeline: &'a Pipeline,
}

#[derive(Deserialize)]
struct Snapshot {
    format_version: u32,
    pipeline: Pipeline,
}

/// Persists a pipeline at a fixed path on the local filesystem.
#[derive(Debug, Clone)]
pub struct Filesystem {
    path: PathBuf,
    encoding: Encoding,
}

impl Filesystem {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, PersistError> {
        let path = path.into();
        let encoding = Encoding::for_path(&path)?;
        Ok(Self { path, encoding })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    pub fn save(&self, pipeline: &Pipeline) -> Result<(), PersistError> {
        // serde_json writes NaN as null, which no longer deserializes as f64.
        if !pipeline.is_finite() {
            return Err(PersistError::NonFinite);
        }
        let snapshot = SnapshotRef {
            format_version: FORMAT_VERSION,
            pipeline,
        };
        let json = serde_json::to_vec(&snapshot)?;
        let mut temp = create_tempfile(&self.path)?;
        match self.encoding {
            Encoding::Json => temp
                .as_file_mut()
                .write_all(&json)
                .map_err(io_err(&self.path))?,
            Encoding::Archive => {
                let mut zip = zip::ZipWriter::new(temp.as_file_mut());
                let options = zip::write::SimpleFileOptions::default()
                    .compression_method(zip::CompressionMethod::Deflated);
                zip.start_file(ARCHIVE_ENTRY, options)?;
                zip.write_all(&json).map_err(io_err(&self.path))?;
                zip.finish()?;
            }
        }
        temp.as_file_mut().sync_all().map_err(io_err(&self.path))?;
        temp.persist(&self.path)
            .map_err(|err| PersistError::Io {
                path: self.path.clone(),
                source: err.error,
            })?;
        info!(path = %self.path.display(), "Model saved");
        Ok(())
    }

    pub fn load(&self) -> Result<Pipeline, PersistError> {
        let file = File::open(&self.path).map_err(io_err(&self.path))?;
        let snapshot: Snapshot = match self.encoding {
            Encoding::Json => serde_json::from_reader(BufReader::new(file))?,
            Encoding::Archive => {
                let mut archive = zip::ZipArchive::new(file)?;
                let mut entry = archive.by_name(ARCHIVE_ENTRY)?;
                let mut json = Vec::new();
                entry.read_to_end(&mut json).map_err(io_err(&self.path))?;
                serde_json::from_slice(&json)?
            }
        };
        if snapshot.format_version != FORMAT_VERSION {
            return Err(PersistError::FormatVersion {
                found: snapshot.format_version,
                expected: FORMAT_VERSION,
            });
        }
        info!(path = %self.path.display(), "Model loaded");
        Ok(snapshot.pipeline)
    }
}

fn create_tempfile(path: &Path) -> Result<tempfile::NamedTempFile, PersistError> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    tempfile::Builder::new()
        .prefix(".har_model")
        .tempfile_in(dir)
        .map_err(io_err(path))
}

/// A pipeline bound to the place it is saved.
#[derive(Debug, Clone)]
pub struct PersistentModel {
    pipeline: Pipeline,
    persister: Filesystem,
}

impl PersistentModel {
    pub fn new(pipeline: Pipeline, persister: Filesystem) -> Self {
        Self {
            pipeline,
            persister,
        }
    }

    pub fn load(persister: Filesystem) -> Result<Self, PersistError> {
        let pipeline = persister.load()?;
        Ok(Self {
            pipeline,
            persister,
        })
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn persister(&self) -> &Filesystem {
        &self.persister
    }

    pub fn train(&mut self, dataset: &Labeled) -> Result<(), PersistError> {
        Ok(self.pipeline.train(dataset)?)
    }

    pub fn predict(&self, dataset: &Labeled) -> Result<Vec<String>, PersistError> {
        Ok(self.pipeline.predict(dataset)?)
    }

    pub fn steps(&self) -> &[f64] {
        self.pipeline.steps()
    }

    pub fn scores(&self) -> Option<&[f64]> {
        self.pipeline.scores()
    }

    pub fn save(&self) -> Result<(), PersistError> {
        if !self.pipeline.trained() {
            return Err(PersistError::Untrained);
        }
        self.persister.save(&self.pipeline)
    }
}

/// Print `prompt` and read one line. Only `y` or `Y` counts as yes.
pub fn confirm(prompt: &str, mut input: impl BufRead, mut output: impl Write) -> io::Result<bool> {
    output.write_all(prompt.as_bytes())?;
    output.flush()?;
    let mut line = String::new();
    input.read_line(&mut line)?;
    Ok(matches!(line.trim(), "y" | "Y"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Feature;
    use crate::ml::optimizer::Optimizer;
    use crate::ml::softmax::SoftmaxParams;
    use crate::pipeline::{Estimator, Transformer};
    use std::io::Cursor;
    use tempfile::tempdir;

    fn dataset() -> Labeled {
        let samples = (0..12)
            .map(|i| {
                let side = if i % 3 == 0 { 2.0 } else { -2.0 };
                vec![Feature::from(side + i as f64 * 0.01), Feature::from(side)]
            })
            .collect();
        let labels = (0..12)
            .map(|i| if i % 3 == 0 { "SITTING" } else { "STANDING" }.to_string())
            .collect();
        Labeled::new(samples, labels).unwrap()
    }

    fn trained_pipeline() -> Pipeline {
        let mut pipeline = Pipeline::new(
            vec![Transformer::z_scale_standardizer()],
            Estimator::softmax(SoftmaxParams {
                batch_size: 4,
                optimizer: Optimizer::Stochastic { rate: 0.2 },
                epochs: 50,
                seed: Some(9),
                ..SoftmaxParams::default()
            }),
        );
        pipeline.train(&dataset()).unwrap();
        pipeline
    }

    #[test]
    fn encoding_follows_extension() {
        assert_eq!(Filesystem::new("har.model").unwrap().encoding(), Encoding::Json);
        assert_eq!(Filesystem::new("har.rbx").unwrap().encoding(), Encoding::Archive);
        assert!(matches!(
            Filesystem::new("har.bin"),
            Err(PersistError::UnsupportedExtension(_))
        ));
    }

    #[test]
    fn both_encodings_reload_identical_predictions() {
        let dir = tempdir().unwrap();
        let pipeline = trained_pipeline();
        let expected = pipeline.predict(&dataset()).unwrap();
        for name in ["har.model", "har.rbx"] {
            let persister = Filesystem::new(dir.path().join(name)).unwrap();
            persister.save(&pipeline).unwrap();
            let loaded = PersistentModel::load(persister).unwrap();
            assert_eq!(loaded.predict(&dataset()).unwrap(), expected);
        }
    }

    #[test]
    fn json_model_records_format_version() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("har.model");
        Filesystem::new(&path).unwrap().save(&trained_pipeline()).unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["format_version"], FORMAT_VERSION);
    }

    #[test]
    fn newer_format_version_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("har.model");
        Filesystem::new(&path).unwrap().save(&trained_pipeline()).unwrap();
        let mut value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        value["format_version"] = serde_json::json!(FORMAT_VERSION + 1);
        std::fs::write(&path, value.to_string()).unwrap();
        assert!(matches!(
            Filesystem::new(&path).unwrap().load(),
            Err(PersistError::FormatVersion { .. })
        ));
    }

    #[test]
    fn untrained_model_is_not_saved() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("har.model");
        let model = PersistentModel::new(
            Pipeline::new(vec![], Estimator::softmax(SoftmaxParams::default())),
            Filesystem::new(&path).unwrap(),
        );
        assert!(matches!(model.save(), Err(PersistError::Untrained)));
        assert!(!path.exists());
    }

    #[test]
    fn non_finite_pipeline_is_not_saved() {
        let dir = tempdir().unwrap();
        let mut pipeline = trained_pipeline();
        if let Transformer::ZScaleStandardizer {
            stddevs: Some(stddevs),
            ..
        } = &mut pipeline.transformers_mut()[0]
        {
            stddevs[1] = f64::INFINITY;
        }
        for name in ["har.model", "har.rbx"] {
            let path = dir.path().join(name);
            let model = PersistentModel::new(pipeline.clone(), Filesystem::new(&path).unwrap());
            assert!(matches!(model.save(), Err(PersistError::NonFinite)));
            assert!(!path.exists());
        }
    }

    #[test]
    fn confirm_accepts_only_y() {
        for (answer, expected) in [
            ("y\n", true),
            ("Y\n", true),
            ("  y  \n", true),
            ("yes\n", false),
            ("n\n", false),
            ("\n", false),
            ("", false),
        ] {
            let mut shown = Vec::new();
            let result = confirm("Save this model? (y|[n]): ", Cursor::new(answer), &mut shown)
                .unwrap();
            assert_eq!(result, expected, "answer {answer:?}");
            assert_eq!(shown, b"Save this model? (y|[n]): ");
        }
    }
}
