//! CSV writers for embeddings and training progress.
//!
//! Every file starts with exactly one header row.

use std::path::{Path, PathBuf};

use ndarray::Array2;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("csv error writing {path}: {source}")]
    Csv { path: PathBuf, source: csv::Error },
    #[error("{rows} rows but {labels} labels")]
    LabelCount { rows: usize, labels: usize },
    #[error("{losses} losses but {scores} scores")]
    ScoreCount { losses: usize, scores: usize },
    #[error("embedding has {0} columns, expected 2")]
    NotPlanar(usize),
}

fn writer(path: &Path) -> Result<csv::Writer<std::fs::File>, OutputError> {
    csv::Writer::from_path(path).map_err(|source| OutputError::Csv {
        path: path.to_path_buf(),
        source,
    })
}

fn csv_err(path: &Path) -> impl Fn(csv::Error) -> OutputError + '_ {
    move |source| OutputError::Csv {
        path: path.to_path_buf(),
        source,
    }
}

/// Write 2-D coordinates with header `x,y`, or `x,y,label` when labels are given.
pub fn write_embedding(
    path: &Path,
    coords: &Array2<f64>,
    labels: Option<&[String]>,
) -> Result<usize, OutputError> {
    if coords.ncols() != 2 {
        return Err(OutputError::NotPlanar(coords.ncols()));
    }
    if let Some(labels) = labels
        && labels.len() != coords.nrows()
    {
        return Err(OutputError::LabelCount {
            rows: coords.nrows(),
            labels: labels.len(),
        });
    }
    let mut out = writer(path)?;
    let header = match labels {
        Some(_) => out.write_record(["x", "y", "label"]),
        None => out.write_record(["x", "y"]),
    };
    header.map_err(csv_err(path))?;
    for (idx, row) in coords.rows().into_iter().enumerate() {
        let x = row[0].to_string();
        let y = row[1].to_string();
        let written = match labels {
            Some(labels) => out.write_record([x.as_str(), y.as_str(), labels[idx].as_str()]),
            None => out.write_record([x.as_str(), y.as_str()]),
        };
        written.map_err(csv_err(path))?;
    }
    out.flush().map_err(|err| OutputError::Csv {
        path: path.to_path_buf(),
        source: err.into(),
    })?;
    Ok(coords.nrows())
}

/// Write per-epoch losses with header `loss`, or `loss,score` when scores are given.
pub fn write_progress(
    path: &Path,
    losses: &[f64],
    scores: Option<&[f64]>,
) -> Result<usize, OutputError> {
    if let Some(scores) = scores
        && scores.len() != losses.len()
    {
        return Err(OutputError::ScoreCount {
            losses: losses.len(),
            scores: scores.len(),
        });
    }
    let mut out = writer(path)?;
    let header = match scores {
        Some(_) => out.write_record(["loss", "score"]),
        None => out.write_record(["loss"]),
    };
    header.map_err(csv_err(path))?;
    for (idx, loss) in losses.iter().enumerate() {
        let loss = loss.to_string();
        let written = match scores {
            Some(scores) => out.write_record([loss, scores[idx].to_string()]),
            None => out.write_record([loss]),
        };
        written.map_err(csv_err(path))?;
    }
    out.flush().map_err(|err| OutputError::Csv {
        path: path.to_path_buf(),
        source: err.into(),
    })?;
    Ok(losses.len())
}
