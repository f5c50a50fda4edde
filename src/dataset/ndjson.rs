//! Newline-delimited JSON records.
//!
//! Each non-empty line is either a JSON array or a JSON object. Object values
//! are taken in key order, so the label must be the last key.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use serde_json::Value;

use super::{DatasetError, Feature, Labeled};

/// Read all records from an NDJSON file.
pub fn read_records(path: &Path) -> Result<Vec<Vec<Feature>>, DatasetError> {
    let io_err = |source| DatasetError::Io {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(io_err)?;
    let reader = BufReader::new(file);
    let mut records = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line.map_err(io_err)?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let value: Value = serde_json::from_str(trimmed).map_err(|source| DatasetError::Json {
            path: path.to_path_buf(),
            line: idx + 1,
            source,
        })?;
        let values = match value {
            Value::Array(values) => values,
            Value::Object(map) => map.into_iter().map(|(_, value)| value).collect(),
            other => {
                return Err(DatasetError::InvalidRecord {
                    path: path.to_path_buf(),
                    line: idx + 1,
                    reason: format!("expected array or object, got {other}"),
                });
            }
        };
        let mut record = Vec::with_capacity(values.len());
        for value in values {
            record.push(to_feature(value).map_err(|reason| DatasetError::InvalidRecord {
                path: path.to_path_buf(),
                line: idx + 1,
                reason,
            })?);
        }
        records.push(record);
    }
    Ok(records)
}

/// Load a labeled dataset whose label is the last value of each record.
pub fn load_labeled(path: &Path) -> Result<Labeled, DatasetError> {
    Labeled::from_records(read_records(path)?)
}

/// Write a labeled dataset as one JSON array per line, label last.
pub fn write_records(path: &Path, dataset: &Labeled) -> Result<(), DatasetError> {
    let io_err = |source| DatasetError::Io {
        path: path.to_path_buf(),
        source,
    };
    let file = File::create(path).map_err(io_err)?;
    let mut writer = BufWriter::new(file);
    for (features, label) in dataset.zip() {
        let mut row: Vec<Value> = features.iter().map(feature_to_json).collect();
        row.push(Value::String(label.to_string()));
        let line = serde_json::to_string(&row).map_err(|source| DatasetError::Json {
            path: path.to_path_buf(),
            line: 0,
            source,
        })?;
        writeln!(writer, "{line}").map_err(io_err)?;
    }
    writer.flush().map_err(io_err)
}

fn to_feature(value: Value) -> Result<Feature, String> {
    match value {
        Value::Number(number) => number
            .as_f64()
            .map(Feature::Continuous)
            .ok_or_else(|| format!("unrepresentable number {number}")),
        Value::String(text) => Ok(Feature::Categorical(text)),
        Value::Bool(flag) => Ok(Feature::Categorical(flag.to_string())),
        other => Err(format!("unsupported value {other}")),
    }
}

fn feature_to_json(feature: &Feature) -> Value {
    match feature {
        Feature::Continuous(value) => serde_json::Number::from_f64(*value)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Feature::Categorical(text) => match text.trim().parse::<f64>() {
            Ok(parsed) if parsed.is_finite() => serde_json::Number::from_f64(parsed)
                .map(Value::Number)
                .unwrap_or_else(|| Value::String(text.clone())),
            _ => Value::String(text.clone()),
        },
    }
}
