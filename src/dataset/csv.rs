//! CSV extraction for feature matrices and label columns.

use std::path::Path;

use super::{DatasetError, Feature, Labeled};

/// Dialect used when reading CSV files.
#[derive(Debug, Clone, Copy)]
pub struct CsvOptions {
    pub delimiter: u8,
    pub quote: u8,
    /// Skip the first row.
    pub has_header: bool,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            quote: b'"',
            has_header: false,
        }
    }
}

fn reader(path: &Path, options: CsvOptions) -> Result<::csv::Reader<std::fs::File>, DatasetError> {
    ::csv::ReaderBuilder::new()
        .delimiter(options.delimiter)
        .quote(options.quote)
        .has_headers(options.has_header)
        .flexible(true)
        .from_path(path)
        .map_err(|source| DatasetError::Csv {
            path: path.to_path_buf(),
            source,
        })
}

/// Read every row as string fields.
pub fn read_records(path: &Path, options: CsvOptions) -> Result<Vec<Vec<String>>, DatasetError> {
    let mut rows = Vec::new();
    for record in reader(path, options)?.records() {
        let record = record.map_err(|source| DatasetError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        rows.push(record.iter().map(str::to_string).collect());
    }
    Ok(rows)
}

/// Read a single column from every row.
pub fn fetch_column(
    path: &Path,
    column: usize,
    options: CsvOptions,
) -> Result<Vec<String>, DatasetError> {
    let rows = read_records(path, options)?;
    let mut values = Vec::with_capacity(rows.len());
    for (row, mut fields) in rows.into_iter().enumerate() {
        if column >= fields.len() {
            return Err(DatasetError::RaggedRow {
                row,
                expected: column + 1,
                found: fields.len(),
            });
        }
        values.push(fields.swap_remove(column));
    }
    Ok(values)
}

/// Load a labeled dataset from a feature file and a single-column label file.
///
/// Cells stay as strings; row `i` of the label file labels row `i` of the
/// feature file.
pub fn load_labeled(
    samples_path: &Path,
    labels_path: &Path,
    options: CsvOptions,
) -> Result<Labeled, DatasetError> {
    let samples = read_records(samples_path, options)?
        .into_iter()
        .map(|row| row.into_iter().map(Feature::Categorical).collect())
        .collect();
    let labels = fetch_column(labels_path, 0, options)?;
    Labeled::new(samples, labels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn loads_quoted_fields_as_strings() {
        let dir = tempdir().unwrap();
        let x = dir.path().join("X.csv");
        let y = dir.path().join("y.csv");
        std::fs::write(&x, "\"0.25\",1e-3\n-0.5,\"2\"\n").unwrap();
        std::fs::write(&y, "WALKING\n\"SITTING\"\n").unwrap();

        let dataset = load_labeled(&x, &y, CsvOptions::default()).unwrap();
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.samples()[0][0], Feature::from("0.25"));
        assert_eq!(dataset.samples()[1][1], Feature::from("2"));
        assert_eq!(dataset.labels()[1], "SITTING");
    }

    #[test]
    fn label_count_mismatch_fails() {
        let dir = tempdir().unwrap();
        let x = dir.path().join("X.csv");
        let y = dir.path().join("y.csv");
        std::fs::write(&x, "1,2\n3,4\n5,6\n").unwrap();
        std::fs::write(&y, "A\nB\n").unwrap();

        let err = load_labeled(&x, &y, CsvOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            DatasetError::CountMismatch {
                samples: 3,
                labels: 2
            }
        ));
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope.csv");
        assert!(read_records(&missing, CsvOptions::default()).is_err());
    }
}
