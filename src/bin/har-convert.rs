//! Converts the HAR CSV splits into the NDJSON files the training runners read.

use std::path::{Path, PathBuf};

use har::config::HarConfig;
use har::dataset::csv::{CsvOptions, load_labeled};
use har::dataset::ndjson;
use har::logging;

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let options = parse_args(std::env::args().skip(1).collect())?;
    let config =
        HarConfig::load_or_default(options.config.as_deref()).map_err(|err| err.to_string())?;
    if let Err(err) = logging::init(&config.logging) {
        eprintln!("Logging disabled: {err}");
    }
    let csv = config.data.csv_options().map_err(|err| err.to_string())?;
    let data = &config.data;

    convert(&data.train_samples, &data.train_labels, &data.train_ndjson, csv)?;
    if data.test_samples.is_file() && data.test_labels.is_file() {
        convert(&data.test_samples, &data.test_labels, &data.test_ndjson, csv)?;
    } else {
        println!(
            "Skipping test split: {} not found",
            data.test_samples.display()
        );
    }
    Ok(())
}

fn convert(samples: &Path, labels: &Path, output: &Path, csv: CsvOptions) -> Result<(), String> {
    println!("Reading {} and {} ...", samples.display(), labels.display());
    let dataset = load_labeled(samples, labels, csv).map_err(|err| err.to_string())?;
    ndjson::write_records(output, &dataset).map_err(|err| err.to_string())?;
    println!("Wrote {} rows to {}", dataset.len(), output.display());
    Ok(())
}

#[derive(Debug, Clone, Default)]
struct CliOptions {
    config: Option<PathBuf>,
}

fn parse_args(args: Vec<String>) -> Result<CliOptions, String> {
    let mut options = CliOptions::default();
    let mut idx = 0usize;
    while idx < args.len() {
        match args[idx].as_str() {
            "-h" | "--help" => return Err(help_text()),
            "--config" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--config requires a value".to_string())?;
                options.config = Some(PathBuf::from(value));
            }
            unknown => return Err(format!("Unknown argument: {unknown}\n\n{}", help_text())),
        }
        idx += 1;
    }
    Ok(options)
}

fn help_text() -> String {
    [
        "har-convert",
        "",
        "Joins X/y CSV files into train.ndjson and test.ndjson (label last on each line).",
        "",
        "Usage:",
        "  har-convert [--config har.toml]",
        "",
        "Paths come from the [data] section of the config file.",
    ]
    .join("\n")
}
