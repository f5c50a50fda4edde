//! Scores a saved model against `test.ndjson` and writes `report.json`.

use std::path::PathBuf;

use har::config::HarConfig;
use har::dataset::ndjson;
use har::logging;
use har::persist::{Filesystem, PersistentModel};
use har::report::AggregateReport;

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

    println!("Loading data into memory ...");
    let dataset_path = options.dataset.unwrap_or_else(|| config.data.test_ndjson.clone());
    let dataset = ndjson::load_labeled(&dataset_path).map_err(|err| err.to_string())?;

    let model_path = options.model.unwrap_or_else(|| config.softmax.model.clone());
    let persister = Filesystem::new(model_path).map_err(|err| err.to_string())?;
    let estimator = PersistentModel::load(persister).map_err(|err| err.to_string())?;

    println!("Making predictions ...");
    let predictions = estimator.predict(&dataset).map_err(|err| err.to_string())?;

    let report =
        AggregateReport::generate(&predictions, dataset.labels()).map_err(|err| err.to_string())?;
    println!("{report}");

    let output = options.out.unwrap_or_else(|| PathBuf::from("report.json"));
    report.write(&output).map_err(|err| err.to_string())?;
    println!("Report saved to {}", output.display());
    Ok(())
}

#[derive(Debug, Clone, Default)]
struct CliOptions {
    config: Option<PathBuf>,
    dataset: Option<PathBuf>,
    model: Option<PathBuf>,
    out: Option<PathBuf>,
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
            "--dataset" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--dataset requires a value".to_string())?;
                options.dataset = Some(PathBuf::from(value));
            }
            "--model" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--model requires a value".to_string())?;
                options.model = Some(PathBuf::from(value));
            }
            "--out" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--out requires a value".to_string())?;
                options.out = Some(PathBuf::from(value));
            }
            unknown => return Err(format!("Unknown argument: {unknown}\n\n{}", help_text())),
        }
        idx += 1;
    }
    Ok(options)
}

fn help_text() -> String {
    [
        "har-validate",
        "",
        "Predicts the test set with a saved model and writes a multiclass report.",
        "",
        "Usage:",
        "  har-validate [--dataset test.ndjson] [--model har.model] [--out report.json]",
        "",
        "Options:",
        "  --config <file>       Config file (default har.toml, or $HAR_CONFIG).",
        "  --dataset <file>      Test NDJSON (default test.ndjson).",
        "  --model <file>        Saved .model or .rbx file (default har.model).",
        "  --out <file>          Report JSON (default report.json).",
    ]
    .join("\n")
}
