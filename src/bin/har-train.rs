//! Trains the softmax pipeline on `train.ndjson` and optionally saves it.

use std::io;
use std::path::PathBuf;

use har::config::HarConfig;
use har::dataset::ndjson;
use har::logging;
use har::output::write_progress;
use har::persist::{Filesystem, PersistentModel, confirm};
use har::pipeline::{Estimator, Pipeline, Transformer};

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
    let seed = options.seed.or(config.data.seed);
    let settings = &config.softmax;

    println!("Loading data into memory ...");
    let dataset_path = options.dataset.unwrap_or_else(|| config.data.train_ndjson.clone());
    let dataset = ndjson::load_labeled(&dataset_path).map_err(|err| err.to_string())?;

    let model_path = options.model.unwrap_or_else(|| settings.model.clone());
    let persister = Filesystem::new(model_path).map_err(|err| err.to_string())?;
    let mut estimator = PersistentModel::new(
        Pipeline::new(
            vec![
                Transformer::gaussian_random_projector(settings.projection_dimensions)
                    .with_seed(seed),
                Transformer::z_scale_standardizer(),
            ],
            Estimator::softmax(settings.params(seed)),
        ),
        persister,
    );

    println!("Training ...");
    estimator.train(&dataset).map_err(|err| err.to_string())?;

    let progress = options.out.unwrap_or_else(|| settings.progress.clone());
    write_progress(&progress, estimator.steps(), None).map_err(|err| err.to_string())?;
    println!("Progress saved to {}", progress.display());

    let save = options.yes
        || confirm("Save this model? (y|[n]): ", io::stdin().lock(), io::stdout())
            .map_err(|err| err.to_string())?;
    if save {
        estimator.save().map_err(|err| err.to_string())?;
        println!("Model saved to {}", estimator.persister().path().display());
    }
    Ok(())
}

#[derive(Debug, Clone, Default)]
struct CliOptions {
    config: Option<PathBuf>,
    dataset: Option<PathBuf>,
    model: Option<PathBuf>,
    out: Option<PathBuf>,
    seed: Option<u64>,
    yes: bool,
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
            "--seed" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--seed requires a value".to_string())?;
                options.seed = Some(
                    value
                        .parse::<u64>()
                        .map_err(|_| format!("Invalid --seed value: {value}"))?,
                );
            }
            "-y" | "--yes" => {
                options.yes = true;
            }
            unknown => return Err(format!("Unknown argument: {unknown}\n\n{}", help_text())),
        }
        idx += 1;
    }
    Ok(options)
}

fn help_text() -> String {
    [
        "har-train",
        "",
        "Trains a softmax classifier behind a Gaussian random projection and z-scale standardizer.",
        "",
        "Usage:",
        "  har-train [--dataset train.ndjson] [--model har.model]",
        "",
        "Options:",
        "  --config <file>       Config file (default har.toml, or $HAR_CONFIG).",
        "  --dataset <file>      Training NDJSON (default train.ndjson).",
        "  --model <file>        Where to save the model; .model or .rbx (default har.model).",
        "  --out <file>          Loss curve CSV (default progress.csv).",
        "  --seed <n>            RNG seed for projection and batching.",
        "  -y, --yes             Save without prompting.",
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_overrides() {
        let options = parse_args(
            ["--model", "runs/a.rbx", "--seed", "3", "-y"]
                .iter()
                .map(|v| v.to_string())
                .collect(),
        )
        .unwrap();
        assert_eq!(options.model, Some(PathBuf::from("runs/a.rbx")));
        assert_eq!(options.seed, Some(3));
        assert!(options.yes);
    }

    #[test]
    fn help_is_returned_as_error() {
        let err = parse_args(vec!["--help".to_string()]).unwrap_err();
        assert!(err.starts_with("har-train"));
    }
}
