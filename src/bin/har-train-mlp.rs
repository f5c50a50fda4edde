//! Trains the multilayer perceptron pipeline on `train.ndjson`.

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
    let mut settings = config.mlp.clone();
    if let Some(hidden) = options.hidden {
        settings.hidden_layers = hidden;
    }
    if let Some(epochs) = options.epochs {
        settings.epochs = epochs;
    }
    settings
        .params(seed)
        .validate()
        .map_err(|err| err.to_string())?;

    println!("Loading data into memory ...");
    let dataset_path = options.dataset.unwrap_or_else(|| config.data.train_ndjson.clone());
    let dataset = ndjson::load_labeled(&dataset_path).map_err(|err| err.to_string())?;

    let model_path = options.model.unwrap_or_else(|| settings.model.clone());
    let persister = Filesystem::new(model_path).map_err(|err| err.to_string())?;
    let mut estimator = PersistentModel::new(
        Pipeline::new(
            vec![
                Transformer::z_scale_standardizer(),
                Transformer::principal_component_analysis(settings.pca_dimensions),
            ],
            Estimator::mlp(settings.params(seed)),
        ),
        persister,
    );

    println!("Training ...");
    estimator.train(&dataset).map_err(|err| err.to_string())?;

    let progress = options.out.unwrap_or_else(|| settings.progress.clone());
    write_progress(&progress, estimator.steps(), estimator.scores())
        .map_err(|err| err.to_string())?;
    println!("Progress saved to {}", progress.display());
    if let Some(best) = estimator
        .scores()
        .and_then(|scores| scores.iter().copied().reduce(f64::max))
    {
        println!("Best holdout accuracy: {best:.4}");
    }

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
    hidden: Option<Vec<usize>>,
    epochs: Option<usize>,
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
            "--hidden" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--hidden requires a value".to_string())?;
                options.hidden = Some(parse_hidden(value)?);
            }
            "--epochs" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--epochs requires a value".to_string())?;
                options.epochs = Some(
                    value
                        .parse::<usize>()
                        .map_err(|_| format!("Invalid --epochs value: {value}"))?,
                );
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

/// Comma-separated layer widths, e.g. `100,50`.
fn parse_hidden(value: &str) -> Result<Vec<usize>, String> {
    value
        .split(',')
        .map(|part| {
            part.trim()
                .parse::<usize>()
                .ok()
                .filter(|width| *width > 0)
                .ok_or_else(|| format!("Invalid --hidden value: {value}"))
        })
        .collect()
}

fn help_text() -> String {
    [
        "har-train-mlp",
        "",
        "Trains a multilayer perceptron behind a z-scale standardizer and PCA.",
        "",
        "Usage:",
        "  har-train-mlp [--dataset train.ndjson] [--model har.rbx]",
        "",
        "Options:",
        "  --config <file>       Config file (default har.toml, or $HAR_CONFIG).",
        "  --dataset <file>      Training NDJSON (default train.ndjson).",
        "  --model <file>        Where to save the model; .model or .rbx (default har.rbx).",
        "  --out <file>          Loss/score curve CSV (default progress.csv).",
        "  --hidden <n,n,...>    Hidden layer widths (default 100,100).",
        "  --epochs <n>          Maximum training epochs (default 1000).",
        "  --seed <n>            RNG seed for initialization, dropout and batching.",
        "  -y, --yes             Save without prompting.",
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hidden_layers_parse_as_list() {
        assert_eq!(parse_hidden("100, 50").unwrap(), vec![100, 50]);
        assert!(parse_hidden("100,0").is_err());
        assert!(parse_hidden("wide").is_err());
    }

    #[test]
    fn missing_value_is_reported() {
        let err = parse_args(vec!["--epochs".to_string()]).unwrap_err();
        assert_eq!(err, "--epochs requires a value");
    }
}
