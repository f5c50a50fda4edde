//! Embeds a random sample of the HAR training set in two dimensions for plotting.

use std::path::PathBuf;

use har::config::HarConfig;
use har::dataset::csv::load_labeled;
use har::logging;
use har::ml::embed::Embedder;
use har::ml::rng_from;
use har::output::write_embedding;
use har::pipeline::{Transformer, apply};

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

    println!("Loading data into memory ...");
    let csv = config.data.csv_options().map_err(|err| err.to_string())?;
    let dataset = load_labeled(&config.data.train_samples, &config.data.train_labels, csv)
        .map_err(|err| err.to_string())?;
    let limit = options.limit.unwrap_or(config.data.explore_limit);
    let mut dataset = dataset.randomize(&mut rng_from(seed)).head(limit);
    println!("Sampled {} of the training rows", dataset.len());

    apply(&mut dataset, &mut Transformer::NumericStringConverter).map_err(|err| err.to_string())?;
    let mut projector =
        Transformer::sparse_random_projector(config.explore.projection_dimensions).with_seed(seed);
    apply(&mut dataset, &mut projector).map_err(|err| err.to_string())?;

    let embedder = match options.embedder {
        EmbedderKind::TSne => Embedder::TSne(config.explore.tsne_options(seed)),
        EmbedderKind::Pca => Embedder::Pca {
            dimensions: config.explore.dimensions,
        },
    };
    println!("Embedding ...");
    let embedding = embedder.embed(&dataset).map_err(|err| err.to_string())?;

    let output = options.out.unwrap_or(config.explore.output);
    let labels = (!options.no_labels).then(|| dataset.labels());
    write_embedding(&output, &embedding, labels).map_err(|err| err.to_string())?;
    println!("Embedding saved to {}", output.display());
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EmbedderKind {
    TSne,
    Pca,
}

#[derive(Debug, Clone)]
struct CliOptions {
    config: Option<PathBuf>,
    out: Option<PathBuf>,
    embedder: EmbedderKind,
    no_labels: bool,
    limit: Option<usize>,
    seed: Option<u64>,
}

fn parse_args(args: Vec<String>) -> Result<CliOptions, String> {
    let mut config = None;
    let mut out = None;
    let mut embedder = EmbedderKind::TSne;
    let mut no_labels = false;
    let mut limit = None;
    let mut seed = None;

    let mut idx = 0usize;
    while idx < args.len() {
        match args[idx].as_str() {
            "-h" | "--help" => return Err(help_text()),
            "--config" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--config requires a value".to_string())?;
                config = Some(PathBuf::from(value));
            }
            "--out" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--out requires a value".to_string())?;
                out = Some(PathBuf::from(value));
            }
            "--embedder" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| "--embedder requires a value".to_string())?;
                embedder = match value.to_ascii_lowercase().as_str() {
                    "tsne" | "t-sne" => EmbedderKind::TSne,
                    "pca" => EmbedderKind::Pca,
                    other => {
                        return Err(format!("Unknown embedder: {other} (expected tsne or pca)"));
                    }
                };
            }
            "--no-labels" => {
                no_labels = true;
            }
            "--limit" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--limit requires a value".to_string())?;
                let parsed = value
                    .parse::<usize>()
                    .map_err(|_| format!("Invalid --limit value: {value}"))?;
                if parsed == 0 {
                    return Err("--limit must be > 0".to_string());
                }
                limit = Some(parsed);
            }
            "--seed" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--seed requires a value".to_string())?;
                seed = Some(
                    value
                        .parse::<u64>()
                        .map_err(|_| format!("Invalid --seed value: {value}"))?,
                );
            }
            unknown => return Err(format!("Unknown argument: {unknown}\n\n{}", help_text())),
        }
        idx += 1;
    }

    Ok(CliOptions {
        config,
        out,
        embedder,
        no_labels,
        limit,
        seed,
    })
}

fn help_text() -> String {
    [
        "har-explore",
        "",
        "Embeds a shuffled sample of the HAR training set in 2-D and writes a CSV for plotting.",
        "",
        "Usage:",
        "  har-explore [--embedder tsne|pca] [--out embedding.csv]",
        "",
        "Options:",
        "  --config <file>       Config file (default har.toml, or $HAR_CONFIG).",
        "  --out <file>          Output CSV (default embedding.csv).",
        "  --embedder <kind>     tsne (default) or pca.",
        "  --no-labels           Write only x,y columns.",
        "  --limit <n>           Rows kept after shuffling (default 1000).",
        "  --seed <n>            RNG seed for shuffling, projection and t-SNE.",
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn no_flags_means_tsne_with_labels() {
        let options = parse_args(vec![]).unwrap();
        assert_eq!(options.embedder, EmbedderKind::TSne);
        assert!(!options.no_labels);
        assert!(options.out.is_none());
    }

    #[test]
    fn pca_without_labels() {
        let options =
            parse_args(args(&["--embedder", "PCA", "--no-labels", "--out", "tsne.csv"])).unwrap();
        assert_eq!(options.embedder, EmbedderKind::Pca);
        assert!(options.no_labels);
        assert_eq!(options.out, Some(PathBuf::from("tsne.csv")));
    }

    #[test]
    fn rejects_unknown_embedder_and_zero_limit() {
        assert!(parse_args(args(&["--embedder", "umap"])).is_err());
        assert!(parse_args(args(&["--limit", "0"])).is_err());
    }
}
