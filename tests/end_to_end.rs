use std::collections::BTreeSet;
use std::path::Path;

use har::dataset::csv::{CsvOptions, load_labeled};
use har::dataset::{DatasetError, Feature, Labeled, ndjson};
use har::ml::embed::Embedder;
use har::ml::mlp::MlpParams;
use har::ml::optimizer::Optimizer;
use har::ml::rng_from;
use har::ml::softmax::SoftmaxParams;
use har::output::{write_embedding, write_progress};
use har::persist::{Filesystem, PersistentModel};
use har::pipeline::{Estimator, Pipeline, Transformer, apply};
use har::report::AggregateReport;
use tempfile::tempdir;

/// Ten rows, three numeric features, labels A and B.
fn write_ab_csv(dir: &Path) -> (std::path::PathBuf, std::path::PathBuf) {
    let samples = dir.join("X.csv");
    let labels = dir.join("y.csv");
    let mut x = String::new();
    let mut y = String::new();
    for i in 0..10 {
        let sign = if i < 5 { -1.0 } else { 1.0 };
        x.push_str(&format!(
            "{},{},{}\n",
            sign * (1.0 + i as f64 * 0.1),
            sign * 2.0,
            0.5 * i as f64
        ));
        y.push_str(if i < 5 { "A\n" } else { "B\n" });
    }
    std::fs::write(&samples, x).unwrap();
    std::fs::write(&labels, y).unwrap();
    (samples, labels)
}

fn softmax_pipeline() -> Pipeline {
    Pipeline::new(
        vec![
            Transformer::NumericStringConverter,
            Transformer::z_scale_standardizer(),
        ],
        Estimator::softmax(SoftmaxParams {
            batch_size: 4,
            optimizer: Optimizer::Stochastic { rate: 0.2 },
            epochs: 60,
            seed: Some(1),
            ..SoftmaxParams::default()
        }),
    )
}

#[test]
fn ten_row_dataset_reports_exactly_its_labels() {
    let dir = tempdir().unwrap();
    let (samples, labels) = write_ab_csv(dir.path());
    let dataset = load_labeled(&samples, &labels, CsvOptions::default()).unwrap();
    assert_eq!(dataset.len(), 10);
    assert_eq!(dataset.feature_width(), 3);

    let mut pipeline = softmax_pipeline();
    pipeline.train(&dataset).unwrap();
    let predictions = pipeline.predict(&dataset).unwrap();
    assert_eq!(predictions.len(), 10);

    let report = AggregateReport::generate(&predictions, dataset.labels()).unwrap();
    let classes: BTreeSet<&str> = report.confusion_matrix.keys().map(String::as_str).collect();
    assert_eq!(classes, BTreeSet::from(["A", "B"]));
    let total: u32 = report
        .confusion_matrix
        .values()
        .flat_map(|row| row.values())
        .sum();
    assert_eq!(total, 10);

    let path = dir.path().join("report.json");
    report.write(&path).unwrap();
    let value: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert!(value.get("multiclass_breakdown").is_some());
    assert!(value.get("confusion_matrix").is_some());
}

#[test]
fn converted_ndjson_trains_and_reloads() {
    let dir = tempdir().unwrap();
    let (samples, labels) = write_ab_csv(dir.path());
    let dataset = load_labeled(&samples, &labels, CsvOptions::default()).unwrap();
    let train_path = dir.path().join("train.ndjson");
    ndjson::write_records(&train_path, &dataset).unwrap();

    let reloaded = ndjson::load_labeled(&train_path).unwrap();
    assert_eq!(reloaded.len(), dataset.len());
    assert_eq!(reloaded.labels(), dataset.labels());

    let model_path = dir.path().join("har.rbx");
    let mut model = PersistentModel::new(
        Pipeline::new(
            vec![
                Transformer::z_scale_standardizer(),
                Transformer::principal_component_analysis(2),
            ],
            Estimator::mlp(MlpParams {
                hidden_layers: vec![6],
                batch_size: 3,
                optimizer: Optimizer::adam(0.01),
                epochs: 15,
                holdout: 0.2,
                seed: Some(4),
                ..MlpParams::default()
            }),
        ),
        Filesystem::new(&model_path).unwrap(),
    );
    model.train(&reloaded).unwrap();
    let progress = dir.path().join("progress.csv");
    write_progress(&progress, model.steps(), model.scores()).unwrap();
    let text = std::fs::read_to_string(&progress).unwrap();
    assert_eq!(text.lines().next(), Some("loss,score"));
    assert_eq!(text.lines().count(), model.steps().len() + 1);

    model.save().unwrap();
    let loaded = PersistentModel::load(Filesystem::new(&model_path).unwrap()).unwrap();
    let predictions = loaded.predict(&reloaded).unwrap();
    assert_eq!(predictions.len(), reloaded.len());
    let domain = reloaded.possible_outcomes();
    assert!(predictions.iter().all(|p| domain.contains(p)));
}

#[test]
fn saved_softmax_model_predicts_training_labels_domain() {
    let dir = tempdir().unwrap();
    let (samples, labels) = write_ab_csv(dir.path());
    let dataset = load_labeled(&samples, &labels, CsvOptions::default()).unwrap();
    let path = dir.path().join("har.model");

    let mut model = PersistentModel::new(softmax_pipeline(), Filesystem::new(&path).unwrap());
    model.train(&dataset).unwrap();
    let before = model.predict(&dataset).unwrap();
    model.save().unwrap();

    let loaded = PersistentModel::load(Filesystem::new(&path).unwrap()).unwrap();
    let after = loaded.predict(&dataset).unwrap();
    assert_eq!(after.len(), dataset.len());
    assert_eq!(after, before);
    assert_eq!(loaded.steps().len(), model.steps().len());
}

#[test]
fn shuffle_then_truncate_keeps_distinct_pairs() {
    let samples = (0..50)
        .map(|i| vec![Feature::from(i as f64), Feature::from(format!("{}", i * 2))])
        .collect();
    let labels = (0..50).map(|i| format!("L{i}")).collect();
    let dataset = Labeled::new(samples, labels).unwrap();

    let sampled = dataset.randomize(&mut rng_from(Some(21))).head(17);
    assert_eq!(sampled.len(), 17);
    let mut seen = BTreeSet::new();
    for (features, label) in sampled.zip() {
        let index = features[0].as_f64().unwrap() as usize;
        assert_eq!(label, format!("L{index}"));
        assert!(seen.insert(index), "row {index} duplicated");
    }
}

#[test]
fn feature_label_count_mismatch_fails() {
    let dir = tempdir().unwrap();
    let (samples, _) = write_ab_csv(dir.path());
    let short_labels = dir.path().join("y_short.csv");
    std::fs::write(&short_labels, "A\nB\n").unwrap();
    for _ in 0..2 {
        let err = load_labeled(&samples, &short_labels, CsvOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            DatasetError::CountMismatch {
                samples: 10,
                labels: 2
            }
        ));
    }
}

#[test]
fn embedding_csv_has_one_row_per_sample() {
    let dir = tempdir().unwrap();
    let (samples, labels) = write_ab_csv(dir.path());
    let mut dataset = load_labeled(&samples, &labels, CsvOptions::default()).unwrap();
    apply(&mut dataset, &mut Transformer::NumericStringConverter).unwrap();

    let embedding = Embedder::Pca { dimensions: 2 }.embed(&dataset).unwrap();
    assert_eq!(embedding.nrows(), dataset.len());

    let path = dir.path().join("embedding.csv");
    write_embedding(&path, &embedding, Some(dataset.labels())).unwrap();
    let text = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "x,y,label");
    assert_eq!(lines.iter().filter(|line| **line == "x,y,label").count(), 1);
    assert_eq!(lines.len(), dataset.len() + 1);
}
