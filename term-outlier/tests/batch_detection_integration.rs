//! Integration tests for in-memory detection.

use std::sync::Arc;

use arrow::array::{Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use term_outlier::config::DetectorConfig;
use term_outlier::dataset::{labels_of, AnomalyLabel, ANOMALY_COLUMN};
use term_outlier::detector::{detect, BatchDetector, DetectionOutcome};
use term_outlier::model::persistence::load_model;
use term_outlier::model::{IsolationForest, ScaledModel};
use term_outlier::test_fixtures::{log_batch, log_batch_with_outlier, unsupported_batch};

fn config() -> DetectorConfig {
    DetectorConfig::builder().parallelism(4).build().unwrap()
}

#[test]
fn test_empty_dataset_returns_two_empty_results() {
    let (annotated, anomalies) = detect(&log_batch(0, 1), 0.05, 10_000).unwrap();
    assert_eq!(annotated.num_rows(), 0);
    assert_eq!(anomalies.num_rows(), 0);
}

#[test]
fn test_unsupported_columns_label_everything_normal() {
    let dataset = unsupported_batch(50);
    let (annotated, anomalies) = detect(&dataset, 0.05, 10_000).unwrap();

    assert_eq!(annotated.num_rows(), 50);
    assert_eq!(anomalies.num_rows(), 0);
    assert!(labels_of(&annotated)
        .unwrap()
        .into_iter()
        .all(|l| l == AnomalyLabel::Normal));
}

#[test]
fn test_anomaly_count_tracks_contamination() {
    let dataset = log_batch(10_000, 2024);
    let result = BatchDetector::new(config())
        .unwrap()
        .detect(&dataset)
        .unwrap();

    assert_eq!(result.outcome, DetectionOutcome::Scored);
    let count = result.anomaly_count();
    assert!(
        (300..=700).contains(&count),
        "expected roughly 500 anomalies, got {count}"
    );
}

#[test]
fn test_repeated_runs_are_identical() {
    let dataset = log_batch(2_000, 77);
    let first = BatchDetector::new(config())
        .unwrap()
        .detect(&dataset)
        .unwrap();
    let second = BatchDetector::new(config())
        .unwrap()
        .detect(&dataset)
        .unwrap();
    assert_eq!(first.labels().unwrap(), second.labels().unwrap());

    let single_threaded = DetectorConfig {
        parallelism: 1,
        ..config()
    };
    let third = BatchDetector::new(single_threaded)
        .unwrap()
        .detect(&dataset)
        .unwrap();
    assert_eq!(first.labels().unwrap(), third.labels().unwrap());
}

#[test]
fn test_strong_outlier_is_returned_with_display_values() {
    let dataset = log_batch_with_outlier(1_000, 421, 5);
    let (annotated, anomalies) = detect(&dataset, 0.05, 10_000).unwrap();

    assert_eq!(labels_of(&annotated).unwrap()[421], AnomalyLabel::Anomalous);

    let hosts = anomalies
        .column_by_name("host")
        .unwrap()
        .as_any()
        .downcast_ref::<StringArray>()
        .unwrap();
    assert!(hosts.iter().flatten().all(|h| h.contains('-')));
    assert_eq!(
        anomalies.schema().fields().last().unwrap().name(),
        ANOMALY_COLUMN
    );
}

#[test]
fn test_missing_values_are_scored() {
    let schema = Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("value", DataType::Float64, true),
        Field::new("kind", DataType::Utf8, true),
    ]));
    let rows = 200;
    let values: Float64Array = (0..rows)
        .map(|i| (i % 5 != 0).then_some((i % 17) as f64))
        .collect();
    let kinds: StringArray = (0..rows)
        .map(|i| (i % 3 != 0).then_some(if i % 2 == 0 { "get" } else { "post" }))
        .collect();
    let dataset = RecordBatch::try_new(
        schema,
        vec![
            Arc::new(Int64Array::from_iter_values(0..rows as i64)),
            Arc::new(values),
            Arc::new(kinds),
        ],
    )
    .unwrap();

    let (annotated, _) = detect(&dataset, 0.1, 10_000).unwrap();
    assert_eq!(annotated.num_rows(), rows);
    assert_eq!(labels_of(&annotated).unwrap().len(), rows);
}

#[test]
fn test_model_is_persisted_when_requested() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("forest.json");
    let config = DetectorConfig::builder()
        .n_estimators(25)
        .model_path(&path)
        .build()
        .unwrap();

    BatchDetector::new(config)
        .unwrap()
        .detect(&log_batch(300, 3))
        .unwrap();

    let model: ScaledModel<IsolationForest> = load_model(&path).unwrap();
    assert_eq!(model.model.trees().len(), 25);
    assert!(model.columns().contains(&"latency_ms".to_string()));
}

#[test]
fn test_unwritable_model_path_does_not_fail_detection() {
    let dir = tempfile::tempdir().unwrap();
    let config = DetectorConfig::builder()
        .n_estimators(25)
        .model_path(dir.path().join("missing").join("forest.json"))
        .build()
        .unwrap();

    let result = BatchDetector::new(config)
        .unwrap()
        .detect(&log_batch(300, 3))
        .unwrap();
    assert_eq!(result.total_rows(), 300);
}
