//! Integration tests for chunked detection and file-level analysis.

use std::sync::{Arc, Mutex, Weak};

use arrow::array::{Array, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use term_outlier::config::DetectorConfig;
use term_outlier::dataset::ANOMALY_COLUMN;
use term_outlier::detector::{
    analyze_csv, analyze_csv_as, detect, detect_streaming, AnalysisMode, DetectionOutcome,
    StreamingDetector,
};
use term_outlier::error::{Result, TermOutlierError};
use term_outlier::sources::{write_csv, ChunkIter, ChunkSource, CsvOptions, CsvSource, MemorySource};
use term_outlier::test_fixtures::{
    log_batch, log_batch_with_outlier, unsupported_batch, FailingSource,
};

fn config(chunk_size: usize) -> DetectorConfig {
    DetectorConfig::builder()
        .n_estimators(100)
        .chunk_size(chunk_size)
        .sample_rows(1_000)
        .parallelism(2)
        .build()
        .unwrap()
}

fn request_ids(batch: &RecordBatch) -> Vec<i64> {
    batch
        .column_by_name("request_id")
        .unwrap()
        .as_any()
        .downcast_ref::<Int64Array>()
        .unwrap()
        .iter()
        .flatten()
        .collect()
}

#[test]
fn test_empty_source_returns_one_empty_result() {
    let anomalies = detect_streaming(&MemorySource::default(), 0.05, 100_000, 200_000).unwrap();
    assert_eq!(anomalies.num_rows(), 0);
}

#[test]
fn test_unsupported_columns_return_empty_result_with_schema() {
    let source = MemorySource::from_batch(unsupported_batch(40));
    let anomalies = detect_streaming(&source, 0.05, 100, 16).unwrap();
    assert_eq!(anomalies.num_rows(), 0);
    let names: Vec<_> = anomalies
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect();
    assert_eq!(names, vec!["flag", "payload", ANOMALY_COLUMN]);
}

#[test]
fn test_chunk_missing_a_column_is_scored() {
    let full = log_batch(600, 11);
    let partial = {
        let schema = full.schema();
        let keep: Vec<usize> = schema
            .fields()
            .iter()
            .enumerate()
            .filter(|(_, f)| f.name() != "latency_ms")
            .map(|(i, _)| i)
            .collect();
        log_batch(300, 12).project(&keep).unwrap()
    };
    let source = MemorySource::new(vec![full, partial]);

    let result = StreamingDetector::new(config(200))
        .unwrap()
        .detect(&source)
        .unwrap();
    assert_eq!(result.outcome, DetectionOutcome::Scored);
    assert_eq!(result.rows_seen, 900);
    assert!(result.feature_columns.contains(&"latency_ms".to_string()));

    // Rows from the short chunk carry a null latency in the output.
    let schema = result.anomalies.schema();
    assert!(schema.field_with_name("latency_ms").unwrap().is_nullable());
}

#[test]
fn test_later_chunk_with_different_types_is_aligned() {
    let first = log_batch(400, 21);
    let odd_schema = Arc::new(Schema::new(vec![
        Field::new("request_id", DataType::Utf8, false),
        Field::new("bytes", DataType::Float64, false),
        Field::new("referrer", DataType::Utf8, false),
    ]));
    let odd = RecordBatch::try_new(
        odd_schema,
        vec![
            Arc::new(StringArray::from(vec!["999999999", "x"])),
            Arc::new(Float64Array::from(vec![1e12, 5_000.0])),
            Arc::new(StringArray::from(vec!["a", "b"])),
        ],
    )
    .unwrap();
    let source = MemorySource::new(vec![first.clone(), odd]);

    let result = StreamingDetector::new(config(400))
        .unwrap()
        .detect(&source)
        .unwrap();
    let output = result.anomalies.schema();
    assert_eq!(output.fields().len(), first.num_columns() + 1);
    assert!(output.field_with_name("referrer").is_err());
    assert_eq!(
        output.field_with_name("request_id").unwrap().data_type(),
        &DataType::Int64
    );
}

#[test]
fn test_read_failure_is_fatal() {
    let source = FailingSource::new(MemorySource::from_batch(log_batch(1_000, 2)), 2);
    let err = detect_streaming(&source, 0.05, 500, 100).unwrap_err();
    assert!(matches!(err, TermOutlierError::SourceRead { .. }));
}

#[test]
fn test_failure_in_first_chunk_is_fatal() {
    let source = FailingSource::new(MemorySource::from_batch(log_batch(10, 2)), 0);
    assert!(detect_streaming(&source, 0.05, 500, 100).is_err());
}

#[test]
fn test_both_paths_find_a_strong_outlier() {
    let dataset = log_batch_with_outlier(2_000, 1_500, 31);
    let outlier_id = request_ids(&dataset)[1_500];

    let (_, batch_anomalies) = detect(&dataset, 0.05, 10_000).unwrap();
    assert!(batch_anomalies.num_rows() > 0);
    assert!(request_ids(&batch_anomalies).contains(&outlier_id));

    let source = MemorySource::from_batch(dataset);
    let streamed = detect_streaming(&source, 0.05, 1_000, 500).unwrap();
    assert!(streamed.num_rows() > 0);
    assert!(request_ids(&streamed).contains(&outlier_id));
}

#[test]
fn test_anomalies_keep_source_order() {
    let source = MemorySource::from_batch(log_batch(1_200, 5));
    let anomalies = StreamingDetector::new(config(300))
        .unwrap()
        .detect(&source)
        .unwrap()
        .anomalies;
    let ids = request_ids(&anomalies);
    assert!(ids.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn test_csv_file_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("access.csv");
    write_csv(&log_batch_with_outlier(1_500, 700, 8), &path).unwrap();

    let source = CsvSource::new(&path);
    let result = StreamingDetector::new(config(256))
        .unwrap()
        .detect(&source)
        .unwrap();
    assert_eq!(result.rows_seen, 1_500);
    assert_eq!(result.chunks_seen, 6);
    assert!(request_ids(&result.anomalies).iter().any(|id| *id > 100_000));

    let out = dir.path().join("anomalies.csv");
    write_csv(&result.anomalies, &out).unwrap();
    let written = std::fs::read_to_string(&out).unwrap();
    assert!(written.lines().next().unwrap().ends_with(ANOMALY_COLUMN));
    assert_eq!(written.lines().count(), result.anomaly_count() + 1);
}

#[test]
fn test_analyze_csv_switches_on_size() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("access.csv");
    write_csv(&log_batch(800, 13), &path).unwrap();
    let size = std::fs::metadata(&path).unwrap().len();

    let below = DetectorConfig {
        large_file_threshold_bytes: size + 1,
        ..config(200)
    };
    let report = analyze_csv(&path, &below, &CsvOptions::default()).unwrap();
    assert_eq!(report.mode, AnalysisMode::InMemory);
    assert_eq!(report.total_rows, 800);
    assert_eq!(
        report.annotated.as_ref().map(RecordBatch::num_rows),
        Some(800)
    );

    let at = DetectorConfig {
        large_file_threshold_bytes: size,
        ..config(200)
    };
    let report = analyze_csv(&path, &at, &CsvOptions::default()).unwrap();
    assert_eq!(report.mode, AnalysisMode::Streaming);
    assert_eq!(report.total_rows, 800);
    assert!(report.annotated.is_none());
    assert_eq!(report.file_size_bytes, size);
}

#[test]
fn test_late_fractional_value_widens_integer_column() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("widening.csv");
    let mut contents = String::from("bytes,host\n");
    for i in 0..1_500 {
        if i == 1_300 {
            contents.push_str("1.5,web-02\n");
        } else {
            contents.push_str(&format!("{},web-0{}\n", 4_000 + i % 97, i % 3));
        }
    }
    std::fs::write(&path, contents).unwrap();

    for mode in [AnalysisMode::InMemory, AnalysisMode::Streaming] {
        let report = analyze_csv_as(&path, mode, &config(256), &CsvOptions::default()).unwrap();
        assert_eq!(report.mode, mode);
        assert_eq!(report.total_rows, 1_500);
        assert_eq!(report.outcome, DetectionOutcome::Scored);
        assert_eq!(
            report.anomalies.schema().field(0).data_type(),
            &DataType::Float64
        );
    }
}

/// Records how many chunks handed out by a source are still referenced.
#[derive(Debug, Default)]
struct ChunkLedger {
    handed_out: Vec<Weak<dyn Array>>,
    /// Chunks yielded by each pass
    per_pass: Vec<usize>,
    /// Live chunks when each pass started
    live_at_pass_start: Vec<usize>,
    /// Most chunks alive when another one was requested
    max_live_on_request: usize,
}

impl ChunkLedger {
    fn live(&mut self) -> usize {
        self.handed_out.retain(|chunk| chunk.strong_count() > 0);
        self.handed_out.len()
    }
}

#[derive(Debug)]
struct LedgerSource {
    inner: MemorySource,
    ledger: Arc<Mutex<ChunkLedger>>,
}

impl ChunkSource for LedgerSource {
    fn chunks(&self, chunk_size: usize) -> Result<ChunkIter<'_>> {
        let pass = {
            let mut ledger = self.ledger.lock().unwrap();
            let live = ledger.live();
            ledger.live_at_pass_start.push(live);
            ledger.per_pass.push(0);
            ledger.per_pass.len() - 1
        };
        let ledger = Arc::clone(&self.ledger);
        Ok(Box::new(self.inner.chunks(chunk_size)?.map(move |chunk| {
            let chunk = chunk?;
            let mut ledger = ledger.lock().unwrap();
            let live = ledger.live();
            ledger.max_live_on_request = ledger.max_live_on_request.max(live);
            ledger.per_pass[pass] += 1;
            ledger.handed_out.push(Arc::downgrade(chunk.column(0)));
            Ok(chunk)
        })))
    }

    fn description(&self) -> String {
        format!("ledger over {}", self.inner.description())
    }
}

#[test]
fn test_at_most_one_chunk_alive_at_a_time() {
    let ledger = Arc::new(Mutex::new(ChunkLedger::default()));
    let source = LedgerSource {
        inner: MemorySource::from_batch(log_batch_with_outlier(2_000, 1_234, 17)),
        ledger: Arc::clone(&ledger),
    };

    let result = StreamingDetector::new(config(200))
        .unwrap()
        .detect(&source)
        .unwrap();
    assert_eq!(result.rows_seen, 2_000);
    assert_eq!(result.chunks_seen, 10);

    let mut ledger = ledger.lock().unwrap();
    // the first pass stops at the first non-empty chunk
    assert_eq!(ledger.per_pass, vec![1, 10]);
    assert_eq!(ledger.live_at_pass_start, vec![0, 0]);
    assert_eq!(ledger.max_live_on_request, 0);
    assert_eq!(ledger.live(), 0);
}
