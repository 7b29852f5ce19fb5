//! Anomaly detectors.
//!
//! Two detectors share one model and one feature pipeline:
//!
//! - [`BatchDetector`] holds the whole dataset in memory, fits on all of it
//!   and labels every row.
//! - [`StreamingDetector`] reads a [`ChunkSource`] twice: once to fix the
//!   feature columns and fit on a sample of the first chunk, and once to
//!   score every chunk. Peak memory stays proportional to the chunk size plus
//!   the training sample.
//!
//! [`analyze_csv`] picks between them by file size.
//!
//! ## Example
//!
//! ```rust,no_run
//! use term_outlier::config::DetectorConfig;
//! use term_outlier::detector::{BatchDetector, StreamingDetector};
//! use term_outlier::sources::{read_csv, CsvOptions, CsvSource};
//!
//! # fn example() -> term_outlier::error::Result<()> {
//! let config = DetectorConfig::builder().contamination(0.02).build()?;
//!
//! let dataset = read_csv("logs/small.csv", &CsvOptions::default())?;
//! let batch = BatchDetector::new(config.clone())?.detect(&dataset)?;
//! println!("{} of {} rows anomalous", batch.anomaly_count(), batch.total_rows());
//!
//! let source = CsvSource::new("logs/huge.csv");
//! let streamed = StreamingDetector::new(config)?.detect(&source)?;
//! println!("{} anomalous rows", streamed.anomalies.num_rows());
//! # Ok(())
//! # }
//! ```

use arrow::record_batch::RecordBatch;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::Serialize;

use crate::config::DetectorConfig;
use crate::dataset::{labels_of, AnomalyLabel};
use crate::error::Result;
use crate::sources::ChunkSource;

mod analysis;
mod batch;
mod streaming;

pub use analysis::{
    analyze_csv, analyze_csv_as, AnalysisMode, AnalysisReport, AnalysisSummary, DEFAULT_PREVIEW_ROWS,
};
pub use batch::BatchDetector;
pub use streaming::StreamingDetector;

/// How a detection run ended.
///
/// Only [`DetectionOutcome::Scored`] runs fit a model; the other two are the
/// defined non-error fallbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DetectionOutcome {
    /// A model was fitted and every row scored.
    Scored,
    /// The input had no rows.
    EmptyInput,
    /// No column survived feature preparation; every row is normal.
    NoNumericFeatures,
}

/// Result of [`BatchDetector::detect`].
#[derive(Debug, Clone)]
pub struct BatchDetection {
    /// Every input row with the label column appended
    pub annotated: RecordBatch,
    /// The anomalous rows of `annotated`, in input order
    pub anomalies: RecordBatch,
    pub outcome: DetectionOutcome,
}

impl BatchDetection {
    pub fn total_rows(&self) -> usize {
        self.annotated.num_rows()
    }

    pub fn anomaly_count(&self) -> usize {
        self.anomalies.num_rows()
    }

    /// Label per input row.
    pub fn labels(&self) -> Result<Vec<AnomalyLabel>> {
        if self.annotated.num_rows() == 0 {
            return Ok(Vec::new());
        }
        labels_of(&self.annotated)
    }
}

/// Result of [`StreamingDetector::detect`].
#[derive(Debug, Clone)]
pub struct StreamingDetection {
    /// Anomalous rows from every chunk, in source order
    pub anomalies: RecordBatch,
    pub outcome: DetectionOutcome,
    /// Rows read from the source during the scoring pass
    pub rows_seen: usize,
    /// Chunks read during the scoring pass
    pub chunks_seen: usize,
    /// Canonical feature columns fixed by the first chunk
    pub feature_columns: Vec<String>,
}

impl StreamingDetection {
    pub fn anomaly_count(&self) -> usize {
        self.anomalies.num_rows()
    }
}

/// Builds the worker pool used for tree construction and scoring.
pub(crate) fn worker_pool(threads: usize) -> Result<ThreadPool> {
    Ok(ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|i| format!("term-outlier-{i}"))
        .build()?)
}

fn config_with(contamination: f64, tweak: impl FnOnce(&mut DetectorConfig)) -> Result<DetectorConfig> {
    let mut config = DetectorConfig {
        contamination,
        ..DetectorConfig::default()
    };
    tweak(&mut config);
    config.validate()?;
    Ok(config)
}

/// Labels every row of `dataset` with the default isolation forest.
///
/// Returns the annotated dataset and its anomalous rows.
pub fn detect(
    dataset: &RecordBatch,
    contamination: f64,
    max_training_sample: usize,
) -> Result<(RecordBatch, RecordBatch)> {
    let config = config_with(contamination, |c| c.max_training_sample = max_training_sample)?;
    let result = BatchDetector::new(config)?.detect(dataset)?;
    Ok((result.annotated, result.anomalies))
}

/// Returns the anomalous rows of `source`, read `chunk_size` rows at a time.
pub fn detect_streaming(
    source: &dyn ChunkSource,
    contamination: f64,
    sample_rows: usize,
    chunk_size: usize,
) -> Result<RecordBatch> {
    let config = config_with(contamination, |c| {
        c.sample_rows = sample_rows;
        c.chunk_size = chunk_size;
    })?;
    Ok(StreamingDetector::new(config)?.detect(source)?.anomalies)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TermOutlierError;
    use crate::sources::MemorySource;
    use crate::test_fixtures::log_batch;

    #[test]
    fn test_detect_rejects_bad_contamination() {
        let batch = log_batch(10, 1);
        assert!(matches!(
            detect(&batch, 0.6, 100),
            Err(TermOutlierError::Configuration(_))
        ));
        let source = MemorySource::from_batch(batch);
        assert!(matches!(
            detect_streaming(&source, 0.05, 100, 0),
            Err(TermOutlierError::Configuration(_))
        ));
    }

    #[test]
    fn test_worker_pool_size() {
        let pool = worker_pool(3).unwrap();
        assert_eq!(pool.current_num_threads(), 3);
    }
}
