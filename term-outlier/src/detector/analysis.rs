//! File-level analysis: choose a detector by file size and summarize.

use std::fmt;
use std::path::Path;

use arrow::record_batch::RecordBatch;
use serde::Serialize;
use tracing::{info, instrument};

use super::{BatchDetector, DetectionOutcome, StreamingDetector};
use crate::config::DetectorConfig;
use crate::error::{Result, TermOutlierError};
use crate::sources::{CsvOptions, CsvSource};

/// Rows shown by [`AnalysisReport::preview`] by default.
pub const DEFAULT_PREVIEW_ROWS: usize = 100;

/// Which detector analyzed a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisMode {
    InMemory,
    Streaming,
}

impl AnalysisMode {
    /// The mode [`analyze_csv`] picks for a file of `file_size` bytes.
    pub fn for_file_size(file_size: u64, threshold: u64) -> Self {
        if file_size < threshold {
            Self::InMemory
        } else {
            Self::Streaming
        }
    }
}

impl fmt::Display for AnalysisMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InMemory => write!(f, "in-memory"),
            Self::Streaming => write!(f, "streaming"),
        }
    }
}

/// Outcome of analyzing one file.
#[derive(Debug, Clone)]
pub struct AnalysisReport {
    pub mode: AnalysisMode,
    pub file_size_bytes: u64,
    /// Rows read from the file
    pub total_rows: usize,
    pub anomalies: RecordBatch,
    /// Every row with its label; only the in-memory mode keeps this
    pub annotated: Option<RecordBatch>,
    pub outcome: DetectionOutcome,
}

impl AnalysisReport {
    pub fn anomaly_count(&self) -> usize {
        self.anomalies.num_rows()
    }

    /// Anomalous rows as a percentage of all rows, if there were any rows.
    pub fn anomaly_percent(&self) -> Option<f64> {
        (self.total_rows > 0)
            .then(|| self.anomaly_count() as f64 / self.total_rows as f64 * 100.0)
    }

    /// The first `limit` anomalous rows.
    pub fn preview(&self, limit: usize) -> RecordBatch {
        self.anomalies.slice(0, limit.min(self.anomalies.num_rows()))
    }

    pub fn summary(&self) -> AnalysisSummary {
        AnalysisSummary {
            mode: self.mode,
            file_size_bytes: self.file_size_bytes,
            total_rows: self.total_rows,
            anomaly_count: self.anomaly_count(),
            anomaly_percent: self.anomaly_percent(),
            outcome: self.outcome,
            columns: self
                .anomalies
                .schema()
                .fields()
                .iter()
                .map(|f| f.name().clone())
                .collect(),
        }
    }
}

/// Serializable counts from an [`AnalysisReport`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisSummary {
    pub mode: AnalysisMode,
    pub file_size_bytes: u64,
    pub total_rows: usize,
    pub anomaly_count: usize,
    pub anomaly_percent: Option<f64>,
    pub outcome: DetectionOutcome,
    pub columns: Vec<String>,
}

fn file_size(path: &Path) -> Result<u64> {
    std::fs::metadata(path)
        .map(|m| m.len())
        .map_err(|e| {
            TermOutlierError::source_read_with_source(
                "CSV",
                format!("cannot stat {}", path.display()),
                Box::new(e),
            )
        })
}

/// Analyzes a CSV file, loading it whole when it is smaller than
/// `config.large_file_threshold_bytes` and streaming it otherwise.
pub fn analyze_csv(
    path: impl AsRef<Path>,
    config: &DetectorConfig,
    options: &CsvOptions,
) -> Result<AnalysisReport> {
    let path = path.as_ref();
    let file_size_bytes = file_size(path)?;
    let mode = AnalysisMode::for_file_size(file_size_bytes, config.large_file_threshold_bytes);
    analyze_sized(path, file_size_bytes, mode, config, options)
}

/// Analyzes a CSV file with an explicit detector choice.
pub fn analyze_csv_as(
    path: impl AsRef<Path>,
    mode: AnalysisMode,
    config: &DetectorConfig,
    options: &CsvOptions,
) -> Result<AnalysisReport> {
    let path = path.as_ref();
    analyze_sized(path, file_size(path)?, mode, config, options)
}

#[instrument(skip(path, config, options), fields(path = %path.display()))]
fn analyze_sized(
    path: &Path,
    file_size_bytes: u64,
    mode: AnalysisMode,
    config: &DetectorConfig,
    options: &CsvOptions,
) -> Result<AnalysisReport> {
    let source =
        CsvSource::with_options(path, options.clone()).with_logging(config.logging.clone());
    info!(%mode, file_size_bytes, "Analyzing CSV file");

    let report = match mode {
        AnalysisMode::InMemory => {
            let dataset = source.read_all()?;
            let result = BatchDetector::new(config.clone())?.detect(&dataset)?;
            AnalysisReport {
                mode,
                file_size_bytes,
                total_rows: result.total_rows(),
                anomalies: result.anomalies,
                annotated: Some(result.annotated),
                outcome: result.outcome,
            }
        }
        AnalysisMode::Streaming => {
            let result = StreamingDetector::new(config.clone())?.detect(&source)?;
            AnalysisReport {
                mode,
                file_size_bytes,
                total_rows: result.rows_seen,
                anomalies: result.anomalies,
                annotated: None,
                outcome: result.outcome,
            }
        }
    };

    info!(
        total_rows = report.total_rows,
        anomalies = report.anomaly_count(),
        "Analysis finished"
    );
    Ok(report)
}
