//! Prelude for commonly used types and traits in term-outlier.

pub use crate::config::DetectorConfig;
pub use crate::dataset::{AnomalyLabel, ANOMALY_COLUMN};
pub use crate::detector::{
    analyze_csv, detect, detect_streaming, AnalysisMode, AnalysisReport, BatchDetector,
    DetectionOutcome, StreamingDetector,
};
pub use crate::error::{ErrorContext, Result, TermOutlierError};
pub use crate::logging::LogConfig;
pub use crate::model::{FittedModel, OutlierModel};
pub use crate::sources::{read_csv, write_csv, ChunkSource, CsvOptions, CsvSource, MemorySource};
