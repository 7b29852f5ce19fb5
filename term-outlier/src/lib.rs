//! # term-outlier - Unsupervised anomaly detection for tabular data
//!
//! term-outlier flags statistically unusual rows in CSV-like datasets with an
//! isolation forest. It needs no labels: every run fits a fresh model on the
//! data it is asked to score.
//!
//! ## Overview
//!
//! A dataset is an Arrow [`RecordBatch`](arrow::record_batch::RecordBatch).
//! Detection turns it into a numeric feature matrix (text columns become
//! first-appearance integer codes, missing values become 0, unusable columns
//! are dropped), standardizes it, fits the forest and labels each row `1`
//! (normal) or `-1` (anomalous) in an appended `Anomaly` column.
//!
//! Two paths are provided:
//!
//! - **Batch**: the whole dataset is in memory. Numeric columns are first
//!   narrowed to the smallest lossless width, then every row is labeled.
//! - **Streaming**: the dataset is read as restartable chunks. The first
//!   chunk fixes the feature columns and supplies the training sample; a
//!   second pass scores every chunk and keeps only anomalous rows, so memory
//!   stays bounded by the chunk size and the sample size.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use term_outlier::prelude::*;
//!
//! # fn example() -> term_outlier::error::Result<()> {
//! let config = DetectorConfig::builder().contamination(0.05).build()?;
//! let report = analyze_csv("access_log.csv", &config, &CsvOptions::default())?;
//!
//! println!(
//!     "{} anomalies in {} rows ({})",
//!     report.anomaly_count(),
//!     report.total_rows,
//!     report.mode
//! );
//! write_csv(&report.anomalies, "anomalies.csv")?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Determinism
//!
//! Sampling and tree construction are driven by
//! [`DetectorConfig::random_seed`](config::DetectorConfig::random_seed).
//! Each tree draws its own seed from a master generator, so identical input
//! and configuration produce identical labels regardless of how many worker
//! threads build the forest.
//!
//! ## Architecture
//!
//! - **`sources`**: chunked, restartable data sources (CSV files, memory)
//! - **`optimize`**: lossless numeric downcasting for the batch path
//! - **`features`**: feature preparation and standardization
//! - **`model`**: the outlier-model traits, the isolation forest and JSON
//!   persistence
//! - **`detector`**: batch and streaming detectors plus file-size dispatch
//! - **`dataset`**: label column helpers shared by both detectors

pub mod config;
pub mod dataset;
pub mod detector;
pub mod error;
pub mod features;
pub mod logging;
pub mod model;
pub mod optimize;
pub mod prelude;
pub mod sources;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_fixtures;
