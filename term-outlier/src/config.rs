//! Detector configuration.
//!
//! [`DetectorConfig`] carries every knob shared by the batch and streaming
//! detectors. Build one with [`DetectorConfig::builder`] to get validation,
//! or start from a preset.
//!
//! ```rust
//! use term_outlier::config::DetectorConfig;
//!
//! let config = DetectorConfig::builder()
//!     .contamination(0.02)
//!     .chunk_size(50_000)
//!     .build()
//!     .unwrap();
//! assert_eq!(config.n_estimators, 200);
//! ```

use std::path::PathBuf;

use crate::error::{Result, TermOutlierError};
use crate::logging::LogConfig;

/// Default expected fraction of outliers.
pub const DEFAULT_CONTAMINATION: f64 = 0.05;
/// Default per-tree sample cap.
pub const DEFAULT_MAX_TRAINING_SAMPLE: usize = 10_000;
/// Default number of rows sampled from the first chunk in streaming mode.
pub const DEFAULT_SAMPLE_ROWS: usize = 100_000;
/// Default streaming chunk size in rows.
pub const DEFAULT_CHUNK_SIZE: usize = 200_000;
/// Default ensemble size.
pub const DEFAULT_N_ESTIMATORS: usize = 200;
/// Default random seed.
pub const DEFAULT_RANDOM_SEED: u64 = 42;
/// Files at or above this size are analyzed by streaming.
pub const DEFAULT_LARGE_FILE_THRESHOLD_BYTES: u64 = 30 * 1024 * 1024;

/// Configuration for batch and streaming detection.
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Expected fraction of anomalous rows, in (0, 0.5)
    pub contamination: f64,
    /// Upper bound on the rows each tree is built from
    pub max_training_sample: usize,
    /// Upper bound on the rows sampled from the first chunk (streaming)
    pub sample_rows: usize,
    /// Rows per chunk (streaming)
    pub chunk_size: usize,
    /// Number of trees in the ensemble
    pub n_estimators: usize,
    /// Seed for sampling and tree construction
    pub random_seed: u64,
    /// Worker threads used to build trees and score rows
    pub parallelism: usize,
    /// Where to persist the fitted model, if anywhere
    pub model_path: Option<PathBuf>,
    /// Size at which `analyze_csv` switches to streaming
    pub large_file_threshold_bytes: u64,
    /// Logging verbosity for detection runs
    pub logging: LogConfig,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            contamination: DEFAULT_CONTAMINATION,
            max_training_sample: DEFAULT_MAX_TRAINING_SAMPLE,
            sample_rows: DEFAULT_SAMPLE_ROWS,
            chunk_size: DEFAULT_CHUNK_SIZE,
            n_estimators: DEFAULT_N_ESTIMATORS,
            random_seed: DEFAULT_RANDOM_SEED,
            parallelism: num_cpus::get(),
            model_path: None,
            large_file_threshold_bytes: DEFAULT_LARGE_FILE_THRESHOLD_BYTES,
            logging: LogConfig::default(),
        }
    }
}

impl DetectorConfig {
    /// Starts a validated builder from the defaults.
    pub fn builder() -> DetectorConfigBuilder {
        DetectorConfigBuilder {
            config: Self::default(),
        }
    }

    /// Smaller chunks and training sample for constrained hosts.
    pub fn low_memory() -> Self {
        Self {
            sample_rows: 20_000,
            chunk_size: 50_000,
            max_training_sample: 4_096,
            ..Self::default()
        }
    }

    /// Flags a larger share of rows.
    pub fn sensitive() -> Self {
        Self {
            contamination: 0.1,
            ..Self::default()
        }
    }

    /// Checks every field against its valid range.
    pub fn validate(&self) -> Result<()> {
        if !(self.contamination > 0.0 && self.contamination < 0.5) {
            return Err(TermOutlierError::configuration(format!(
                "contamination must be in (0, 0.5), got {}",
                self.contamination
            )));
        }
        if self.max_training_sample == 0 {
            return Err(TermOutlierError::configuration(
                "max_training_sample must be greater than zero",
            ));
        }
        if self.sample_rows == 0 {
            return Err(TermOutlierError::configuration(
                "sample_rows must be greater than zero",
            ));
        }
        if self.chunk_size == 0 {
            return Err(TermOutlierError::configuration(
                "chunk_size must be greater than zero",
            ));
        }
        if self.n_estimators == 0 {
            return Err(TermOutlierError::configuration(
                "n_estimators must be greater than zero",
            ));
        }
        if self.parallelism == 0 {
            return Err(TermOutlierError::configuration(
                "parallelism must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// Builder for [`DetectorConfig`].
#[derive(Debug, Clone)]
pub struct DetectorConfigBuilder {
    config: DetectorConfig,
}

impl DetectorConfigBuilder {
    /// Sets the expected outlier fraction.
    pub fn contamination(mut self, contamination: f64) -> Self {
        self.config.contamination = contamination;
        self
    }

    /// Sets the per-tree sample cap.
    pub fn max_training_sample(mut self, rows: usize) -> Self {
        self.config.max_training_sample = rows;
        self
    }

    /// Sets the streaming training sample cap.
    pub fn sample_rows(mut self, rows: usize) -> Self {
        self.config.sample_rows = rows;
        self
    }

    /// Sets the streaming chunk size.
    pub fn chunk_size(mut self, rows: usize) -> Self {
        self.config.chunk_size = rows;
        self
    }

    /// Sets the ensemble size.
    pub fn n_estimators(mut self, trees: usize) -> Self {
        self.config.n_estimators = trees;
        self
    }

    /// Sets the random seed.
    pub fn random_seed(mut self, seed: u64) -> Self {
        self.config.random_seed = seed;
        self
    }

    /// Sets the number of worker threads.
    pub fn parallelism(mut self, threads: usize) -> Self {
        self.config.parallelism = threads;
        self
    }

    /// Persists the fitted model to `path` after batch fitting.
    pub fn model_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.model_path = Some(path.into());
        self
    }

    /// Sets the file size at which analysis switches to streaming.
    pub fn large_file_threshold_bytes(mut self, bytes: u64) -> Self {
        self.config.large_file_threshold_bytes = bytes;
        self
    }

    /// Sets logging verbosity.
    pub fn logging(mut self, logging: LogConfig) -> Self {
        self.config.logging = logging;
        self
    }

    /// Validates and returns the configuration.
    pub fn build(self) -> Result<DetectorConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
