//! In-memory detection over a whole dataset.

use arrow::record_batch::RecordBatch;
use rayon::ThreadPool;
use tracing::{info, instrument};

use super::{worker_pool, BatchDetection, DetectionOutcome};
use crate::config::DetectorConfig;
use crate::dataset::{annotate, empty_dataset, empty_result, select_anomalous, AnomalyLabel};
use crate::error::Result;
use crate::features::prepare_features;
use crate::model::persistence::persist_best_effort;
use crate::model::{IsolationForestParams, OutlierModel, ScaledModel};
use crate::optimize::optimize_memory;

/// Fits a model on a whole dataset and labels every row of it.
///
/// The pipeline is: shrink numeric columns, prepare features, standardize,
/// fit, label. The model and scaler are discarded after the call unless
/// [`DetectorConfig::model_path`] asks for them to be saved.
pub struct BatchDetector<M = IsolationForestParams> {
    config: DetectorConfig,
    model: M,
    pool: ThreadPool,
}

impl BatchDetector<IsolationForestParams> {
    /// A detector using an isolation forest configured from `config`.
    pub fn new(config: DetectorConfig) -> Result<Self> {
        let model = IsolationForestParams::from_config(&config);
        Self::with_model(config, model)
    }
}

impl<M: OutlierModel> BatchDetector<M> {
    /// A detector using a caller-supplied model.
    pub fn with_model(config: DetectorConfig, model: M) -> Result<Self> {
        config.validate()?;
        let pool = worker_pool(config.parallelism)?;
        Ok(Self {
            config,
            model,
            pool,
        })
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Labels every row of `dataset`.
    #[instrument(skip(self, dataset), fields(rows = dataset.num_rows(), columns = dataset.num_columns(), model = self.model.name()))]
    pub fn detect(&self, dataset: &RecordBatch) -> Result<BatchDetection> {
        if dataset.num_rows() == 0 {
            info!("Dataset is empty; nothing to score");
            return Ok(BatchDetection {
                annotated: empty_dataset(),
                anomalies: empty_dataset(),
                outcome: DetectionOutcome::EmptyInput,
            });
        }

        let optimized = optimize_memory(dataset)?;
        let features = prepare_features(&optimized)?;

        if features.n_cols() == 0 {
            info!("No usable feature columns; labeling every row normal");
            let labels = vec![AnomalyLabel::Normal; dataset.num_rows()];
            return Ok(BatchDetection {
                annotated: annotate(dataset, &labels)?,
                anomalies: empty_result(&dataset.schema()),
                outcome: DetectionOutcome::NoNumericFeatures,
            });
        }

        let (fitted, labels) = self.pool.install(|| -> Result<_> {
            let fitted = ScaledModel::fit(&self.model, &features)?;
            let labels = fitted.predict(&features)?;
            Ok((fitted, labels))
        })?;

        if let Some(path) = &self.config.model_path {
            persist_best_effort(&fitted, path);
        }

        let annotated = annotate(dataset, &labels)?;
        let anomalies = select_anomalous(&annotated, &labels)?;
        info!(
            features = features.n_cols(),
            anomalies = anomalies.num_rows(),
            "Batch detection finished"
        );

        Ok(BatchDetection {
            annotated,
            anomalies,
            outcome: DetectionOutcome::Scored,
        })
    }
}

impl<M> std::fmt::Debug for BatchDetector<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchDetector")
            .field("config", &self.config)
            .field("threads", &self.pool.current_num_threads())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::ANOMALY_COLUMN;
    use crate::test_fixtures::{log_batch, log_batch_with_outlier, unsupported_batch};

    fn small_config() -> DetectorConfig {
        DetectorConfig::builder()
            .n_estimators(50)
            .parallelism(2)
            .build()
            .unwrap()
    }

    #[test]
    fn test_empty_dataset() {
        let detector = BatchDetector::new(small_config()).unwrap();
        let result = detector.detect(&log_batch(0, 1)).unwrap();
        assert_eq!(result.outcome, DetectionOutcome::EmptyInput);
        assert_eq!(result.total_rows(), 0);
        assert_eq!(result.anomaly_count(), 0);
        assert!(result.labels().unwrap().is_empty());
    }

    #[test]
    fn test_no_usable_columns() {
        let detector = BatchDetector::new(small_config()).unwrap();
        let result = detector.detect(&unsupported_batch(20)).unwrap();
        assert_eq!(result.outcome, DetectionOutcome::NoNumericFeatures);
        assert_eq!(result.total_rows(), 20);
        assert_eq!(result.anomaly_count(), 0);
        assert_eq!(result.anomalies.num_columns(), 3);
        assert!(result
            .labels()
            .unwrap()
            .iter()
            .all(|l| *l == AnomalyLabel::Normal));
    }

    #[test]
    fn test_annotated_keeps_display_columns() {
        let dataset = log_batch(300, 5);
        let result = BatchDetector::new(small_config())
            .unwrap()
            .detect(&dataset)
            .unwrap();
        assert_eq!(result.outcome, DetectionOutcome::Scored);
        assert_eq!(result.total_rows(), 300);

        let schema = result.annotated.schema();
        assert_eq!(schema.fields().len(), dataset.num_columns() + 1);
        assert_eq!(schema.field(dataset.num_columns()).name(), ANOMALY_COLUMN);
        assert_eq!(
            schema.field_with_name("host").unwrap().data_type(),
            dataset.schema().field_with_name("host").unwrap().data_type()
        );
        assert_eq!(result.anomalies.schema(), schema);
    }

    #[test]
    fn test_strong_outlier_is_flagged() {
        let dataset = log_batch_with_outlier(500, 123, 9);
        let result = BatchDetector::new(small_config())
            .unwrap()
            .detect(&dataset)
            .unwrap();
        assert_eq!(result.labels().unwrap()[123], AnomalyLabel::Anomalous);
    }

    #[test]
    fn test_persistence_failure_does_not_abort() {
        let dir = tempfile::tempdir().unwrap();
        let config = DetectorConfig {
            model_path: Some(dir.path().join("no-such-dir").join("model.json")),
            ..small_config()
        };
        let result = BatchDetector::new(config)
            .unwrap()
            .detect(&log_batch(100, 2))
            .unwrap();
        assert_eq!(result.outcome, DetectionOutcome::Scored);
    }

    #[test]
    fn test_persists_model_when_configured() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        let config = DetectorConfig {
            model_path: Some(path.clone()),
            ..small_config()
        };
        BatchDetector::new(config)
            .unwrap()
            .detect(&log_batch(100, 2))
            .unwrap();
        assert!(path.exists());
    }
}
