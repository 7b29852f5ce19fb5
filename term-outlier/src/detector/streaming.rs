//! Bounded-memory detection over a chunked source.

use arrow::compute::concat_batches;
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;
use rayon::ThreadPool;
use tracing::{debug, info, instrument};

use super::{worker_pool, DetectionOutcome, StreamingDetection};
use crate::config::DetectorConfig;
use crate::dataset::{
    align_to_schema, annotate, empty_dataset, labeled_schema, nullable_schema, select_anomalous,
};
use crate::error::Result;
use crate::features::{prepare_features, FeatureMatrix};
use crate::log_chunk;
use crate::model::persistence::persist_best_effort;
use crate::model::{FittedModel, IsolationForestParams, OutlierModel, ScaledModel};
use crate::sources::ChunkSource;

/// Detects anomalies in a source too large to hold in memory.
///
/// The first non-empty chunk fixes the canonical feature columns and
/// supplies the training sample. The scaler fitted on that sample
/// standardizes every chunk of the scoring pass. Each chunk's categorical
/// codes are assigned independently, so the same text value may map to
/// different codes in different chunks.
///
/// The result holds only anomalous rows. Its schema is the first chunk's
/// schema with every column nullable plus the label column; later chunks are
/// projected onto it by column name.
pub struct StreamingDetector<M = IsolationForestParams> {
    config: DetectorConfig,
    model: M,
    pool: ThreadPool,
}

impl StreamingDetector<IsolationForestParams> {
    /// A detector using an isolation forest configured from `config`.
    pub fn new(config: DetectorConfig) -> Result<Self> {
        let model = IsolationForestParams::from_config(&config);
        Self::with_model(config, model)
    }
}

impl<M: OutlierModel> StreamingDetector<M> {
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

    /// Reads `source` twice and returns its anomalous rows.
    ///
    /// Any read failure in either pass aborts the run.
    #[instrument(skip(self, source), fields(source = %source.description(), chunk_size = self.config.chunk_size, model = self.model.name()))]
    pub fn detect(&self, source: &dyn ChunkSource) -> Result<StreamingDetection> {
        self.pool.install(|| self.run(source))
    }

    fn run(&self, source: &dyn ChunkSource) -> Result<StreamingDetection> {
        let chunk_size = self.config.chunk_size;

        // First pass: only the first non-empty chunk is materialized.
        let mut first_pass = source.chunks(chunk_size)?;
        let first = loop {
            match first_pass.next().transpose()? {
                Some(chunk) if chunk.num_rows() == 0 => continue,
                Some(chunk) => break chunk,
                None => {
                    info!("Source produced no rows; nothing to score");
                    return Ok(StreamingDetection {
                        anomalies: empty_dataset(),
                        outcome: DetectionOutcome::EmptyInput,
                        rows_seen: 0,
                        chunks_seen: 0,
                        feature_columns: Vec::new(),
                    });
                }
            }
        };

        let output_schema = labeled_schema(&nullable_schema(&first.schema()));
        let first_features = prepare_features(&first)?;

        if first_features.n_cols() == 0 {
            info!("No usable feature columns in first chunk; labeling every row normal");
            let mut rows_seen = first.num_rows();
            let mut chunks_seen = 1;
            drop(first);
            for chunk in first_pass {
                rows_seen += chunk?.num_rows();
                chunks_seen += 1;
            }
            return Ok(StreamingDetection {
                anomalies: RecordBatch::new_empty(output_schema),
                outcome: DetectionOutcome::NoNumericFeatures,
                rows_seen,
                chunks_seen,
                feature_columns: Vec::new(),
            });
        }
        drop(first_pass);
        drop(first);

        let sample = self.training_sample(&first_features);
        drop(first_features);
        let fitted = ScaledModel::fit(&self.model, &sample)?;
        info!(
            sample_rows = sample.n_rows(),
            features = sample.n_cols(),
            threshold = fitted.model.threshold(),
            "Fitted streaming model on first-chunk sample"
        );
        drop(sample);

        if let Some(path) = &self.config.model_path {
            persist_best_effort(&fitted, path);
        }

        // Second pass: score every chunk against the fitted model.
        let mut parts = Vec::new();
        let mut rows_seen = 0;
        let mut chunks_seen = 0;
        for chunk in source.chunks(chunk_size)? {
            let chunk = chunk?;
            if chunk.num_rows() == 0 {
                continue;
            }
            let anomalies = self.score_chunk(&chunk, &fitted, &output_schema)?;
            log_chunk!(
                self.config.logging,
                chunk = chunks_seen,
                rows = chunk.num_rows(),
                anomalies = anomalies.num_rows(),
                "Scored chunk"
            );
            rows_seen += chunk.num_rows();
            chunks_seen += 1;
            if anomalies.num_rows() > 0 {
                parts.push(anomalies);
            }
        }

        let anomalies = concat_batches(&output_schema, &parts)?;
        info!(
            rows = rows_seen,
            chunks = chunks_seen,
            anomalies = anomalies.num_rows(),
            "Streaming detection finished"
        );

        Ok(StreamingDetection {
            anomalies,
            outcome: DetectionOutcome::Scored,
            rows_seen,
            chunks_seen,
            feature_columns: fitted.columns().to_vec(),
        })
    }

    /// Up to `sample_rows` rows of `features`, drawn without replacement and
    /// kept in their original order.
    fn training_sample(&self, features: &FeatureMatrix) -> FeatureMatrix {
        let n_rows = features.n_rows();
        let amount = self.config.sample_rows.min(n_rows);
        if amount == n_rows {
            return features.clone();
        }
        let mut rng = StdRng::seed_from_u64(self.config.random_seed);
        let mut rows = index::sample(&mut rng, n_rows, amount).into_vec();
        rows.sort_unstable();
        debug!(from = n_rows, rows = amount, "Sampled training rows");
        features.select_rows(&rows)
    }

    fn score_chunk(
        &self,
        chunk: &RecordBatch,
        fitted: &ScaledModel<M::Fitted>,
        output_schema: &SchemaRef,
    ) -> Result<RecordBatch> {
        let features = prepare_features(chunk)?.align_to(fitted.columns());
        let labels = fitted.predict(&features)?;
        let annotated = annotate(chunk, &labels)?;
        let anomalies = select_anomalous(&annotated, &labels)?;
        align_to_schema(&anomalies, output_schema)
    }
}

impl<M> std::fmt::Debug for StreamingDetector<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingDetector")
            .field("config", &self.config)
            .field("threads", &self.pool.current_num_threads())
            .finish_non_exhaustive()
    }
}
