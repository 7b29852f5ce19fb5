//! Synthetic datasets for exercising the detectors.
//!
//! Every generator is seeded, so the same arguments always produce the same
//! batch. The "log-like" schema mixes numeric, categorical, nullable and
//! unsupported columns:
//!
//! | column       | type    | notes                                  |
//! |--------------|---------|----------------------------------------|
//! | `request_id` | Int64   | sequential                             |
//! | `host`       | Utf8    | one of five hosts                      |
//! | `status`     | Int64   | mostly 200, some 404/500               |
//! | `bytes`      | Float64 | ~N(5000, 800), 2% null                 |
//! | `latency_ms` | Float64 | ~N(120, 15)                            |
//! | `cached`     | Boolean | dropped by feature preparation         |

use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, BinaryArray, BooleanArray, Float64Array, Int64Array, StringArray,
};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{Result, TermOutlierError};
use crate::sources::{ChunkIter, ChunkSource, MemorySource};

const HOSTS: [&str; 5] = ["web-01", "web-02", "web-03", "api-01", "api-02"];

fn normal(rng: &mut StdRng, mean: f64, sd: f64) -> f64 {
    // Box-Muller
    let u1: f64 = rng.random_range(f64::EPSILON..1.0);
    let u2: f64 = rng.random();
    mean + sd * (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

/// Schema of [`log_batch`].
pub fn log_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("request_id", DataType::Int64, false),
        Field::new("host", DataType::Utf8, false),
        Field::new("status", DataType::Int64, false),
        Field::new("bytes", DataType::Float64, true),
        Field::new("latency_ms", DataType::Float64, false),
        Field::new("cached", DataType::Boolean, false),
    ]))
}

/// `rows` rows of ordinary traffic.
pub fn log_batch(rows: usize, seed: u64) -> RecordBatch {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut ids = Vec::with_capacity(rows);
    let mut hosts = Vec::with_capacity(rows);
    let mut statuses = Vec::with_capacity(rows);
    let mut bytes = Vec::with_capacity(rows);
    let mut latency = Vec::with_capacity(rows);
    let mut cached = Vec::with_capacity(rows);

    for i in 0..rows {
        ids.push(i as i64);
        hosts.push(HOSTS[rng.random_range(0..HOSTS.len())]);
        statuses.push(match rng.random_range(0..100) {
            0..=89 => 200,
            90..=96 => 404,
            _ => 500,
        });
        bytes.push(if rng.random_bool(0.02) {
            None
        } else {
            Some(normal(&mut rng, 5_000.0, 800.0))
        });
        latency.push(normal(&mut rng, 120.0, 15.0));
        cached.push(rng.random_bool(0.3));
    }

    let columns: Vec<ArrayRef> = vec![
        Arc::new(Int64Array::from(ids)),
        Arc::new(StringArray::from(hosts)),
        Arc::new(Int64Array::from(statuses)),
        Arc::new(Float64Array::from(bytes)),
        Arc::new(Float64Array::from(latency)),
        Arc::new(BooleanArray::from(cached)),
    ];
    RecordBatch::try_new(log_schema(), columns).expect("fixture columns match schema")
}

/// Ordinary traffic with one extreme row at `position`.
///
/// The extreme row's numeric values are 1000 times the column means.
pub fn log_batch_with_outlier(rows: usize, position: usize, seed: u64) -> RecordBatch {
    assert!(position < rows, "outlier position out of range");
    let base = log_batch(rows, seed);
    let scale = |name: &str, row: usize| -> Option<f64> {
        let col = base
            .column_by_name(name)
            .and_then(|c| c.as_any().downcast_ref::<Float64Array>())?;
        (row == position).then(|| 1_000.0 * mean_of(col))
    };

    let bytes: Float64Array = (0..rows)
        .map(|i| scale("bytes", i).or_else(|| value_at(&base, "bytes", i)))
        .collect();
    let latency: Float64Array = (0..rows)
        .map(|i| scale("latency_ms", i).or_else(|| value_at(&base, "latency_ms", i)))
        .collect();
    let status = base
        .column_by_name("status")
        .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
        .expect("status column");
    let status_mean =
        status.values().iter().map(|v| *v as f64).sum::<f64>() / status.len() as f64;
    let status: Int64Array = (0..rows)
        .map(|i| {
            if i == position {
                (status_mean * 1_000.0) as i64
            } else {
                status.value(i)
            }
        })
        .collect();
    let ids = base
        .column_by_name("request_id")
        .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
        .expect("request_id column");
    let id_mean = ids.values().iter().map(|v| *v as f64).sum::<f64>() / ids.len() as f64;
    let ids: Int64Array = (0..rows)
        .map(|i| {
            if i == position {
                (id_mean * 1_000.0) as i64
            } else {
                ids.value(i)
            }
        })
        .collect();

    RecordBatch::try_new(
        log_schema(),
        vec![
            Arc::new(ids),
            Arc::clone(base.column(1)),
            Arc::new(status),
            Arc::new(bytes),
            Arc::new(latency),
            Arc::clone(base.column(5)),
        ],
    )
    .expect("fixture columns match schema")
}

fn mean_of(col: &Float64Array) -> f64 {
    let values: Vec<f64> = col.iter().flatten().collect();
    values.iter().sum::<f64>() / values.len().max(1) as f64
}

fn value_at(batch: &RecordBatch, name: &str, row: usize) -> Option<f64> {
    let col = batch
        .column_by_name(name)?
        .as_any()
        .downcast_ref::<Float64Array>()?;
    (!col.is_null(row)).then(|| col.value(row))
}

/// Rows whose every column is boolean or binary, so nothing is usable as a
/// feature.
pub fn unsupported_batch(rows: usize) -> RecordBatch {
    let schema = Arc::new(Schema::new(vec![
        Field::new("flag", DataType::Boolean, false),
        Field::new("payload", DataType::Binary, false),
    ]));
    let flags = BooleanArray::from((0..rows).map(|i| i % 2 == 0).collect::<Vec<_>>());
    let payload = BinaryArray::from_iter_values((0..rows).map(|i| (i as u32).to_le_bytes()));
    RecordBatch::try_new(schema, vec![Arc::new(flags), Arc::new(payload)])
        .expect("fixture columns match schema")
}

/// A source that yields `healthy` chunks from `inner`, then fails.
#[derive(Debug)]
pub struct FailingSource {
    inner: MemorySource,
    healthy: usize,
}

impl FailingSource {
    pub fn new(inner: MemorySource, healthy: usize) -> Self {
        Self { inner, healthy }
    }
}

impl ChunkSource for FailingSource {
    fn chunks(&self, chunk_size: usize) -> Result<ChunkIter<'_>> {
        let healthy = self.inner.chunks(chunk_size)?.take(self.healthy);
        let failure = std::iter::once(Err(TermOutlierError::source_read(
            "test",
            "simulated read failure",
        )));
        Ok(Box::new(healthy.chain(failure)))
    }

    fn description(&self) -> String {
        format!("failing after {} chunks", self.healthy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_batch_is_seeded() {
        assert_eq!(log_batch(100, 3), log_batch(100, 3));
        assert_ne!(log_batch(100, 3), log_batch(100, 4));
    }

    #[test]
    fn test_outlier_row_is_extreme() {
        let batch = log_batch_with_outlier(200, 17, 1);
        let latency = batch
            .column_by_name("latency_ms")
            .unwrap()
            .as_any()
            .downcast_ref::<Float64Array>()
            .unwrap();
        assert!(latency.value(17) > 100_000.0);
        assert!(latency.value(16) < 1_000.0);
    }

    #[test]
    fn test_failing_source_fails_after_healthy_chunks() {
        let source = FailingSource::new(MemorySource::from_batch(log_batch(30, 1)), 2);
        let results: Vec<_> = source.chunks(10).unwrap().collect();
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok() && results[1].is_ok());
        assert!(results[2].is_err());
    }
}
