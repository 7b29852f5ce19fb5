//! In-memory chunk source.

use arrow::record_batch::RecordBatch;

use super::{check_chunk_size, ChunkIter, ChunkSource};
use crate::error::Result;

/// Serves already-loaded batches as chunks.
///
/// Batches are sliced (without copying) to at most `chunk_size` rows; a chunk
/// never spans two batches. Batches may have different schemas, which is how
/// tests model a partially malformed file.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    batches: Vec<RecordBatch>,
}

impl MemorySource {
    pub fn new(batches: Vec<RecordBatch>) -> Self {
        Self { batches }
    }

    pub fn from_batch(batch: RecordBatch) -> Self {
        Self::new(vec![batch])
    }

    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(RecordBatch::num_rows).sum()
    }
}

impl ChunkSource for MemorySource {
    fn chunks(&self, chunk_size: usize) -> Result<ChunkIter<'_>> {
        check_chunk_size(chunk_size)?;
        Ok(Box::new(self.batches.iter().flat_map(move |batch| {
            let rows = batch.num_rows();
            (0..rows)
                .step_by(chunk_size)
                .map(move |offset| Ok(batch.slice(offset, chunk_size.min(rows - offset))))
        })))
    }

    fn description(&self) -> String {
        format!(
            "memory ({} batches, {} rows)",
            self.batches.len(),
            self.num_rows()
        )
    }
}
