//! Chunked data sources.
//!
//! The streaming detector reads its input twice, so a source must be
//! restartable: every call to [`ChunkSource::chunks`] starts again from the
//! first row.

use std::fmt::Debug;

use arrow::record_batch::RecordBatch;

use crate::error::{Result, TermOutlierError};

mod csv;
mod memory;

pub use csv::{read_csv, write_csv, CsvOptions, CsvSource};
pub use memory::MemorySource;

/// An iterator over consecutive chunks of a dataset.
pub type ChunkIter<'a> = Box<dyn Iterator<Item = Result<RecordBatch>> + Send + 'a>;

/// A dataset that can be read as an ordered, restartable sequence of
/// bounded-size row chunks.
///
/// # Examples
///
/// ```rust,no_run
/// use term_outlier::sources::{ChunkSource, CsvSource};
///
/// # fn example() -> term_outlier::error::Result<()> {
/// let source = CsvSource::new("logs/access.csv");
/// for chunk in source.chunks(100_000)? {
///     let chunk = chunk?;
///     println!("{} rows", chunk.num_rows());
/// }
/// # Ok(())
/// # }
/// ```
pub trait ChunkSource: Debug + Send + Sync {
    /// Starts a fresh pass over the data, yielding chunks of at most
    /// `chunk_size` rows. Errors inside the iterator are read failures.
    fn chunks(&self, chunk_size: usize) -> Result<ChunkIter<'_>>;

    /// Returns a human-readable description of this source.
    fn description(&self) -> String;
}

pub(crate) fn check_chunk_size(chunk_size: usize) -> Result<()> {
    if chunk_size == 0 {
        return Err(TermOutlierError::configuration(
            "chunk_size must be greater than zero",
        ));
    }
    Ok(())
}
