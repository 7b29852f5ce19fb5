//! CSV file source implementation.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::compute::concat_batches;
use arrow::csv::reader::Format;
use arrow::csv::{ReaderBuilder, WriterBuilder};
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use once_cell::sync::OnceCell;
use tracing::{info, instrument};

use super::{check_chunk_size, ChunkIter, ChunkSource};
use crate::error::{Result, TermOutlierError};
use crate::log_data_op;
use crate::logging::{truncate_field, LogConfig};

/// Rows per batch when a whole file is loaded at once.
const LOAD_BATCH_SIZE: usize = 65_536;

/// Options for configuring CSV file reading.
#[derive(Debug, Clone)]
pub struct CsvOptions {
    /// Whether the CSV file has a header row
    pub has_header: bool,
    /// Field delimiter (default: ',')
    pub delimiter: u8,
    /// Quote character (default: '"')
    pub quote: u8,
    /// Escape character (default: None)
    pub escape: Option<u8>,
    /// Comment prefix (lines starting with this are ignored)
    pub comment: Option<u8>,
    /// Schema to use (if None, will be inferred)
    pub schema: Option<SchemaRef>,
    /// Maximum records to read for schema inference (None reads the whole file)
    pub schema_infer_max_records: Option<usize>,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            has_header: true,
            delimiter: b',',
            quote: b'"',
            escape: None,
            comment: None,
            schema: None,
            schema_infer_max_records: None,
        }
    }
}

impl CsvOptions {
    fn format(&self) -> Format {
        let mut format = Format::default()
            .with_header(self.has_header)
            .with_delimiter(self.delimiter)
            .with_quote(self.quote);
        if let Some(escape) = self.escape {
            format = format.with_escape(escape);
        }
        if let Some(comment) = self.comment {
            format = format.with_comment(comment);
        }
        format
    }

    fn reader_builder(&self, schema: SchemaRef, batch_size: usize) -> ReaderBuilder {
        let mut builder = ReaderBuilder::new(schema)
            .with_header(self.has_header)
            .with_delimiter(self.delimiter)
            .with_quote(self.quote)
            .with_batch_size(batch_size);
        if let Some(escape) = self.escape {
            builder = builder.with_escape(escape);
        }
        if let Some(comment) = self.comment {
            builder = builder.with_comment(comment);
        }
        builder
    }
}

/// A CSV file read in chunks.
///
/// Each pass reopens the file. The schema is inferred once and reused for
/// every pass. By default inference scans every record, so a column that
/// holds only integers early on and a fraction later is read as Float64.
/// With `schema_infer_max_records` set, a later row that does not parse
/// under the inferred schema fails the pass with a source read error.
///
/// # Examples
///
/// ```rust,ignore
/// use term_outlier::sources::{CsvSource, CsvOptions};
///
/// let source = CsvSource::with_options(
///     "data/events.tsv",
///     CsvOptions { delimiter: b'\t', ..Default::default() },
/// );
/// ```
#[derive(Debug)]
pub struct CsvSource {
    path: PathBuf,
    options: CsvOptions,
    logging: LogConfig,
    inferred_schema: OnceCell<SchemaRef>,
}

impl CsvSource {
    /// Creates a new CSV source from a single file path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_options(path, CsvOptions::default())
    }

    /// Creates a new CSV source with custom options.
    pub fn with_options(path: impl Into<PathBuf>, options: CsvOptions) -> Self {
        Self {
            path: path.into(),
            options,
            logging: LogConfig::default(),
            inferred_schema: OnceCell::new(),
        }
    }

    /// Sets the logging configuration for file operations.
    pub fn with_logging(mut self, logging: LogConfig) -> Self {
        self.logging = logging;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn display_path(&self) -> String {
        truncate_field(&self.path.display().to_string(), self.logging.max_field_length)
    }

    fn read_error(&self, err: impl std::error::Error + Send + Sync + 'static) -> TermOutlierError {
        TermOutlierError::source_read_with_source(
            "CSV",
            format!("failed to read {}", self.path.display()),
            Box::new(err),
        )
    }

    fn open(&self) -> Result<File> {
        File::open(&self.path).map_err(|e| self.read_error(e))
    }

    /// The schema used to parse the file, inferring it on first use.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn schema(&self) -> Result<SchemaRef> {
        if let Some(schema) = &self.options.schema {
            return Ok(Arc::clone(schema));
        }
        self.inferred_schema
            .get_or_try_init(|| {
                let (schema, records) = self
                    .options
                    .format()
                    .infer_schema(self.open()?, self.options.schema_infer_max_records)
                    .map_err(|e| self.read_error(e))?;
                log_data_op!(
                    self.logging,
                    path = %self.display_path(),
                    columns = schema.fields().len(),
                    records_sampled = records,
                    "Inferred CSV schema"
                );
                Ok(Arc::new(schema))
            })
            .cloned()
    }

    fn batches(&self, batch_size: usize) -> Result<ChunkIter<'_>> {
        let schema = self.schema()?;
        if schema.fields().is_empty() {
            return Ok(Box::new(std::iter::empty()));
        }
        let reader = self
            .options
            .reader_builder(schema, batch_size)
            .build(self.open()?)
            .map_err(|e| self.read_error(e))?;
        Ok(Box::new(
            reader.map(move |batch| batch.map_err(|e| self.read_error(e))),
        ))
    }

    /// Loads the whole file into one batch.
    pub fn read_all(&self) -> Result<RecordBatch> {
        let schema = self.schema()?;
        let batches = self.batches(LOAD_BATCH_SIZE)?.collect::<Result<Vec<_>>>()?;
        info!(
            path = %self.display_path(),
            batches = batches.len(),
            "Loaded CSV file"
        );
        Ok(concat_batches(&schema, &batches)?)
    }
}

impl ChunkSource for CsvSource {
    fn chunks(&self, chunk_size: usize) -> Result<ChunkIter<'_>> {
        check_chunk_size(chunk_size)?;
        log_data_op!(
            self.logging,
            path = %self.display_path(),
            chunk_size,
            "Opening CSV source"
        );
        self.batches(chunk_size)
    }

    fn description(&self) -> String {
        format!("csv ({})", self.path.display())
    }
}

/// Reads a whole CSV file into memory.
pub fn read_csv(path: impl Into<PathBuf>, options: &CsvOptions) -> Result<RecordBatch> {
    CsvSource::with_options(path, options.clone()).read_all()
}

/// Writes `batch` to `path` as CSV with a header row.
pub fn write_csv(batch: &RecordBatch, path: impl AsRef<Path>) -> Result<()> {
    let file = File::create(path.as_ref())?;
    let mut writer = WriterBuilder::new().with_header(true).build(file);
    writer.write(batch)?;
    Ok(())
}
