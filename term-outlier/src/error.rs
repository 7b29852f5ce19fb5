//! Error types for the term-outlier anomaly detection library.
//!
//! All fallible operations return [`Result`], whose error side is
//! [`TermOutlierError`]. Conditions that the detectors treat as ordinary
//! outcomes (empty input, no usable numeric features) are not errors; they are
//! reported through [`crate::detector::DetectionOutcome`] instead.

use thiserror::Error;

/// The main error type for the term-outlier library.
#[derive(Error, Debug)]
pub enum TermOutlierError {
    /// Error from Arrow operations.
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// A chunked source failed while being read.
    ///
    /// This is fatal for the invocation that observed it; no partial result
    /// is returned.
    #[error("Source read error ({source_type}): {message}")]
    SourceRead {
        /// Type of source (e.g., "CSV", "memory")
        source_type: String,
        /// Detailed error message
        message: String,
        /// Optional underlying error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Error from I/O operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Error related to configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The outlier model was used outside its contract.
    #[error("Model error: {0}")]
    Model(String),

    /// Error from serialization/deserialization operations.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic internal error for unexpected conditions.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A type alias for `Result<T, TermOutlierError>`.
pub type Result<T> = std::result::Result<T, TermOutlierError>;

impl TermOutlierError {
    /// Creates a new source read error.
    pub fn source_read(source_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SourceRead {
            source_type: source_type.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new source read error with an underlying cause.
    pub fn source_read_with_source(
        source_type: impl Into<String>,
        message: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::SourceRead {
            source_type: source_type.into(),
            message: message.into(),
            source: Some(source),
        }
    }

    /// Creates a new configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Creates a new model error.
    pub fn model(message: impl Into<String>) -> Self {
        Self::Model(message.into())
    }
}

impl From<serde_json::Error> for TermOutlierError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<rayon::ThreadPoolBuildError> for TermOutlierError {
    fn from(err: rayon::ThreadPoolBuildError) -> Self {
        Self::Internal(format!("failed to build worker pool: {err}"))
    }
}

/// Extension trait for adding context to errors.
pub trait ErrorContext<T> {
    /// Adds context to an error.
    fn context(self, msg: &str) -> Result<T>;

    /// Adds context with a lazy message.
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: Into<TermOutlierError>,
{
    fn context(self, msg: &str) -> Result<T> {
        self.with_context(|| msg.to_string())
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| match e.into() {
            TermOutlierError::Internal(inner) => {
                TermOutlierError::Internal(format!("{}: {}", f(), inner))
            }
            other => TermOutlierError::Internal(format!("{}: {}", f(), other)),
        })
    }
}
