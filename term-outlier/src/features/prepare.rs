//! Turns an arbitrary Arrow batch into a [`FeatureMatrix`].
//!
//! Column handling, in schema order:
//!
//! | Arrow type                                   | Feature                                  |
//! |----------------------------------------------|------------------------------------------|
//! | integers, floats, decimals                   | value as `f64`                           |
//! | strings, string dictionaries, dates, times   | first-appearance categorical code        |
//! | `Null` (entirely missing)                    | all zeros                                |
//! | booleans, binary, nested                     | dropped                                  |
//!
//! Missing values (nulls, NaN and infinities) are imputed to `0.0` after encoding.
//!
//! Codes are assigned per call: preparing two chunks of the same file
//! separately can give one string two different codes. The streaming
//! detector inherits this (see `detector::streaming`).

use std::collections::HashMap;

use arrow::array::{Array, ArrayRef, AsArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Float64Type};
use arrow::record_batch::RecordBatch;
use tracing::debug;

use super::FeatureMatrix;
use crate::error::{ErrorContext, Result};

/// Code imputed for missing cells.
pub const MISSING_FILL: f64 = 0.0;

/// Mapping from distinct text values to integer codes, in order of first
/// appearance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoricalEncoding {
    codes: HashMap<String, usize>,
}

impl CategoricalEncoding {
    /// The code assigned to `value`, if it was observed.
    pub fn code_of(&self, value: &str) -> Option<usize> {
        self.codes.get(value).copied()
    }

    /// Number of distinct values observed.
    pub fn cardinality(&self) -> usize {
        self.codes.len()
    }

    fn encode(&mut self, value: &str) -> usize {
        if let Some(code) = self.codes.get(value) {
            return *code;
        }
        let code = self.codes.len();
        self.codes.insert(value.to_string(), code);
        code
    }
}

/// How a column enters the feature matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Numeric,
    Categorical,
    AllMissing,
    Unsupported,
}

impl ColumnKind {
    pub fn of(data_type: &DataType) -> Self {
        match data_type {
            DataType::Null => Self::AllMissing,
            dt if dt.is_numeric() => Self::Numeric,
            DataType::Utf8
            | DataType::LargeUtf8
            | DataType::Utf8View
            | DataType::Date32
            | DataType::Date64
            | DataType::Time32(_)
            | DataType::Time64(_)
            | DataType::Timestamp(_, _) => Self::Categorical,
            DataType::Dictionary(_, value) => match Self::of(value) {
                Self::Categorical | Self::Numeric => Self::Categorical,
                _ => Self::Unsupported,
            },
            _ => Self::Unsupported,
        }
    }
}

/// Encodes a column as first-appearance codes.
///
/// Returns the codes (missing cells as [`MISSING_FILL`]) and the encoding.
pub fn encode_categorical(array: &ArrayRef) -> Result<(Vec<f64>, CategoricalEncoding)> {
    let text = cast(array, &DataType::Utf8)?;
    let text = text.as_string::<i32>();

    let mut encoding = CategoricalEncoding::default();
    let codes = text
        .iter()
        .map(|value| match value {
            Some(v) => encoding.encode(v) as f64,
            None => MISSING_FILL,
        })
        .collect();
    Ok((codes, encoding))
}

fn numeric_values(array: &ArrayRef) -> Result<Vec<f64>> {
    let floats = cast(array, &DataType::Float64)?;
    let floats = floats.as_primitive::<Float64Type>();
    Ok(floats
        .iter()
        .map(|v| match v {
            Some(v) if v.is_finite() => v,
            _ => MISSING_FILL,
        })
        .collect())
}

/// Prepares the numeric feature view of `batch`.
///
/// The result has one row per batch row and one column per retained batch
/// column, in schema order. If no column is retained the matrix has zero
/// columns; callers must not score it.
pub fn prepare_features(batch: &RecordBatch) -> Result<FeatureMatrix> {
    let schema = batch.schema();
    let mut names = Vec::new();
    let mut data = Vec::new();

    for (field, array) in schema.fields().iter().zip(batch.columns()) {
        let values = match ColumnKind::of(field.data_type()) {
            ColumnKind::Numeric => numeric_values(array),
            ColumnKind::Categorical => encode_categorical(array).map(|(codes, _)| codes),
            ColumnKind::AllMissing => Ok(vec![MISSING_FILL; array.len()]),
            ColumnKind::Unsupported => {
                debug!(column = %field.name(), data_type = %field.data_type(), "Dropping non-numeric column");
                continue;
            }
        }
        .with_context(|| format!("failed to prepare column {}", field.name()))?;
        names.push(field.name().clone());
        data.push(values);
    }

    if names.is_empty() {
        return Ok(FeatureMatrix::without_columns(batch.num_rows()));
    }
    FeatureMatrix::from_columns(names, data)
}
