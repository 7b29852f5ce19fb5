//! Result-set helpers shared by the detectors.
//!
//! Datasets are Arrow [`RecordBatch`]es. Detection results keep every
//! original (display) column and append an Int8 [`ANOMALY_COLUMN`] holding
//! `1` for normal rows and `-1` for anomalous ones.

use std::sync::Arc;

use arrow::array::{new_null_array, ArrayRef, BooleanArray, Int8Array};
use arrow::compute::{cast, filter_record_batch};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TermOutlierError};

/// Name of the label column appended to detection results.
pub const ANOMALY_COLUMN: &str = "Anomaly";

/// Per-row detection outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnomalyLabel {
    Normal,
    Anomalous,
}

impl AnomalyLabel {
    /// The value stored in [`ANOMALY_COLUMN`].
    pub fn sentinel(self) -> i8 {
        match self {
            Self::Normal => 1,
            Self::Anomalous => -1,
        }
    }

    /// Parses a stored label value.
    pub fn from_sentinel(value: i8) -> Option<Self> {
        match value {
            1 => Some(Self::Normal),
            -1 => Some(Self::Anomalous),
            _ => None,
        }
    }

    pub fn is_anomalous(self) -> bool {
        self == Self::Anomalous
    }
}

/// A batch with no columns and no rows.
pub fn empty_dataset() -> RecordBatch {
    RecordBatch::new_empty(Arc::new(Schema::empty()))
}

/// `schema` with the label column appended.
///
/// An existing column named [`ANOMALY_COLUMN`] is replaced.
pub fn labeled_schema(schema: &Schema) -> SchemaRef {
    let mut fields: Vec<Field> = schema
        .fields()
        .iter()
        .filter(|f| f.name() != ANOMALY_COLUMN)
        .map(|f| f.as_ref().clone())
        .collect();
    fields.push(Field::new(ANOMALY_COLUMN, DataType::Int8, false));
    Arc::new(Schema::new_with_metadata(fields, schema.metadata().clone()))
}

/// An empty result set shaped like `schema` plus the label column.
pub fn empty_result(schema: &Schema) -> RecordBatch {
    RecordBatch::new_empty(labeled_schema(schema))
}

/// Appends the label column to `batch`.
pub fn annotate(batch: &RecordBatch, labels: &[AnomalyLabel]) -> Result<RecordBatch> {
    if labels.len() != batch.num_rows() {
        return Err(TermOutlierError::Internal(format!(
            "{} labels for {} rows",
            labels.len(),
            batch.num_rows()
        )));
    }
    let schema = batch.schema();
    let mut columns: Vec<ArrayRef> = schema
        .fields()
        .iter()
        .zip(batch.columns())
        .filter(|(f, _)| f.name() != ANOMALY_COLUMN)
        .map(|(_, c)| Arc::clone(c))
        .collect();
    columns.push(Arc::new(Int8Array::from_iter_values(
        labels.iter().map(|l| l.sentinel()),
    )));

    let options = RecordBatchOptions::new().with_row_count(Some(batch.num_rows()));
    Ok(RecordBatch::try_new_with_options(
        labeled_schema(&schema),
        columns,
        &options,
    )?)
}

/// Keeps only the rows labeled anomalous, preserving order.
pub fn select_anomalous(annotated: &RecordBatch, labels: &[AnomalyLabel]) -> Result<RecordBatch> {
    let mask = BooleanArray::from_iter(labels.iter().map(|l| Some(l.is_anomalous())));
    Ok(filter_record_batch(annotated, &mask)?)
}

/// Reads the labels back out of an annotated batch.
pub fn labels_of(annotated: &RecordBatch) -> Result<Vec<AnomalyLabel>> {
    let column = annotated
        .column_by_name(ANOMALY_COLUMN)
        .ok_or_else(|| TermOutlierError::Internal(format!("missing {ANOMALY_COLUMN} column")))?;
    let values = column
        .as_any()
        .downcast_ref::<Int8Array>()
        .ok_or_else(|| TermOutlierError::Internal(format!("{ANOMALY_COLUMN} is not Int8")))?;
    values
        .values()
        .iter()
        .map(|v| {
            AnomalyLabel::from_sentinel(*v)
                .ok_or_else(|| TermOutlierError::Internal(format!("invalid label value {v}")))
        })
        .collect()
}

/// Projects `batch` onto `schema` by column name.
///
/// Columns the batch lacks become all-null; columns of a different type are
/// cast (values that do not convert become null); extra columns are dropped.
pub fn align_to_schema(batch: &RecordBatch, schema: &SchemaRef) -> Result<RecordBatch> {
    let columns = schema
        .fields()
        .iter()
        .map(|field| match batch.column_by_name(field.name()) {
            Some(col) if col.data_type() == field.data_type() => Ok(Arc::clone(col)),
            Some(col) => Ok(cast(col, field.data_type())?),
            None => Ok(new_null_array(field.data_type(), batch.num_rows())),
        })
        .collect::<Result<Vec<_>>>()?;

    let options = RecordBatchOptions::new().with_row_count(Some(batch.num_rows()));
    Ok(RecordBatch::try_new_with_options(
        Arc::clone(schema),
        columns,
        &options,
    )?)
}

/// `schema` with every field nullable.
pub fn nullable_schema(schema: &Schema) -> SchemaRef {
    let fields: Vec<Field> = schema
        .fields()
        .iter()
        .map(|f| f.as_ref().clone().with_nullable(true))
        .collect();
    Arc::new(Schema::new_with_metadata(fields, schema.metadata().clone()))
}
