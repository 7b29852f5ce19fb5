//! Numeric downcasting to shrink in-memory datasets.
//!
//! Integer columns move to the narrowest integer type that holds every
//! observed value: unsigned when nothing is negative, signed otherwise.
//! `Float64` columns move to `Float32` when every value is within `f32`
//! range and survives the round trip within an absolute tolerance of
//! [`FLOAT_DOWNCAST_TOLERANCE`]. Columns are never widened, and non-numeric
//! columns pass through untouched.

use std::sync::Arc;

use arrow::array::{Array, ArrayRef, AsArray};
use arrow::compute::{cast, max, min};
use arrow::datatypes::{DataType, Field, Float64Type, Int64Type, Schema, UInt64Type};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use tracing::debug;

use crate::error::Result;

/// Largest absolute error accepted when narrowing `f64` to `f32`.
pub const FLOAT_DOWNCAST_TOLERANCE: f64 = 5e-4;

fn smallest_unsigned(max: u64) -> DataType {
    if max <= u8::MAX as u64 {
        DataType::UInt8
    } else if max <= u16::MAX as u64 {
        DataType::UInt16
    } else if max <= u32::MAX as u64 {
        DataType::UInt32
    } else {
        DataType::UInt64
    }
}

fn smallest_signed(min: i64, max: i64) -> DataType {
    let fits = |lo: i64, hi: i64| min >= lo && max <= hi;
    if fits(i8::MIN as i64, i8::MAX as i64) {
        DataType::Int8
    } else if fits(i16::MIN as i64, i16::MAX as i64) {
        DataType::Int16
    } else if fits(i32::MIN as i64, i32::MAX as i64) {
        DataType::Int32
    } else {
        DataType::Int64
    }
}

/// The narrowest integer type for `array`, or `None` if it is all null.
fn integer_target(array: &ArrayRef) -> Result<Option<DataType>> {
    if array.data_type().is_unsigned_integer() {
        let values = cast(array, &DataType::UInt64)?;
        return Ok(max(values.as_primitive::<UInt64Type>()).map(smallest_unsigned));
    }

    let values = cast(array, &DataType::Int64)?;
    let values = values.as_primitive::<Int64Type>();
    Ok(match (min(values), max(values)) {
        (Some(lo), Some(hi)) if lo >= 0 => Some(smallest_unsigned(hi as u64)),
        (Some(lo), Some(hi)) => Some(smallest_signed(lo, hi)),
        _ => None,
    })
}

fn float32_round_trips(array: &ArrayRef) -> bool {
    let values = array.as_primitive::<Float64Type>();
    values.iter().flatten().all(|v| {
        if !v.is_finite() {
            return true;
        }
        v.abs() <= f32::MAX as f64 && ((v as f32) as f64 - v).abs() <= FLOAT_DOWNCAST_TOLERANCE
    })
}

/// Returns the downcast replacement for a column, if any.
pub fn downcast_column(array: &ArrayRef) -> Result<Option<ArrayRef>> {
    let current = array.data_type();
    let target = if current.is_integer() {
        match integer_target(array)? {
            Some(t) if t.primitive_width() < current.primitive_width() => t,
            _ => return Ok(None),
        }
    } else if *current == DataType::Float64 && array.null_count() < array.len() {
        if !float32_round_trips(array) {
            return Ok(None);
        }
        DataType::Float32
    } else {
        return Ok(None);
    };
    Ok(Some(cast(array, &target)?))
}

/// Returns `batch` with every numeric column in its narrowest safe type.
pub fn optimize_memory(batch: &RecordBatch) -> Result<RecordBatch> {
    let schema = batch.schema();
    let mut fields = Vec::with_capacity(schema.fields().len());
    let mut columns = Vec::with_capacity(batch.num_columns());
    let mut saved = 0usize;

    for (field, array) in schema.fields().iter().zip(batch.columns()) {
        match downcast_column(array)? {
            Some(narrow) => {
                debug!(
                    column = %field.name(),
                    from = %field.data_type(),
                    to = %narrow.data_type(),
                    "Downcast column"
                );
                saved += array
                    .get_array_memory_size()
                    .saturating_sub(narrow.get_array_memory_size());
                let narrowed = Field::new(
                    field.name(),
                    narrow.data_type().clone(),
                    field.is_nullable(),
                );
                fields.push(narrowed.with_metadata(field.metadata().clone()));
                columns.push(narrow);
            }
            None => {
                fields.push(field.as_ref().clone());
                columns.push(Arc::clone(array));
            }
        }
    }

    debug!(bytes_saved = saved, "Memory optimization complete");
    let schema = Arc::new(Schema::new_with_metadata(fields, schema.metadata().clone()));
    let options = RecordBatchOptions::new().with_row_count(Some(batch.num_rows()));
    Ok(RecordBatch::try_new_with_options(schema, columns, &options)?)
}
