//! Dense numeric feature matrix.

use crate::error::{Result, TermOutlierError};

/// A row-major `f64` matrix with named columns.
///
/// Every cell is finite-or-imputed numeric; missing values never reach a
/// `FeatureMatrix`.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    columns: Vec<String>,
    values: Vec<f64>,
    n_rows: usize,
}

impl FeatureMatrix {
    /// Builds a matrix from column vectors of equal length.
    pub fn from_columns(columns: Vec<String>, data: Vec<Vec<f64>>) -> Result<Self> {
        if columns.len() != data.len() {
            return Err(TermOutlierError::Internal(format!(
                "{} column names for {} columns",
                columns.len(),
                data.len()
            )));
        }
        let n_rows = data.first().map_or(0, Vec::len);
        if let Some(bad) = data.iter().position(|c| c.len() != n_rows) {
            return Err(TermOutlierError::Internal(format!(
                "column '{}' has {} rows, expected {n_rows}",
                columns[bad],
                data[bad].len()
            )));
        }

        let n_cols = columns.len();
        let mut values = vec![0.0; n_rows * n_cols];
        for (j, column) in data.iter().enumerate() {
            for (i, v) in column.iter().enumerate() {
                values[i * n_cols + j] = *v;
            }
        }
        Ok(Self {
            columns,
            values,
            n_rows,
        })
    }

    /// Builds a matrix from rows of equal width.
    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<f64>>) -> Result<Self> {
        let n_cols = columns.len();
        if let Some(bad) = rows.iter().position(|r| r.len() != n_cols) {
            return Err(TermOutlierError::Internal(format!(
                "row {bad} has {} values, expected {n_cols}",
                rows[bad].len()
            )));
        }
        let n_rows = rows.len();
        Ok(Self {
            columns,
            values: rows.into_iter().flatten().collect(),
            n_rows,
        })
    }

    /// A matrix with the given row count and no columns.
    pub fn without_columns(n_rows: usize) -> Self {
        Self {
            columns: Vec::new(),
            values: Vec::new(),
            n_rows,
        }
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    /// The values of row `i`.
    pub fn row(&self, i: usize) -> &[f64] {
        let n_cols = self.n_cols();
        &self.values[i * n_cols..(i + 1) * n_cols]
    }

    /// Iterates rows in order.
    pub fn rows(&self) -> impl Iterator<Item = &[f64]> + '_ {
        (0..self.n_rows).map(move |i| self.row(i))
    }

    /// Iterates the values of column `j`.
    pub fn column(&self, j: usize) -> impl Iterator<Item = f64> + '_ {
        let n_cols = self.n_cols();
        (0..self.n_rows).map(move |i| self.values[i * n_cols + j])
    }

    /// A new matrix holding the rows at `indices`, in that order.
    pub fn select_rows(&self, indices: &[usize]) -> Self {
        let mut values = Vec::with_capacity(indices.len() * self.n_cols());
        for &i in indices {
            values.extend_from_slice(self.row(i));
        }
        Self {
            columns: self.columns.clone(),
            values,
            n_rows: indices.len(),
        }
    }

    /// Projects onto `columns` in that order.
    ///
    /// Columns this matrix lacks are filled with 0.
    pub fn align_to(&self, columns: &[String]) -> Self {
        let positions: Vec<Option<usize>> = columns
            .iter()
            .map(|name| self.columns.iter().position(|c| c == name))
            .collect();

        let mut values = Vec::with_capacity(self.n_rows * columns.len());
        for row in self.rows() {
            values.extend(positions.iter().map(|p| p.map_or(0.0, |j| row[j])));
        }
        Self {
            columns: columns.to_vec(),
            values,
            n_rows: self.n_rows,
        }
    }

    /// Applies `f(column_index, value)` to every cell.
    pub(crate) fn map_cells(&self, f: impl Fn(usize, f64) -> f64) -> Self {
        let n_cols = self.n_cols();
        let values = self
            .values
            .iter()
            .enumerate()
            .map(|(k, v)| f(k % n_cols, *v))
            .collect();
        Self {
            columns: self.columns.clone(),
            values,
            n_rows: self.n_rows,
        }
    }
}
