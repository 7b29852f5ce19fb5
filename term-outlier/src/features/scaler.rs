//! Per-column z-score standardization.

use serde::{Deserialize, Serialize};

use super::FeatureMatrix;
use crate::error::{Result, TermOutlierError};

/// Centers each column on its mean and divides by its population standard
/// deviation. Constant columns keep a scale of 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    columns: Vec<String>,
    mean: Vec<f64>,
    scale: Vec<f64>,
}

impl StandardScaler {
    /// Learns column statistics from `features`.
    pub fn fit(features: &FeatureMatrix) -> Result<Self> {
        let n = features.n_rows();
        if n == 0 {
            return Err(TermOutlierError::model("cannot fit a scaler on zero rows"));
        }

        let mut mean = Vec::with_capacity(features.n_cols());
        let mut scale = Vec::with_capacity(features.n_cols());
        for j in 0..features.n_cols() {
            let m = features.column(j).sum::<f64>() / n as f64;
            let var = features.column(j).map(|v| (v - m).powi(2)).sum::<f64>() / n as f64;
            let sd = var.sqrt();
            mean.push(m);
            // Near-constant columns are left unscaled
            scale.push(if sd < 10.0 * f64::EPSILON * m.abs().max(1.0) {
                1.0
            } else {
                sd
            });
        }

        Ok(Self {
            columns: features.columns().to_vec(),
            mean,
            scale,
        })
    }

    /// Standardizes `features`, which must have the fitted column set.
    pub fn transform(&self, features: &FeatureMatrix) -> Result<FeatureMatrix> {
        if features.columns() != self.columns.as_slice() {
            return Err(TermOutlierError::model(format!(
                "scaler fitted on {:?} applied to {:?}",
                self.columns,
                features.columns()
            )));
        }
        Ok(features.map_cells(|j, v| (v - self.mean[j]) / self.scale[j]))
    }

    pub fn fit_transform(features: &FeatureMatrix) -> Result<(Self, FeatureMatrix)> {
        let scaler = Self::fit(features)?;
        let scaled = scaler.transform(features)?;
        Ok((scaler, scaled))
    }

    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    pub fn scale(&self) -> &[f64] {
        &self.scale
    }
}
