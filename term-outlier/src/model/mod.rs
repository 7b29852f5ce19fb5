//! Outlier models.
//!
//! An outlier model is split into its hyperparameters ([`OutlierModel`]) and
//! the immutable result of fitting them ([`FittedModel`]). A fitted model is
//! bound to the exact column set it was trained on and refuses anything
//! else. [`ScaledModel`] pairs a fitted model with the standardization
//! learned alongside it, which is what the detectors score with.

mod isolation_forest;
pub mod persistence;

pub use isolation_forest::{average_path_length, IsolationForest, IsolationForestParams, IsolationTree};

use serde::{Deserialize, Serialize};

use crate::dataset::AnomalyLabel;
use crate::error::{Result, TermOutlierError};
use crate::features::{FeatureMatrix, StandardScaler};

/// Unfitted model configuration.
pub trait OutlierModel: Send + Sync {
    type Fitted: FittedModel + Serialize;

    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// Fits on `features`, which must have at least one row and one column.
    fn fit(&self, features: &FeatureMatrix) -> Result<Self::Fitted>;
}

/// A trained, immutable outlier model.
pub trait FittedModel: Send + Sync {
    /// The column set, in order, this model accepts.
    fn columns(&self) -> &[String];

    /// Scores above this value are anomalous.
    fn threshold(&self) -> f64;

    /// Anomaly score per row; higher is more anomalous.
    fn score_samples(&self, features: &FeatureMatrix) -> Result<Vec<f64>>;

    /// Label per row.
    fn predict(&self, features: &FeatureMatrix) -> Result<Vec<AnomalyLabel>> {
        let threshold = self.threshold();
        Ok(self
            .score_samples(features)?
            .into_iter()
            .map(|s| {
                if s > threshold {
                    AnomalyLabel::Anomalous
                } else {
                    AnomalyLabel::Normal
                }
            })
            .collect())
    }

    fn check_columns(&self, features: &FeatureMatrix) -> Result<()> {
        if features.columns() != self.columns() {
            return Err(TermOutlierError::model(format!(
                "model trained on {:?} cannot score {:?}",
                self.columns(),
                features.columns()
            )));
        }
        Ok(())
    }
}

/// A fitted model together with the scaler its training data went through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaledModel<F> {
    pub scaler: StandardScaler,
    pub model: F,
}

impl<F: FittedModel> ScaledModel<F> {
    /// Standardizes `features`, then fits `params` on the result.
    pub fn fit<M>(params: &M, features: &FeatureMatrix) -> Result<Self>
    where
        M: OutlierModel<Fitted = F>,
    {
        let (scaler, scaled) = StandardScaler::fit_transform(features)?;
        let model = params.fit(&scaled)?;
        Ok(Self { scaler, model })
    }

    /// Labels raw (unscaled) `features` with the model's column set.
    pub fn predict(&self, features: &FeatureMatrix) -> Result<Vec<AnomalyLabel>> {
        let scaled = self.scaler.transform(features)?;
        self.model.predict(&scaled)
    }

    pub fn columns(&self) -> &[String] {
        self.model.columns()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn skewed() -> FeatureMatrix {
        let mut rows: Vec<Vec<f64>> = (0..100)
            .map(|i| vec![1_000.0 + (i % 10) as f64, 0.001 * (i % 7) as f64])
            .collect();
        rows.push(vec![50_000.0, 0.5]);
        FeatureMatrix::from_rows(vec!["bytes".into(), "rate".into()], rows).unwrap()
    }

    #[test]
    fn test_scaled_model_flags_outlier_in_raw_units() {
        let params = IsolationForestParams {
            n_estimators: 100,
            max_samples: 64,
            contamination: 0.05,
            random_seed: 42,
        };
        let fitted = ScaledModel::fit(&params, &skewed()).unwrap();
        assert_eq!(fitted.columns(), &["bytes".to_string(), "rate".to_string()]);

        let labels = fitted.predict(&skewed()).unwrap();
        assert_eq!(labels[100], AnomalyLabel::Anomalous);
    }

    #[test]
    fn test_predict_uses_strict_threshold() {
        struct Fixed(Vec<String>);
        impl FittedModel for Fixed {
            fn columns(&self) -> &[String] {
                &self.0
            }
            fn threshold(&self) -> f64 {
                0.5
            }
            fn score_samples(&self, features: &FeatureMatrix) -> Result<Vec<f64>> {
                self.check_columns(features)?;
                Ok(features.rows().map(|r| r[0]).collect())
            }
        }

        let model = Fixed(vec!["s".into()]);
        let m = FeatureMatrix::from_rows(vec!["s".into()], vec![vec![0.4], vec![0.5], vec![0.6]])
            .unwrap();
        assert_eq!(
            model.predict(&m).unwrap(),
            vec![
                AnomalyLabel::Normal,
                AnomalyLabel::Normal,
                AnomalyLabel::Anomalous
            ]
        );
    }
}
