//! Feature preparation: from arbitrary tabular data to a scaled numeric
//! matrix the outlier model can consume.

mod matrix;
pub mod prepare;
mod scaler;

pub use matrix::FeatureMatrix;
pub use prepare::{encode_categorical, prepare_features, CategoricalEncoding, ColumnKind};
pub use scaler::StandardScaler;
