//! Isolation forest.
//!
//! Each tree recursively splits a random subsample on a random feature at a
//! random value until every point is alone or the height limit is reached.
//! Outliers sit in sparse regions and are isolated after few splits, so a
//! short average path length across the ensemble means a high anomaly score:
//!
//! ```text
//! s(x) = 2 ^ ( -E[h(x)] / c(ψ) )
//! ```
//!
//! where `ψ` is the per-tree sample size and `c(n)` the average path length
//! of an unsuccessful binary-search-tree lookup among `n` points.
//!
//! Rows are labeled anomalous when their score is strictly above the
//! `1 - contamination` quantile of the training scores.
//!
//! Tree construction and scoring use rayon's current pool; callers control
//! parallelism by running inside [`rayon::ThreadPool::install`]. Every tree
//! draws from its own RNG seeded from a master RNG, so results do not depend
//! on thread count.

use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::{FittedModel, OutlierModel};
use crate::config::DetectorConfig;
use crate::error::{Result, TermOutlierError};
use crate::features::FeatureMatrix;

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Average path length of an unsuccessful search in a BST of `n` nodes.
pub fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

/// Linear-interpolation quantile of unsorted `values`, `q` in [0, 1].
pub(crate) fn quantile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

/// Hyperparameters for [`IsolationForest`].
#[derive(Debug, Clone, PartialEq)]
pub struct IsolationForestParams {
    /// Number of trees.
    pub n_estimators: usize,
    /// Cap on the rows each tree is built from; the effective size is
    /// `min(max_samples, n_rows)`.
    pub max_samples: usize,
    /// Expected outlier fraction; sets the decision threshold.
    pub contamination: f64,
    pub random_seed: u64,
}

impl Default for IsolationForestParams {
    fn default() -> Self {
        Self::from_config(&DetectorConfig::default())
    }
}

impl IsolationForestParams {
    pub fn from_config(config: &DetectorConfig) -> Self {
        Self {
            n_estimators: config.n_estimators,
            max_samples: config.max_training_sample,
            contamination: config.contamination,
            random_seed: config.random_seed,
        }
    }
}

impl OutlierModel for IsolationForestParams {
    type Fitted = IsolationForest;

    fn name(&self) -> &str {
        "IsolationForest"
    }

    #[instrument(skip(self, features), fields(rows = features.n_rows(), features = features.n_cols(), trees = self.n_estimators))]
    fn fit(&self, features: &FeatureMatrix) -> Result<IsolationForest> {
        let n_rows = features.n_rows();
        if n_rows == 0 {
            return Err(TermOutlierError::model("cannot fit on zero rows"));
        }
        if features.n_cols() == 0 {
            return Err(TermOutlierError::model("cannot fit on zero features"));
        }
        if self.n_estimators == 0 || self.max_samples == 0 {
            return Err(TermOutlierError::model(
                "n_estimators and max_samples must be positive",
            ));
        }

        let sample_size = self.max_samples.min(n_rows);
        let max_depth = (sample_size as f64).log2().ceil() as usize;

        let mut master = StdRng::seed_from_u64(self.random_seed);
        let seeds: Vec<u64> = (0..self.n_estimators).map(|_| master.random()).collect();

        let trees: Vec<IsolationTree> = seeds
            .par_iter()
            .map(|&seed| {
                let mut rng = StdRng::seed_from_u64(seed);
                let mut rows = index::sample(&mut rng, n_rows, sample_size).into_vec();
                IsolationTree::build(features, &mut rows, max_depth, &mut rng)
            })
            .collect();

        let mut forest = IsolationForest {
            trees,
            columns: features.columns().to_vec(),
            sample_size,
            contamination: self.contamination,
            threshold: f64::INFINITY,
        };

        let training_scores = forest.score_samples(features)?;
        forest.threshold = quantile(&training_scores, 1.0 - self.contamination);
        debug!(
            sample_size,
            max_depth,
            threshold = forest.threshold,
            "Isolation forest fitted"
        );
        Ok(forest)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        size: usize,
    },
}

/// One isolation tree, stored as a flat node arena rooted at index 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsolationTree {
    nodes: Vec<Node>,
}

impl IsolationTree {
    fn build(
        features: &FeatureMatrix,
        rows: &mut [usize],
        max_depth: usize,
        rng: &mut StdRng,
    ) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        tree.grow(features, rows, 0, max_depth, rng);
        tree
    }

    fn grow(
        &mut self,
        features: &FeatureMatrix,
        rows: &mut [usize],
        depth: usize,
        max_depth: usize,
        rng: &mut StdRng,
    ) -> usize {
        let id = self.nodes.len();
        self.nodes.push(Node::Leaf { size: rows.len() });
        if depth >= max_depth || rows.len() <= 1 {
            return id;
        }

        // Only features that still vary within this node can split it
        let candidates: Vec<(usize, f64, f64)> = (0..features.n_cols())
            .filter_map(|j| {
                let (lo, hi) = rows.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &i| {
                    let v = features.row(i)[j];
                    (lo.min(v), hi.max(v))
                });
                (hi > lo).then_some((j, lo, hi))
            })
            .collect();
        if candidates.is_empty() {
            return id;
        }

        let (feature, lo, hi) = candidates[rng.random_range(0..candidates.len())];
        let threshold = rng.random_range(lo..hi);

        let mut mid = 0;
        for k in 0..rows.len() {
            if features.row(rows[k])[feature] <= threshold {
                rows.swap(k, mid);
                mid += 1;
            }
        }
        let (left_rows, right_rows) = rows.split_at_mut(mid);
        let left = self.grow(features, left_rows, depth + 1, max_depth, rng);
        let right = self.grow(features, right_rows, depth + 1, max_depth, rng);
        self.nodes[id] = Node::Split {
            feature,
            threshold,
            left,
            right,
        };
        id
    }

    /// Depth at which `row` lands, plus the expected remaining depth of its
    /// leaf.
    pub fn path_length(&self, row: &[f64]) -> f64 {
        let mut node = 0;
        let mut depth = 0.0;
        loop {
            match self.nodes[node] {
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if row[feature] <= threshold { left } else { right };
                    depth += 1.0;
                }
                Node::Leaf { size } => return depth + average_path_length(size),
            }
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

/// A fitted isolation forest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsolationForest {
    trees: Vec<IsolationTree>,
    columns: Vec<String>,
    sample_size: usize,
    contamination: f64,
    threshold: f64,
}

impl IsolationForest {
    pub fn trees(&self) -> &[IsolationTree] {
        &self.trees
    }

    pub fn sample_size(&self) -> usize {
        self.sample_size
    }

    pub fn contamination(&self) -> f64 {
        self.contamination
    }

    fn score_row(&self, row: &[f64]) -> f64 {
        let normalizer = average_path_length(self.sample_size);
        if normalizer == 0.0 {
            return 0.5;
        }
        let mean_path =
            self.trees.iter().map(|t| t.path_length(row)).sum::<f64>() / self.trees.len() as f64;
        2.0_f64.powf(-mean_path / normalizer)
    }
}

impl FittedModel for IsolationForest {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn threshold(&self) -> f64 {
        self.threshold
    }

    fn score_samples(&self, features: &FeatureMatrix) -> Result<Vec<f64>> {
        self.check_columns(features)?;
        Ok((0..features.n_rows())
            .into_par_iter()
            .map(|i| self.score_row(features.row(i)))
            .collect())
    }
}
