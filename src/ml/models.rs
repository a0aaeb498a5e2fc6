use nalgebra::DMatrix;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{LeadError, Result};

/// Decision tree node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TreeNode {
    /// Class probabilities of the training samples that reached the leaf
    Leaf {
        distribution: Vec<f64>,
        n_samples: usize,
    },
    /// Samples with `x[feature_idx] <= threshold` go left
    Split {
        feature_idx: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
        n_samples: usize,
    },
}

/// Gini-impurity classification tree over class indices `0..n_classes`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    root: Option<TreeNode>,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features drawn per split; `None` considers all of them
    pub max_features: Option<usize>,
    n_features: usize,
    n_classes: usize,
}

struct SplitCandidate {
    feature_idx: usize,
    threshold: f64,
    impurity: f64,
}

fn gini(counts: &[usize], total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let n = total as f64;
    1.0 - counts
        .iter()
        .map(|&c| {
            let p = c as f64 / n;
            p * p
        })
        .sum::<f64>()
}

impl Default for DecisionTree {
    fn default() -> Self {
        Self::new()
    }
}

impl DecisionTree {
    pub fn new() -> Self {
        Self {
            root: None,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            n_features: 0,
            n_classes: 0,
        }
    }

    pub fn with_max_depth(mut self, depth: Option<usize>) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_min_samples_split(mut self, min_samples: usize) -> Self {
        self.min_samples_split = min_samples.max(2);
        self
    }

    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples.max(1);
        self
    }

    pub fn with_max_features(mut self, max_features: Option<usize>) -> Self {
        self.max_features = max_features;
        self
    }

    /// Fits on the rows of `x` listed in `indices` (repeats allowed, as in a bootstrap
    /// sample). `y` holds a class index per row of `x`.
    pub fn fit(
        &mut self,
        x: &DMatrix<f64>,
        y: &[usize],
        indices: &[usize],
        n_classes: usize,
        rng: &mut StdRng,
    ) -> Result<()> {
        if x.nrows() != y.len() {
            return Err(LeadError::Schema(format!(
                "{} feature rows but {} labels",
                x.nrows(),
                y.len()
            )));
        }
        if indices.is_empty() {
            return Err(LeadError::Training("cannot fit a tree on zero samples".to_string()));
        }

        self.n_features = x.ncols();
        self.n_classes = n_classes;
        self.root = Some(self.build(x, y, indices.to_vec(), 0, rng));
        Ok(())
    }

    fn class_counts(&self, y: &[usize], indices: &[usize]) -> Vec<usize> {
        let mut counts = vec![0usize; self.n_classes];
        for &i in indices {
            counts[y[i]] += 1;
        }
        counts
    }

    fn leaf(&self, counts: &[usize], n_samples: usize) -> TreeNode {
        let distribution = counts
            .iter()
            .map(|&c| c as f64 / n_samples.max(1) as f64)
            .collect();
        TreeNode::Leaf {
            distribution,
            n_samples,
        }
    }

    fn build(
        &self,
        x: &DMatrix<f64>,
        y: &[usize],
        indices: Vec<usize>,
        depth: usize,
        rng: &mut StdRng,
    ) -> TreeNode {
        let n_samples = indices.len();
        let counts = self.class_counts(y, &indices);
        let impurity = gini(&counts, n_samples);

        let should_stop = n_samples < self.min_samples_split
            || n_samples < 2 * self.min_samples_leaf
            || self.max_depth.map_or(false, |d| depth >= d)
            || impurity <= f64::EPSILON;

        if should_stop {
            return self.leaf(&counts, n_samples);
        }

        let Some(split) = self.find_best_split(x, y, &indices, rng) else {
            return self.leaf(&counts, n_samples);
        };

        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&i| x[(i, split.feature_idx)] <= split.threshold);

        if left_idx.is_empty() || right_idx.is_empty() {
            return self.leaf(&counts, n_samples);
        }

        let left = Box::new(self.build(x, y, left_idx, depth + 1, rng));
        let right = Box::new(self.build(x, y, right_idx, depth + 1, rng));

        TreeNode::Split {
            feature_idx: split.feature_idx,
            threshold: split.threshold,
            left,
            right,
            n_samples,
        }
    }

    /// Scans features in random order. The first `max_features` are always evaluated;
    /// further features are only visited while no valid partition has been found.
    fn find_best_split(
        &self,
        x: &DMatrix<f64>,
        y: &[usize],
        indices: &[usize],
        rng: &mut StdRng,
    ) -> Option<SplitCandidate> {
        let mut features: Vec<usize> = (0..self.n_features).collect();
        features.shuffle(rng);
        let budget = self.max_features.unwrap_or(self.n_features).clamp(1, self.n_features.max(1));

        let n = indices.len();
        let mut best: Option<SplitCandidate> = None;
        let mut sorted = indices.to_vec();

        for (visited, &feature_idx) in features.iter().enumerate() {
            if visited >= budget && best.is_some() {
                break;
            }

            sorted.sort_by(|&a, &b| {
                x[(a, feature_idx)]
                    .partial_cmp(&x[(b, feature_idx)])
                    .unwrap_or(std::cmp::Ordering::Equal)
            });

            let mut left_counts = vec![0usize; self.n_classes];
            let mut right_counts = self.class_counts(y, &sorted);

            for pos in 0..n - 1 {
                let cls = y[sorted[pos]];
                left_counts[cls] += 1;
                right_counts[cls] -= 1;

                let current = x[(sorted[pos], feature_idx)];
                let next = x[(sorted[pos + 1], feature_idx)];
                if next <= current {
                    continue;
                }

                let n_left = pos + 1;
                let n_right = n - n_left;
                if n_left < self.min_samples_leaf || n_right < self.min_samples_leaf {
                    continue;
                }

                let weighted = (n_left as f64 * gini(&left_counts, n_left)
                    + n_right as f64 * gini(&right_counts, n_right))
                    / n as f64;

                if best.as_ref().map_or(true, |b| weighted < b.impurity) {
                    let mut threshold = current + (next - current) / 2.0;
                    if threshold >= next {
                        threshold = current;
                    }
                    best = Some(SplitCandidate {
                        feature_idx,
                        threshold,
                        impurity: weighted,
                    });
                }
            }
        }

        best
    }

    /// Class distribution for one sample.
    pub fn predict_distribution(&self, sample: &[f64]) -> Result<&[f64]> {
        let mut node = self
            .root
            .as_ref()
            .ok_or_else(|| LeadError::Training("tree is not fitted".to_string()))?;

        loop {
            match node {
                TreeNode::Leaf { distribution, .. } => return Ok(distribution.as_slice()),
                TreeNode::Split {
                    feature_idx,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    node = if sample[*feature_idx] <= *threshold {
                        left.as_ref()
                    } else {
                        right.as_ref()
                    };
                }
            }
        }
    }

    pub fn depth(&self) -> usize {
        fn node_depth(node: &TreeNode) -> usize {
            match node {
                TreeNode::Leaf { .. } => 1,
                TreeNode::Split { left, right, .. } => 1 + node_depth(left).max(node_depth(right)),
            }
        }
        self.root.as_ref().map_or(0, node_depth)
    }
}

/// Strategy for features drawn per split
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaxFeatures {
    Sqrt,
    Log2,
    Fixed(usize),
    All,
}

impl MaxFeatures {
    fn resolve(self, n_features: usize) -> usize {
        let n = match self {
            MaxFeatures::Sqrt => (n_features as f64).sqrt().floor() as usize,
            MaxFeatures::Log2 => (n_features as f64).log2().floor() as usize,
            MaxFeatures::Fixed(k) => k.min(n_features),
            MaxFeatures::All => n_features,
        };
        n.max(1)
    }
}

/// Bagged ensemble of gini trees; predictions average the trees' class distributions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<DecisionTree>,
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: MaxFeatures,
    pub bootstrap: bool,
    pub random_state: Option<u64>,
    classes: Vec<f64>,
    n_features: usize,
}

impl Default for RandomForest {
    fn default() -> Self {
        Self::new(100)
    }
}

impl RandomForest {
    pub fn new(n_estimators: usize) -> Self {
        Self {
            trees: Vec::new(),
            n_estimators,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::Sqrt,
            bootstrap: true,
            random_state: None,
            classes: Vec::new(),
            n_features: 0,
        }
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn with_max_features(mut self, max_features: MaxFeatures) -> Self {
        self.max_features = max_features;
        self
    }

    pub fn with_bootstrap(mut self, bootstrap: bool) -> Self {
        self.bootstrap = bootstrap;
        self
    }

    pub fn fit(&mut self, x: &DMatrix<f64>, y: &[f64]) -> Result<&mut Self> {
        let n_samples = x.nrows();
        if n_samples == 0 || x.ncols() == 0 {
            return Err(LeadError::Training(format!(
                "cannot fit on empty input ({} samples, {} features)",
                n_samples,
                x.ncols()
            )));
        }
        if n_samples != y.len() {
            return Err(LeadError::Schema(format!(
                "{} feature rows but {} labels",
                n_samples,
                y.len()
            )));
        }
        if self.n_estimators == 0 {
            return Err(LeadError::Training("n_estimators must be positive".to_string()));
        }

        let mut classes: Vec<f64> = y.to_vec();
        classes.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        classes.dedup();

        let encoded: Vec<usize> = y
            .iter()
            .map(|v| classes.iter().position(|c| c == v).unwrap_or(0))
            .collect();

        let n_features = x.ncols();
        let max_features = self.max_features.resolve(n_features);
        let mut rng = match self.random_state {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        info!(
            n_samples,
            n_features,
            n_classes = classes.len(),
            n_estimators = self.n_estimators,
            max_features,
            "Fitting random forest"
        );

        let mut trees = Vec::with_capacity(self.n_estimators);
        for tree_idx in 0..self.n_estimators {
            let mut tree_rng = StdRng::seed_from_u64(rng.gen());

            let sample: Vec<usize> = if self.bootstrap {
                (0..n_samples).map(|_| tree_rng.gen_range(0..n_samples)).collect()
            } else {
                (0..n_samples).collect()
            };

            let mut tree = DecisionTree::new()
                .with_max_depth(self.max_depth)
                .with_min_samples_split(self.min_samples_split)
                .with_min_samples_leaf(self.min_samples_leaf)
                .with_max_features(Some(max_features));
            tree.fit(x, &encoded, &sample, classes.len(), &mut tree_rng)?;

            debug!(tree_idx, depth = tree.depth(), "Fitted tree");
            trees.push(tree);
        }

        self.trees = trees;
        self.classes = classes;
        self.n_features = n_features;
        Ok(self)
    }

    fn check_input(&self, x: &DMatrix<f64>) -> Result<()> {
        if self.trees.is_empty() {
            return Err(LeadError::Training("model is not fitted".to_string()));
        }
        if x.ncols() != self.n_features {
            return Err(LeadError::Schema(format!(
                "model expects {} features, got {}",
                self.n_features,
                x.ncols()
            )));
        }
        Ok(())
    }

    /// Mean class distribution over all trees, one row per sample.
    pub fn predict_proba(&self, x: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        self.check_input(x)?;

        let n_classes = self.classes.len();
        let mut proba = DMatrix::zeros(x.nrows(), n_classes);
        for i in 0..x.nrows() {
            let sample: Vec<f64> = x.row(i).iter().copied().collect();
            for tree in &self.trees {
                let dist = tree.predict_distribution(&sample)?;
                for (k, p) in dist.iter().enumerate() {
                    proba[(i, k)] += p;
                }
            }
        }
        proba /= self.trees.len() as f64;
        Ok(proba)
    }

    pub fn predict(&self, x: &DMatrix<f64>) -> Result<Vec<f64>> {
        let proba = self.predict_proba(x)?;

        Ok((0..proba.nrows())
            .map(|i| {
                let mut best = 0;
                for k in 1..proba.ncols() {
                    if proba[(i, k)] > proba[(i, best)] {
                        best = k;
                    }
                }
                self.classes[best]
            })
            .collect())
    }

    pub fn classes(&self) -> &[f64] {
        &self.classes
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn separable() -> (DMatrix<f64>, Vec<f64>) {
        let x = DMatrix::from_row_slice(
            8,
            2,
            &[
                0.0, 5.0, //
                0.1, 3.0, //
                0.2, 4.0, //
                0.3, 1.0, //
                1.0, 2.0, //
                1.1, 5.0, //
                1.2, 1.0, //
                1.3, 3.0, //
            ],
        );
        let y = vec![0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0];
        (x, y)
    }

    #[test]
    fn tree_fits_separable_data() {
        let (x, y) = separable();
        let labels: Vec<usize> = y.iter().map(|&v| v as usize).collect();
        let indices: Vec<usize> = (0..x.nrows()).collect();
        let mut rng = StdRng::seed_from_u64(1);

        let mut tree = DecisionTree::new();
        tree.fit(&x, &labels, &indices, 2, &mut rng).unwrap();

        for i in 0..x.nrows() {
            let sample: Vec<f64> = x.row(i).iter().copied().collect();
            let dist = tree.predict_distribution(&sample).unwrap();
            assert_eq!(dist[labels[i]], 1.0);
        }
        assert_eq!(tree.depth(), 2);
    }

    #[test]
    fn tree_respects_max_depth() {
        let (x, y) = separable();
        let labels: Vec<usize> = y.iter().map(|&v| v as usize).collect();
        let indices: Vec<usize> = (0..x.nrows()).collect();
        let mut rng = StdRng::seed_from_u64(1);

        let mut tree = DecisionTree::new().with_max_depth(Some(0));
        tree.fit(&x, &labels, &indices, 2, &mut rng).unwrap();
        assert_eq!(tree.depth(), 1);
        assert_eq!(tree.predict_distribution(&[0.0, 0.0]).unwrap(), &[0.5, 0.5]);
    }

    #[test]
    fn forest_classifies_training_data() {
        let (x, y) = separable();
        let mut rf = RandomForest::new(25).with_random_state(42);
        rf.fit(&x, &y).unwrap();

        let predictions = rf.predict(&x).unwrap();
        let correct = predictions.iter().zip(&y).filter(|(p, a)| p == a).count();
        assert!(correct >= 7, "only {} correct", correct);
        assert_eq!(rf.n_trees(), 25);
        assert_eq!(rf.classes(), &[0.0, 1.0]);
    }

    #[test]
    fn forest_is_deterministic_with_seed() {
        let (x, y) = separable();
        let mut a = RandomForest::new(10).with_random_state(7);
        let mut b = RandomForest::new(10).with_random_state(7);
        a.fit(&x, &y).unwrap();
        b.fit(&x, &y).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn probabilities_sum_to_one() {
        let (x, y) = separable();
        let mut rf = RandomForest::new(10).with_random_state(3);
        rf.fit(&x, &y).unwrap();

        let proba = rf.predict_proba(&x).unwrap();
        for i in 0..proba.nrows() {
            assert!((proba.row(i).sum() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn empty_input_is_fatal() {
        let x = DMatrix::<f64>::zeros(0, 3);
        let err = RandomForest::new(5).fit(&x, &[]).unwrap_err();
        assert!(matches!(err, LeadError::Training(_)));
    }

    #[test]
    fn feature_count_mismatch_is_schema_error() {
        let (x, y) = separable();
        let mut rf = RandomForest::new(5).with_random_state(1);
        rf.fit(&x, &y).unwrap();

        let wrong = DMatrix::<f64>::zeros(1, 3);
        assert!(matches!(rf.predict(&wrong), Err(LeadError::Schema(_))));
    }

    #[test]
    fn max_features_resolution() {
        assert_eq!(MaxFeatures::Sqrt.resolve(18), 4);
        assert_eq!(MaxFeatures::Log2.resolve(18), 4);
        assert_eq!(MaxFeatures::Fixed(30).resolve(18), 18);
        assert_eq!(MaxFeatures::All.resolve(18), 18);
        assert_eq!(MaxFeatures::Sqrt.resolve(1), 1);
    }

    #[test]
    fn depth_limited_forest_without_bootstrap() {
        let (x, y) = separable();
        let mut rf = RandomForest::new(4)
            .with_random_state(5)
            .with_max_depth(1)
            .with_max_features(MaxFeatures::All)
            .with_bootstrap(false);
        rf.fit(&x, &y).unwrap();

        // One split on the first feature separates the classes.
        assert_eq!(rf.predict(&x).unwrap(), y);
        assert!(rf.trees.iter().all(|t| t.depth() <= 2));
    }

    #[test]
    fn serde_roundtrip_preserves_predictions() {
        let (x, y) = separable();
        let mut rf = RandomForest::new(5).with_random_state(11);
        rf.fit(&x, &y).unwrap();

        let json = serde_json::to_string(&rf).unwrap();
        let restored: RandomForest = serde_json::from_str(&json).unwrap();
        assert_eq!(rf.predict(&x).unwrap(), restored.predict(&x).unwrap());
    }
}
