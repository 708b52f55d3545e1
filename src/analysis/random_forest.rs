//! Random Forest classifier: bootstrap-aggregated CART trees split on Gini
//! impurity, with a random feature subset (sqrt of the feature count) tried at
//! every node. Feature importance is the mean decrease in impurity,
//! normalised per tree and again across the forest.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

#[derive(Debug, Clone)]
pub struct ForestParams {
    pub n_estimators: usize,
    pub seed: u64,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            seed: 42,
            max_depth: None,
            min_samples_split: 2,
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        probs: Vec<f64>,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    fn predict_proba<'a>(&'a self, row: &[f64]) -> &'a [f64] {
        match self {
            Node::Leaf { probs } => probs,
            Node::Split { feature, threshold, left, right } => {
                if row[*feature] <= *threshold {
                    left.predict_proba(row)
                } else {
                    right.predict_proba(row)
                }
            }
        }
    }
}

struct TreeBuilder<'a> {
    x: &'a [Vec<f64>],
    y: &'a [usize],
    n_classes: usize,
    max_features: usize,
    params: &'a ForestParams,
    importances: Vec<f64>,
}

impl<'a> TreeBuilder<'a> {
    fn class_counts(&self, idx: &[usize]) -> Vec<usize> {
        let mut counts = vec![0; self.n_classes];
        for &i in idx {
            counts[self.y[i]] += 1;
        }
        counts
    }

    fn build(&mut self, idx: Vec<usize>, depth: usize, rng: &mut StdRng) -> Node {
        let counts = self.class_counts(&idx);
        let n = idx.len() as f64;
        let node_gini = gini(&counts, idx.len());

        let depth_reached = self.params.max_depth.is_some_and(|d| depth >= d);
        if node_gini == 0.0 || idx.len() < self.params.min_samples_split || depth_reached {
            return leaf(&counts);
        }

        let n_features = self.x[0].len();
        let mut features: Vec<usize> = (0..n_features).collect();
        features.shuffle(rng);

        // Keep drawing features past max_features until a valid split appears
        let mut best: Option<(usize, f64, f64)> = None;
        for (tried, &feature) in features.iter().enumerate() {
            if tried >= self.max_features && best.is_some() {
                break;
            }
            if let Some((threshold, impurity)) = self.best_threshold(&idx, feature) {
                if best.map_or(true, |(_, _, b)| impurity < b) {
                    best = Some((feature, threshold, impurity));
                }
            }
        }

        let Some((feature, threshold, child_impurity)) = best else {
            return leaf(&counts);
        };

        self.importances[feature] += n * node_gini - child_impurity;

        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) =
            idx.into_iter().partition(|&i| self.x[i][feature] <= threshold);

        Node::Split {
            feature,
            threshold,
            left: Box::new(self.build(left_idx, depth + 1, rng)),
            right: Box::new(self.build(right_idx, depth + 1, rng)),
        }
    }

    /// Best midpoint threshold on `feature`, with its weighted child impurity
    /// (sum of n_child * gini_child)
    fn best_threshold(&self, idx: &[usize], feature: usize) -> Option<(f64, f64)> {
        let mut sorted: Vec<usize> = idx.to_vec();
        sorted.sort_by(|&a, &b| {
            self.x[a][feature]
                .partial_cmp(&self.x[b][feature])
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let total = self.class_counts(&sorted);
        let mut left = vec![0usize; self.n_classes];
        let mut best: Option<(f64, f64)> = None;

        for split in 1..sorted.len() {
            left[self.y[sorted[split - 1]]] += 1;
            let lo = self.x[sorted[split - 1]][feature];
            let hi = self.x[sorted[split]][feature];
            if lo == hi {
                continue;
            }
            let right: Vec<usize> = total.iter().zip(&left).map(|(t, l)| t - l).collect();
            let n_left = split;
            let n_right = sorted.len() - split;
            let impurity = n_left as f64 * gini(&left, n_left) + n_right as f64 * gini(&right, n_right);
            if best.map_or(true, |(_, b)| impurity < b) {
                best = Some(((lo + hi) / 2.0, impurity));
            }
        }
        best
    }
}

fn gini(counts: &[usize], n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let n = n as f64;
    1.0 - counts.iter().map(|&c| (c as f64 / n).powi(2)).sum::<f64>()
}

fn leaf(counts: &[usize]) -> Node {
    let n: usize = counts.iter().sum();
    let probs = if n == 0 {
        vec![1.0 / counts.len() as f64; counts.len()]
    } else {
        counts.iter().map(|&c| c as f64 / n as f64).collect()
    };
    Node::Leaf { probs }
}

#[derive(Debug, Clone)]
pub struct RandomForest {
    trees: Vec<Node>,
    n_classes: usize,
    importances: Vec<f64>,
}

impl RandomForest {
    /// Fit on rows `x` (all the same width) with class indices `y` in `0..n_classes`
    pub fn fit(x: &[Vec<f64>], y: &[usize], n_classes: usize, params: &ForestParams) -> Self {
        debug_assert_eq!(x.len(), y.len(), "feature rows and labels must align");
        let n_samples = x.len();
        let n_features = x.first().map_or(0, |r| r.len());
        let max_features = ((n_features as f64).sqrt().floor() as usize).max(1);

        let mut rng = StdRng::seed_from_u64(params.seed);
        let mut trees = Vec::with_capacity(params.n_estimators);
        let mut importances = vec![0.0; n_features];

        if n_samples == 0 || n_features == 0 {
            return Self { trees, n_classes, importances };
        }

        for _ in 0..params.n_estimators {
            let bootstrap: Vec<usize> = (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect();
            let mut builder = TreeBuilder {
                x,
                y,
                n_classes,
                max_features,
                params,
                importances: vec![0.0; n_features],
            };
            let root = builder.build(bootstrap, 0, &mut rng);

            let tree_total: f64 = builder.importances.iter().sum();
            if tree_total > 0.0 {
                for (acc, v) in importances.iter_mut().zip(&builder.importances) {
                    *acc += v / tree_total;
                }
            }
            trees.push(root);
        }

        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            for v in &mut importances {
                *v /= total;
            }
        }

        Self { trees, n_classes, importances }
    }

    pub fn predict_proba(&self, row: &[f64]) -> Vec<f64> {
        let mut probs = vec![0.0; self.n_classes];
        for tree in &self.trees {
            for (acc, p) in probs.iter_mut().zip(tree.predict_proba(row)) {
                *acc += p;
            }
        }
        let n = self.trees.len().max(1) as f64;
        probs.iter().map(|p| p / n).collect()
    }

    pub fn predict(&self, row: &[f64]) -> usize {
        self.predict_proba(row)
            .iter()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |best, (i, &p)| if p > best.1 { (i, p) } else { best })
            .0
    }

    /// Mean decrease in impurity per feature, summing to 1 (or all zeros)
    pub fn feature_importances(&self) -> &[f64] {
        &self.importances
    }
}

/// Shuffle-split row indices into (train, test) with `test_fraction` rounded up
pub fn train_test_split(n: usize, test_fraction: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);
    let n_test = ((n as f64) * test_fraction).ceil() as usize;
    let test = indices[..n_test.min(n)].to_vec();
    let train = indices[n_test.min(n)..].to_vec();
    (train, test)
}

pub fn accuracy(truth: &[usize], predicted: &[usize]) -> f64 {
    if truth.is_empty() {
        return 0.0;
    }
    let correct = truth.iter().zip(predicted).filter(|(a, b)| a == b).count();
    correct as f64 / truth.len() as f64
}
