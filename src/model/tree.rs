//! CART classification tree with gini impurity.
//!
//! Exact-greedy construction: every distinct sorted value boundary of every
//! candidate feature is tried, and the split with the lowest weighted gini wins.
//! Nodes live in a flat arena; children are referenced by index.

use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Growth limits for a single tree.
#[derive(Clone, Debug)]
pub struct TreeConfig {
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features considered per split before falling back to the rest.
    pub max_features: usize,
}

/// Tree node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Node {
    Leaf {
        /// Fraction of class-1 samples that reached this leaf.
        positive_fraction: f64,
        samples: usize,
    },
    Split {
        feature: usize,
        /// Rows with `value <= threshold` go left.
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// A fitted classification tree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<Node>,
}

#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    feature: usize,
    threshold: f64,
    impurity: f64,
}

fn gini(positives: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let p = positives as f64 / total as f64;
    2.0 * p * (1.0 - p)
}

impl DecisionTree {
    /// Grow a tree on the rows of `x` selected by `indices` (duplicates allowed).
    pub fn fit(
        x: &[Vec<f64>],
        y: &[u8],
        indices: &[usize],
        config: &TreeConfig,
        rng: &mut ChaCha8Rng,
    ) -> Self {
        let n_features = x.first().map_or(0, Vec::len);
        let mut builder = TreeBuilder {
            x,
            y,
            config,
            n_features,
            rng,
            nodes: Vec::new(),
        };
        builder.build(indices);
        Self {
            nodes: builder.nodes,
        }
    }

    /// Class-1 probability for one row.
    #[must_use]
    pub fn predict_proba(&self, row: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf {
                    positive_fraction, ..
                } => return *positive_fraction,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut stack = if self.nodes.is_empty() { Vec::new() } else { vec![(0, 0)] };
        while let Some((idx, depth)) = stack.pop() {
            match &self.nodes[idx] {
                Node::Leaf { .. } => deepest = deepest.max(depth),
                Node::Split { left, right, .. } => {
                    stack.push((*left, depth + 1));
                    stack.push((*right, depth + 1));
                }
            }
        }
        deepest
    }

    /// Check that every split references an existing node and a feature below `n_features`.
    ///
    /// # Errors
    /// Returns a message describing the first malformed node.
    pub fn validate(&self, n_features: usize) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".to_string());
        }
        for (i, node) in self.nodes.iter().enumerate() {
            match node {
                Node::Split {
                    feature,
                    left,
                    right,
                    threshold,
                } => {
                    if *feature >= n_features {
                        return Err(format!("node {i} splits on feature {feature} of {n_features}"));
                    }
                    if *left <= i || *right <= i || *left >= self.nodes.len() || *right >= self.nodes.len() {
                        return Err(format!("node {i} has invalid children {left}/{right}"));
                    }
                    if !threshold.is_finite() {
                        return Err(format!("node {i} has a non-finite threshold"));
                    }
                }
                Node::Leaf {
                    positive_fraction, ..
                } => {
                    if !(0.0..=1.0).contains(positive_fraction) {
                        return Err(format!("leaf {i} has probability {positive_fraction}"));
                    }
                }
            }
        }
        Ok(())
    }
}

/// A node still to be grown: its arena slot, its rows sorted by each feature, and its depth.
struct PendingNode {
    slot: usize,
    sorted: Vec<Vec<usize>>,
    depth: usize,
}

struct TreeBuilder<'a> {
    x: &'a [Vec<f64>],
    y: &'a [u8],
    config: &'a TreeConfig,
    n_features: usize,
    rng: &'a mut ChaCha8Rng,
    nodes: Vec<Node>,
}

impl TreeBuilder<'_> {
    /// Grow the tree depth-first from an explicit work stack.
    ///
    /// Rows are sorted once per feature here; splitting partitions every sorted
    /// list stably, so each child receives lists that are still sorted.
    fn build(&mut self, indices: &[usize]) {
        let sorted: Vec<Vec<usize>> = (0..self.n_features)
            .map(|feature| {
                let mut rows = indices.to_vec();
                rows.sort_by(|&a, &b| self.x[a][feature].total_cmp(&self.x[b][feature]));
                rows
            })
            .collect();

        // Without features the root leaf is the whole tree.
        if self.n_features == 0 {
            let positives = indices.iter().filter(|&&i| self.y[i] == 1).count();
            self.nodes.push(Self::leaf(indices.len(), positives));
            return;
        }

        self.nodes.push(Self::leaf(0, 0));
        let mut stack = vec![PendingNode {
            slot: 0,
            sorted,
            depth: 0,
        }];

        while let Some(PendingNode { slot, sorted, depth }) = stack.pop() {
            let rows = &sorted[0];
            let positives = rows.iter().filter(|&&i| self.y[i] == 1).count();
            self.nodes[slot] = Self::leaf(rows.len(), positives);

            let pure = positives == 0 || positives == rows.len();
            let depth_reached = self.config.max_depth.is_some_and(|d| depth >= d);
            if pure
                || depth_reached
                || rows.len() < self.config.min_samples_split
                || rows.len() < 2 * self.config.min_samples_leaf
            {
                continue;
            }

            let Some(split) = self.find_best_split(&sorted, positives) else {
                continue;
            };

            let mut left_sorted = Vec::with_capacity(self.n_features);
            let mut right_sorted = Vec::with_capacity(self.n_features);
            for rows in sorted {
                let (l, r): (Vec<usize>, Vec<usize>) = rows
                    .into_iter()
                    .partition(|&i| self.x[i][split.feature] <= split.threshold);
                left_sorted.push(l);
                right_sorted.push(r);
            }

            let left = self.nodes.len();
            self.nodes.push(Self::leaf(0, 0));
            let right = self.nodes.len();
            self.nodes.push(Self::leaf(0, 0));
            self.nodes[slot] = Node::Split {
                feature: split.feature,
                threshold: split.threshold,
                left,
                right,
            };

            stack.push(PendingNode {
                slot: right,
                sorted: right_sorted,
                depth: depth + 1,
            });
            stack.push(PendingNode {
                slot: left,
                sorted: left_sorted,
                depth: depth + 1,
            });
        }
    }

    fn leaf(samples: usize, positives: usize) -> Node {
        Node::Leaf {
            positive_fraction: if samples == 0 {
                0.0
            } else {
                positives as f64 / samples as f64
            },
            samples,
        }
    }

    /// Best split over a random feature subset, widening to the remaining
    /// features only when the subset offers no valid split.
    fn find_best_split(&mut self, sorted: &[Vec<usize>], positives: usize) -> Option<SplitCandidate> {
        let mut features: Vec<usize> = (0..self.n_features).collect();
        features.shuffle(&mut *self.rng);

        let mut best: Option<SplitCandidate> = None;
        for (visited, &feature) in features.iter().enumerate() {
            if visited >= self.config.max_features && best.is_some() {
                break;
            }
            if let Some(candidate) = self.best_split_for_feature(&sorted[feature], feature, positives) {
                if best.map_or(true, |b| candidate.impurity < b.impurity) {
                    best = Some(candidate);
                }
            }
        }
        best
    }

    /// Scan one feature's presorted rows for the lowest weighted gini boundary.
    fn best_split_for_feature(&self, rows: &[usize], feature: usize, total_pos: usize) -> Option<SplitCandidate> {
        let n = rows.len();
        let min_leaf = self.config.min_samples_leaf.max(1);

        let mut left_pos = 0;
        let mut best: Option<SplitCandidate> = None;
        for i in 0..n.saturating_sub(1) {
            if self.y[rows[i]] == 1 {
                left_pos += 1;
            }
            let left_n = i + 1;
            let right_n = n - left_n;
            let (lo, hi) = (self.x[rows[i]][feature], self.x[rows[i + 1]][feature]);
            if lo >= hi || left_n < min_leaf || right_n < min_leaf {
                continue;
            }

            let impurity = (left_n as f64 * gini(left_pos, left_n)
                + right_n as f64 * gini(total_pos - left_pos, right_n))
                / n as f64;

            if best.map_or(true, |b| impurity < b.impurity) {
                let mid = lo + (hi - lo) / 2.0;
                // Guard against the midpoint rounding up onto `hi`.
                let threshold = if mid < hi { mid } else { lo };
                best = Some(SplitCandidate {
                    feature,
                    threshold,
                    impurity,
                });
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn config() -> TreeConfig {
        TreeConfig {
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: 2,
        }
    }

    fn all(n: usize) -> Vec<usize> {
        (0..n).collect()
    }

    #[test]
    fn test_separable_data_is_fit_exactly() {
        let x = vec![vec![1.0, 0.0], vec![2.0, 0.0], vec![8.0, 0.0], vec![9.0, 0.0]];
        let y = vec![0, 0, 1, 1];
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let tree = DecisionTree::fit(&x, &y, &all(4), &config(), &mut rng);

        assert_eq!(tree.predict_proba(&[1.5, 0.0]), 0.0);
        assert_eq!(tree.predict_proba(&[8.5, 0.0]), 1.0);
        assert_eq!(tree.depth(), 1);
        match &tree.nodes()[0] {
            Node::Split { feature, threshold, .. } => {
                assert_eq!(*feature, 0);
                assert!((threshold - 5.0).abs() < 1e-12);
            }
            other => panic!("Expected a split at the root, got {other:?}"),
        }
        assert!(tree.validate(2).is_ok());
    }

    #[test]
    fn test_pure_node_is_a_leaf() {
        let x = vec![vec![1.0], vec![2.0]];
        let y = vec![1, 1];
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let tree = DecisionTree::fit(&x, &y, &all(2), &config(), &mut rng);
        assert_eq!(tree.nodes().len(), 1);
        assert_eq!(tree.predict_proba(&[100.0]), 1.0);
    }

    #[test]
    fn test_max_depth_limits_growth() {
        let x: Vec<Vec<f64>> = (0..16).map(|i| vec![f64::from(i)]).collect();
        let y: Vec<u8> = (0..16).map(|i| (i % 2) as u8).collect();
        let mut cfg = config();
        cfg.max_depth = Some(2);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let tree = DecisionTree::fit(&x, &y, &all(16), &cfg, &mut rng);
        assert!(tree.depth() <= 2);
        for row in &x {
            let p = tree.predict_proba(row);
            assert!((0.0..=1.0).contains(&p));
        }
    }

    #[test]
    fn test_constant_features_give_a_leaf() {
        let x = vec![vec![3.0], vec![3.0], vec![3.0]];
        let y = vec![0, 1, 1];
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let tree = DecisionTree::fit(&x, &y, &all(3), &config(), &mut rng);
        assert_eq!(tree.nodes().len(), 1);
        assert!((tree.predict_proba(&[3.0]) - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_alternating_labels_grow_a_deep_tree_without_recursion() {
        // Every split can only peel a single row off, so depth tracks the row count.
        let n = 6000;
        let x: Vec<Vec<f64>> = (0..n).map(|i| vec![f64::from(i)]).collect();
        let y: Vec<u8> = (0..n).map(|i| (i % 2) as u8).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let tree = DecisionTree::fit(&x, &y, &all(n as usize), &config(), &mut rng);

        assert!(tree.validate(1).is_ok());
        assert!(tree.depth() >= 12);
        for (row, &label) in x.iter().zip(&y) {
            assert_eq!(tree.predict_proba(row), f64::from(label));
        }
    }

    #[test]
    fn test_duplicate_rows_from_bootstrap_stay_together() {
        let x = vec![vec![1.0], vec![2.0], vec![3.0], vec![4.0]];
        let y = vec![0, 0, 1, 1];
        let indices = vec![0, 0, 1, 3, 3, 3, 2];
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let tree = DecisionTree::fit(&x, &y, &indices, &config(), &mut rng);
        assert_eq!(tree.depth(), 1);
        match &tree.nodes()[1] {
            Node::Leaf { samples, .. } => assert_eq!(*samples, 3),
            other => panic!("Expected a left leaf, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_rejects_dangling_children() {
        let tree = DecisionTree {
            nodes: vec![Node::Split {
                feature: 0,
                threshold: 1.0,
                left: 5,
                right: 6,
            }],
        };
        assert!(tree.validate(1).is_err());
    }
}
