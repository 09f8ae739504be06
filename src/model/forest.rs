//! Bagged random forest of CART trees.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use super::tree::{DecisionTree, TreeConfig};
use super::ModelError;

/// Forest hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestConfig {
    pub n_trees: usize,
    /// `None` grows each tree until its leaves are pure.
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub bootstrap: bool,
    pub seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            bootstrap: true,
            seed: 42,
        }
    }
}

/// A fitted random forest. Predictions average per-tree class-1 probabilities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    n_features: usize,
    trees: Vec<DecisionTree>,
}

impl RandomForest {
    /// Fit `config.n_trees` trees; tree `i` draws from a generator seeded with `seed + i`.
    ///
    /// # Errors
    /// Returns `ModelError` for empty, ragged or non-finite input, or an invalid configuration.
    pub fn fit(x: &[Vec<f64>], y: &[u8], config: &ForestConfig) -> Result<Self, ModelError> {
        if x.is_empty() {
            return Err(ModelError::EmptyTrainingSet);
        }
        if x.len() != y.len() {
            return Err(ModelError::InvalidInput(format!(
                "{} rows but {} labels",
                x.len(),
                y.len()
            )));
        }
        if config.n_trees == 0 {
            return Err(ModelError::InvalidConfig("n_trees must be positive".to_string()));
        }
        if let Some(bad) = y.iter().find(|&&label| label > 1) {
            return Err(ModelError::InvalidInput(format!("label {bad} is not binary")));
        }

        let n_features = x[0].len();
        if n_features == 0 {
            return Err(ModelError::InvalidInput("rows have no features".to_string()));
        }
        for (i, row) in x.iter().enumerate() {
            if row.len() != n_features {
                return Err(ModelError::FeatureCountMismatch {
                    expected: n_features,
                    got: row.len(),
                });
            }
            if row.iter().any(|v| !v.is_finite()) {
                return Err(ModelError::InvalidInput(format!("row {i} has a non-finite value")));
            }
        }

        let tree_config = TreeConfig {
            max_depth: config.max_depth,
            min_samples_split: config.min_samples_split.max(2),
            min_samples_leaf: config.min_samples_leaf.max(1),
            max_features: ((n_features as f64).sqrt().floor() as usize).max(1),
        };

        let n = x.len();
        let trees = (0..config.n_trees)
            .map(|t| {
                let mut rng = ChaCha8Rng::seed_from_u64(config.seed.wrapping_add(t as u64));
                let indices: Vec<usize> = if config.bootstrap {
                    (0..n).map(|_| rng.gen_range(0..n)).collect()
                } else {
                    (0..n).collect()
                };
                DecisionTree::fit(x, y, &indices, &tree_config, &mut rng)
            })
            .collect();

        tracing::debug!(
            "Fitted forest of {} trees on {} rows x {} features",
            config.n_trees,
            n,
            n_features
        );

        Ok(Self { n_features, trees })
    }

    #[must_use]
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    #[must_use]
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Mean class-1 probability over all trees.
    ///
    /// # Errors
    /// Returns `FeatureCountMismatch` if the row has the wrong width.
    pub fn predict_proba(&self, row: &[f64]) -> Result<f64, ModelError> {
        if row.len() != self.n_features {
            return Err(ModelError::FeatureCountMismatch {
                expected: self.n_features,
                got: row.len(),
            });
        }
        let sum: f64 = self.trees.iter().map(|t| t.predict_proba(row)).sum();
        Ok(sum / self.trees.len() as f64)
    }

    /// Structural check for forests loaded from disk.
    ///
    /// # Errors
    /// Returns `Corrupt` naming the first malformed tree.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.trees.is_empty() {
            return Err(ModelError::Corrupt("forest has no trees".to_string()));
        }
        for (i, tree) in self.trees.iter().enumerate() {
            tree.validate(self.n_features)
                .map_err(|e| ModelError::Corrupt(format!("tree {i}: {e}")))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blobs() -> (Vec<Vec<f64>>, Vec<u8>) {
        let mut x = Vec::new();
        let mut y = Vec::new();
        for i in 0..30 {
            let f = f64::from(i) / 10.0;
            x.push(vec![f, 1.0 - f, 0.5]);
            y.push(0);
            x.push(vec![5.0 + f, 4.0 + f, 0.5]);
            y.push(1);
        }
        (x, y)
    }

    fn small() -> ForestConfig {
        ForestConfig {
            n_trees: 15,
            ..ForestConfig::default()
        }
    }

    #[test]
    fn test_learns_separable_blobs() {
        let (x, y) = blobs();
        let forest = RandomForest::fit(&x, &y, &small()).expect("Should fit");
        assert_eq!(forest.n_trees(), 15);
        assert!(forest.predict_proba(&[0.1, 0.9, 0.5]).expect("Should predict") < 0.5);
        assert!(forest.predict_proba(&[6.0, 5.0, 0.5]).expect("Should predict") > 0.5);
        assert!(forest.validate().is_ok());
    }

    #[test]
    fn test_same_seed_same_forest() {
        let (x, y) = blobs();
        let a = RandomForest::fit(&x, &y, &small()).expect("Should fit");
        let b = RandomForest::fit(&x, &y, &small()).expect("Should fit");
        assert_eq!(a, b);
    }

    #[test]
    fn test_probabilities_are_bounded() {
        let (x, y) = blobs();
        let forest = RandomForest::fit(&x, &y, &small()).expect("Should fit");
        for row in &x {
            let p = forest.predict_proba(row).expect("Should predict");
            assert!((0.0..=1.0).contains(&p));
        }
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(matches!(
            RandomForest::fit(&[], &[], &small()),
            Err(ModelError::EmptyTrainingSet)
        ));
        assert!(RandomForest::fit(&[vec![1.0], vec![1.0, 2.0]], &[0, 1], &small()).is_err());
        assert!(RandomForest::fit(&[vec![f64::NAN]], &[0], &small()).is_err());
        assert!(RandomForest::fit(&[vec![1.0]], &[2], &small()).is_err());

        let (x, y) = blobs();
        let forest = RandomForest::fit(&x, &y, &small()).expect("Should fit");
        assert!(matches!(
            forest.predict_proba(&[1.0]),
            Err(ModelError::FeatureCountMismatch { expected: 3, got: 1 })
        ));
    }

    #[test]
    fn test_json_round_trip_is_exact() {
        let (x, y) = blobs();
        let forest = RandomForest::fit(&x, &y, &small()).expect("Should fit");
        let json = serde_json::to_string(&forest).expect("Should serialize");
        let back: RandomForest = serde_json::from_str(&json).expect("Should parse");
        for row in &x {
            assert_eq!(
                forest.predict_proba(row).expect("Should predict").to_bits(),
                back.predict_proba(row).expect("Should predict").to_bits()
            );
        }
    }

    #[test]
    fn test_unbounded_depth_on_peel_off_data() {
        let x: Vec<Vec<f64>> = (0..6000).map(|i| vec![f64::from(i)]).collect();
        let y: Vec<u8> = (0..6000).map(|i| (i % 2) as u8).collect();
        let config = ForestConfig {
            n_trees: 1,
            bootstrap: false,
            ..ForestConfig::default()
        };
        let forest = RandomForest::fit(&x, &y, &config).expect("Should fit");
        assert!(forest.validate().is_ok());
        assert_eq!(forest.predict_proba(&[17.0]).expect("Should predict"), 1.0);
        assert_eq!(forest.predict_proba(&[4242.0]).expect("Should predict"), 0.0);
    }
}
