//! Classifier model: a random forest bound to the feature order it was trained on.

mod forest;
mod tree;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ports::Classifier;

pub use forest::{ForestConfig, RandomForest};
pub use tree::{DecisionTree, Node, TreeConfig};

/// Model fitting and prediction errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("Cannot fit a model on an empty training set")]
    EmptyTrainingSet,

    #[error("Expected {expected} features, got {got}")]
    FeatureCountMismatch { expected: usize, got: usize },

    #[error("Invalid training input: {0}")]
    InvalidInput(String),

    #[error("Invalid model configuration: {0}")]
    InvalidConfig(String),

    #[error("Corrupt model: {0}")]
    Corrupt(String),
}

/// Held-out evaluation and class balance of one training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    /// Accuracy on the untouched held-out split.
    pub accuracy: f64,
    pub train_rows: usize,
    pub test_rows: usize,
    /// (negatives, positives) in the training split before oversampling.
    pub class_counts_before: (usize, usize),
    /// (negatives, positives) after oversampling.
    pub class_counts_after: (usize, usize),
    /// (negatives, positives) in the held-out split.
    #[serde(default)]
    pub test_class_counts: (usize, usize),
}

/// A fitted forest plus the ordered feature names its rows must follow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedModel {
    feature_names: Vec<String>,
    forest: RandomForest,
    metrics: ModelMetrics,
}

impl TrainedModel {
    /// # Errors
    /// Returns `FeatureCountMismatch` if the forest width differs from the feature list.
    pub fn new(
        feature_names: Vec<String>,
        forest: RandomForest,
        metrics: ModelMetrics,
    ) -> Result<Self, ModelError> {
        if forest.n_features() != feature_names.len() {
            return Err(ModelError::FeatureCountMismatch {
                expected: feature_names.len(),
                got: forest.n_features(),
            });
        }
        Ok(Self {
            feature_names,
            forest,
            metrics,
        })
    }

    #[must_use]
    pub fn metrics(&self) -> &ModelMetrics {
        &self.metrics
    }

    #[must_use]
    pub fn forest(&self) -> &RandomForest {
        &self.forest
    }

    /// Consistency check after deserialization.
    ///
    /// # Errors
    /// Returns `Corrupt` or `FeatureCountMismatch` describing the defect.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.forest.n_features() != self.feature_names.len() {
            return Err(ModelError::FeatureCountMismatch {
                expected: self.feature_names.len(),
                got: self.forest.n_features(),
            });
        }
        self.forest.validate()
    }
}

impl Classifier for TrainedModel {
    fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    fn predict_proba(&self, row: &[f64]) -> Result<f64, ModelError> {
        self.forest.predict_proba(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics() -> ModelMetrics {
        ModelMetrics {
            accuracy: 1.0,
            train_rows: 4,
            test_rows: 1,
            class_counts_before: (3, 1),
            class_counts_after: (3, 3),
            test_class_counts: (1, 0),
        }
    }

    fn forest() -> RandomForest {
        let x = vec![vec![0.0, 0.0], vec![0.1, 0.2], vec![5.0, 5.0], vec![5.1, 4.9]];
        let y = vec![0, 0, 1, 1];
        let config = ForestConfig {
            n_trees: 5,
            ..ForestConfig::default()
        };
        RandomForest::fit(&x, &y, &config).expect("Should fit")
    }

    #[test]
    fn test_feature_width_must_match() {
        assert!(matches!(
            TrainedModel::new(vec!["a".to_string()], forest(), metrics()),
            Err(ModelError::FeatureCountMismatch { expected: 1, got: 2 })
        ));
    }

    #[test]
    fn test_classifier_port() {
        let model = TrainedModel::new(vec!["a".to_string(), "b".to_string()], forest(), metrics())
            .expect("Should build");
        assert_eq!(model.feature_names(), ["a", "b"]);
        let p = model.predict_proba(&[5.0, 5.0]).expect("Should predict");
        assert_eq!(model.predict_class(&[5.0, 5.0]).expect("Should predict"), u8::from(p > 0.5));
        assert!(model.validate().is_ok());
    }
}
