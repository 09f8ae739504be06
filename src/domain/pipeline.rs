//! Pipeline configuration: one value describing a feature schema end to end.
//!
//! A `PipelineConfig` names the dataset target, the ordered feature list the
//! model consumes, which transformer is fitted on which columns, the decision
//! policy and the training parameters. Both historical schemas are built in;
//! further schemas can be loaded from JSON.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::record::normalize_name;
use super::verdict::DecisionPolicy;
use crate::model::ForestConfig;
use crate::preprocessing::SmoteConfig;

/// Identifier of the built-in clinical (framingham) pipeline.
pub const CLINICAL_PIPELINE: &str = "clinical";

/// Identifier of the built-in categorical (healthcare-dataset-stroke) pipeline.
pub const CATEGORICAL_PIPELINE: &str = "categorical";

/// Category substituted for missing categorical cells during training.
pub const MISSING_CATEGORY: &str = "Unknown";

/// What an encoder does with a category outside its fitted vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UnknownPolicy {
    /// Reject the request with `UnseenCategory`.
    #[default]
    Strict,
    /// Encode as this bucket, which must be part of the vocabulary.
    Fallback { bucket: String },
}

/// A categorical column and the categories the operator expects to see.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoricalColumn {
    pub name: String,
    #[serde(default)]
    pub expected: Vec<String>,
    #[serde(default)]
    pub unknown: UnknownPolicy,
}

impl CategoricalColumn {
    #[must_use]
    pub fn strict(name: &str, expected: &[&str]) -> Self {
        Self {
            name: normalize_name(name),
            expected: expected.iter().map(|s| (*s).to_string()).collect(),
            unknown: UnknownPolicy::Strict,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Which transformer a pipeline fits, and on which columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransformerSpec {
    /// Standard scaling of numeric columns.
    Scaler { columns: Vec<String> },
    /// One label encoder per categorical column.
    Encoders {
        columns: Vec<CategoricalColumn>,
        /// Seed each vocabulary with the expected categories as well as the observed ones.
        #[serde(default = "default_true")]
        merge_expected_categories: bool,
    },
}

impl TransformerSpec {
    /// Names of the columns the transformer is fitted on.
    #[must_use]
    pub fn column_names(&self) -> Vec<String> {
        match self {
            Self::Scaler { columns } => columns.clone(),
            Self::Encoders { columns, .. } => columns.iter().map(|c| c.name.clone()).collect(),
        }
    }

    /// Short kind name for logs and manifests.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Scaler { .. } => "scaler",
            Self::Encoders { .. } => "encoders",
        }
    }
}

/// Held-out split parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplitConfig {
    pub test_fraction: f64,
    pub seed: u64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            test_fraction: 0.2,
            seed: 42,
        }
    }
}

/// Complete description of one pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Pipeline identity; also the artifact key.
    pub id: String,

    /// Binary target column in the training dataset.
    pub target: String,

    /// Dataset columns dropped before training (e.g. row ids).
    #[serde(default)]
    pub drop_columns: Vec<String>,

    /// Model input columns, in the order the model consumes them.
    pub features: Vec<String>,

    /// Transformer fitted during training and applied at inference.
    pub transformer: TransformerSpec,

    /// Mapping from model output to risk level.
    pub decision: DecisionPolicy,

    #[serde(default)]
    pub split: SplitConfig,

    #[serde(default)]
    pub forest: ForestConfig,

    #[serde(default)]
    pub smote: SmoteConfig,
}

impl PipelineConfig {
    /// The clinical (framingham) pipeline: six scaled numeric columns, 0.30 threshold.
    #[must_use]
    pub fn clinical() -> Self {
        let features = [
            "male",
            "age",
            "currentSmoker",
            "cigsPerDay",
            "BPMeds",
            "prevalentStroke",
            "prevalentHyp",
            "diabetes",
            "totChol",
            "sysBP",
            "diaBP",
            "BMI",
            "heartRate",
            "glucose",
        ];
        let scaled = ["totChol", "sysBP", "diaBP", "BMI", "heartRate", "glucose"];

        Self {
            id: CLINICAL_PIPELINE.to_string(),
            target: normalize_name("TenYearCHD"),
            drop_columns: Vec::new(),
            features: features.iter().map(|f| normalize_name(f)).collect(),
            transformer: TransformerSpec::Scaler {
                columns: scaled.iter().map(|f| normalize_name(f)).collect(),
            },
            decision: DecisionPolicy::clinical(),
            split: SplitConfig::default(),
            forest: ForestConfig::default(),
            smote: SmoteConfig::default(),
        }
    }

    /// The categorical (healthcare-dataset-stroke) pipeline: five label-encoded columns.
    #[must_use]
    pub fn categorical() -> Self {
        let features = [
            "gender",
            "age",
            "hypertension",
            "heart_disease",
            "ever_married",
            "work_type",
            "residence_type",
            "avg_glucose_level",
            "bmi",
            "smoking_status",
        ];

        Self {
            id: CATEGORICAL_PIPELINE.to_string(),
            target: "stroke".to_string(),
            drop_columns: vec!["id".to_string()],
            features: features.iter().map(|f| (*f).to_string()).collect(),
            transformer: TransformerSpec::Encoders {
                columns: vec![
                    CategoricalColumn::strict("gender", &["Male", "Female", "Other"]),
                    CategoricalColumn::strict("ever_married", &["No", "Yes"]),
                    CategoricalColumn::strict(
                        "work_type",
                        &["Private", "Self-employed", "Govt job", "Children", "Never worked"],
                    ),
                    CategoricalColumn::strict("residence_type", &["Urban", "Rural"]),
                    CategoricalColumn::strict(
                        "smoking_status",
                        &["Never smoked", "Formerly smoked", "Smokes", MISSING_CATEGORY],
                    ),
                ],
                merge_expected_categories: true,
            },
            decision: DecisionPolicy::PredictedClass,
            split: SplitConfig::default(),
            forest: ForestConfig::default(),
            smote: SmoteConfig::default(),
        }
    }

    /// Look up a built-in pipeline by id.
    #[must_use]
    pub fn builtin(id: &str) -> Option<Self> {
        match normalize_name(id).as_str() {
            CLINICAL_PIPELINE => Some(Self::clinical()),
            CATEGORICAL_PIPELINE => Some(Self::categorical()),
            _ => None,
        }
    }

    /// Load a pipeline from a JSON file. Names are normalized and the result validated.
    ///
    /// # Errors
    /// Returns an error message if the file cannot be read, parsed or validated.
    pub fn from_json_file(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read pipeline config {path:?}: {e}"))?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| format!("Invalid pipeline config {path:?}: {e}"))?;
        let config = config.normalized();
        config.validate()?;
        Ok(config)
    }

    /// Return a copy with every column name normalized.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.target = normalize_name(&self.target);
        self.drop_columns = self.drop_columns.iter().map(|c| normalize_name(c)).collect();
        self.features = self.features.iter().map(|c| normalize_name(c)).collect();
        match &mut self.transformer {
            TransformerSpec::Scaler { columns } => {
                for c in columns.iter_mut() {
                    *c = normalize_name(c);
                }
            }
            TransformerSpec::Encoders { columns, .. } => {
                for c in columns.iter_mut() {
                    c.name = normalize_name(&c.name);
                }
            }
        }
        self
    }

    /// Whether a feature is a categorical (encoded) column.
    #[must_use]
    pub fn is_categorical(&self, feature: &str) -> bool {
        match &self.transformer {
            TransformerSpec::Encoders { columns, .. } => columns.iter().any(|c| c.name == feature),
            TransformerSpec::Scaler { .. } => false,
        }
    }

    /// Validate internal consistency of the configuration.
    ///
    /// # Errors
    /// Returns all problems found, joined into one message.
    pub fn validate(&self) -> Result<(), String> {
        let mut errors = Vec::new();

        if self.id.trim().is_empty() {
            errors.push("Pipeline id must not be empty".to_string());
        }
        if self.id.contains(['/', '\\']) || self.id.starts_with('.') {
            errors.push(format!("Pipeline id {:?} is not a valid artifact key", self.id));
        }
        if self.features.is_empty() {
            errors.push("Pipeline must declare at least one feature".to_string());
        }

        let mut seen = BTreeSet::new();
        for f in &self.features {
            if !seen.insert(f.as_str()) {
                errors.push(format!("Duplicate feature {f:?}"));
            }
        }
        if seen.contains(self.target.as_str()) {
            errors.push(format!("Target {:?} is also listed as a feature", self.target));
        }
        for d in &self.drop_columns {
            if seen.contains(d.as_str()) {
                errors.push(format!("Dropped column {d:?} is also listed as a feature"));
            }
        }

        let mut transformed = BTreeSet::new();
        for c in self.transformer.column_names() {
            if !seen.contains(c.as_str()) {
                errors.push(format!("Transformer column {c:?} is not a feature"));
            }
            if !transformed.insert(c.clone()) {
                errors.push(format!("Transformer column {c:?} listed twice"));
            }
        }

        if let TransformerSpec::Encoders { columns, .. } = &self.transformer {
            for c in columns {
                if let UnknownPolicy::Fallback { bucket } = &c.unknown {
                    if bucket.is_empty() {
                        errors.push(format!("Empty fallback bucket for {:?}", c.name));
                    }
                }
            }
        }

        if let Err(e) = self.decision.validate() {
            errors.push(e);
        }
        if !(self.split.test_fraction > 0.0 && self.split.test_fraction < 1.0) {
            errors.push(format!(
                "Test fraction {} must lie strictly between 0 and 1",
                self.split.test_fraction
            ));
        }
        if self.forest.n_trees == 0 {
            errors.push("Forest must have at least one tree".to_string());
        }
        if self.smote.k_neighbors == 0 {
            errors.push("SMOTE needs at least one neighbour".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.join("; "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_are_valid() {
        assert!(PipelineConfig::clinical().validate().is_ok());
        assert!(PipelineConfig::categorical().validate().is_ok());
    }

    #[test]
    fn test_clinical_schema() {
        let config = PipelineConfig::clinical();
        assert_eq!(config.features.len(), 14);
        assert_eq!(config.target, "tenyearchd");
        assert_eq!(
            config.transformer.column_names(),
            vec!["totchol", "sysbp", "diabp", "bmi", "heartrate", "glucose"]
        );
        assert_eq!(config.decision, DecisionPolicy::clinical());
    }

    #[test]
    fn test_categorical_schema() {
        let config = PipelineConfig::categorical();
        assert_eq!(config.features.len(), 10);
        assert_eq!(config.drop_columns, vec!["id"]);
        assert!(config.is_categorical("smoking_status"));
        assert!(!config.is_categorical("bmi"));
    }

    #[test]
    fn test_builtin_lookup_is_normalized() {
        assert!(PipelineConfig::builtin(" Clinical ").is_some());
        assert!(PipelineConfig::builtin("unknown").is_none());
    }

    #[test]
    fn test_validation_catches_inconsistencies() {
        let mut config = PipelineConfig::clinical();
        config.transformer = TransformerSpec::Scaler {
            columns: vec!["cholesterol".to_string()],
        };
        config.features.push("age".to_string());
        let err = config.validate().expect_err("Should be invalid");
        assert!(err.contains("cholesterol"));
        assert!(err.contains("Duplicate feature"));
    }

    #[test]
    fn test_json_round_trip_with_defaults() {
        let json = r#"{
            "id": "custom",
            "target": "Outcome",
            "features": ["Age", "Smoker"],
            "transformer": {"kind": "encoders", "columns": [{"name": "Smoker", "expected": ["yes", "no"]}]},
            "decision": {"kind": "predicted_class"}
        }"#;
        let config: PipelineConfig = serde_json::from_str(json).expect("Should parse");
        let config = config.normalized();
        assert_eq!(config.target, "outcome");
        assert_eq!(config.features, vec!["age", "smoker"]);
        assert_eq!(config.split, SplitConfig::default());
        assert!(matches!(
            config.transformer,
            TransformerSpec::Encoders { merge_expected_categories: true, .. }
        ));
        assert!(config.validate().is_ok());
    }
}
