//! Inference service: Turns a feature record into a risk verdict.
//!
//! This service coordinates:
//! - Schema and value validation of the incoming record
//! - The fitted transformer persisted by training
//! - The classifier
//! - The pipeline's decision policy
//!
//! A service is immutable once built and is shared across threads by `Arc`.

use std::sync::Arc;

use crate::adapters::ArtifactError;
use crate::domain::{FeatureRecord, PipelineConfig, RiskVerdict, CLASS_DECISION_BOUNDARY};
use crate::model::TrainedModel;
use crate::ports::{ArtifactBundle, Classifier};
use crate::preprocessing::{encode_record, Transformer};
use crate::{Result, StrokewatchError};

/// Service for answering prediction requests of one pipeline.
pub struct InferenceService<C>
where
    C: Classifier,
{
    config: PipelineConfig,
    transformer: Transformer,
    classifier: Arc<C>,
    run_id: Option<String>,
}

impl<C> std::fmt::Debug for InferenceService<C>
where
    C: Classifier,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceService")
            .field("pipeline", &self.config.id)
            .field("transformer", &self.transformer.kind())
            .field("run_id", &self.run_id)
            .finish_non_exhaustive()
    }
}

impl<C> InferenceService<C>
where
    C: Classifier,
{
    /// Create a new inference service.
    ///
    /// # Errors
    /// Returns `Artifact(Incompatible)` if the classifier's feature order or the
    /// transformer's fitted columns disagree with the pipeline configuration.
    pub fn new(config: PipelineConfig, transformer: Transformer, classifier: Arc<C>) -> Result<Self> {
        if classifier.feature_names() != config.features.as_slice() {
            return Err(ArtifactError::Incompatible(format!(
                "model expects features {:?}, pipeline {} declares {:?}",
                classifier.feature_names(),
                config.id,
                config.features
            ))
            .into());
        }

        let expected = config.transformer.column_names();
        transformer
            .check_columns(&expected)
            .map_err(|e| ArtifactError::Incompatible(format!("transformer: {e}")))?;
        if transformer.kind() != config.transformer.kind() {
            return Err(ArtifactError::Incompatible(format!(
                "pipeline {} expects a {} transformer, artifact is {}",
                config.id,
                config.transformer.kind(),
                transformer.kind()
            ))
            .into());
        }

        Ok(Self {
            config,
            transformer,
            classifier,
            run_id: None,
        })
    }

    /// Tag the service with the run its artifacts came from.
    #[must_use]
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    #[must_use]
    pub fn pipeline(&self) -> &str {
        &self.config.id
    }

    #[must_use]
    pub fn run_id(&self) -> Option<&str> {
        self.run_id.as_deref()
    }

    #[must_use]
    pub fn transformer(&self) -> &Transformer {
        &self.transformer
    }

    /// Model-ready row for a record, in the model's column order.
    ///
    /// # Errors
    /// Returns `Transform` for schema or value problems.
    pub fn encode(&self, record: &FeatureRecord) -> Result<Vec<f64>> {
        Ok(encode_record(&self.config.features, &self.transformer, record)?)
    }

    /// Predict a verdict for one record.
    ///
    /// # Errors
    /// Returns `Transform` for an invalid record and `Model` if the classifier fails.
    /// An error never degrades into a default prediction.
    pub fn predict(&self, record: &FeatureRecord) -> Result<RiskVerdict> {
        let row = self.encode(record)?;
        let probability = self.classifier.predict_proba(&row)?;
        let prediction = u8::from(probability > CLASS_DECISION_BOUNDARY);

        tracing::debug!(
            "Raw prediction for {}: class={} probability={:.4}",
            self.config.id,
            prediction,
            probability
        );

        Ok(RiskVerdict::new(
            self.config.id.clone(),
            self.config.decision,
            probability,
            prediction,
        ))
    }
}

impl InferenceService<TrainedModel> {
    /// Build a service from a verified artifact bundle.
    ///
    /// # Errors
    /// Returns `Artifact(Incompatible)` if the bundle does not fit the configuration.
    pub fn from_bundle(config: PipelineConfig, bundle: ArtifactBundle) -> Result<Self> {
        if bundle.manifest.pipeline != config.id {
            return Err(StrokewatchError::Artifact(ArtifactError::Incompatible(format!(
                "artifacts belong to pipeline {:?}, not {:?}",
                bundle.manifest.pipeline, config.id
            ))));
        }
        let run_id = bundle.manifest.run_id;
        Ok(Self::new(config, bundle.transformer, Arc::new(bundle.model))?.with_run_id(run_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ClinicalForm, RiskLevel, TransformerSpec};
    use crate::model::ModelError;
    use crate::preprocessing::{StandardScaler, TransformError};

    /// Classifier returning a fixed probability.
    struct FixedClassifier {
        features: Vec<String>,
        probability: f64,
    }

    impl Classifier for FixedClassifier {
        fn feature_names(&self) -> &[String] {
            &self.features
        }

        fn predict_proba(&self, row: &[f64]) -> std::result::Result<f64, ModelError> {
            if row.len() != self.features.len() {
                return Err(ModelError::FeatureCountMismatch {
                    expected: self.features.len(),
                    got: row.len(),
                });
            }
            Ok(self.probability)
        }
    }

    fn clinical_scaler(config: &PipelineConfig) -> Transformer {
        let columns = config.transformer.column_names();
        let values: Vec<Vec<f64>> = columns.iter().map(|_| vec![90.0, 110.0, 130.0]).collect();
        Transformer::Scaler(StandardScaler::fit(&columns, &values).expect("Should fit"))
    }

    fn clinical_service(probability: f64) -> InferenceService<FixedClassifier> {
        let config = PipelineConfig::clinical();
        let classifier = Arc::new(FixedClassifier {
            features: config.features.clone(),
            probability,
        });
        let transformer = clinical_scaler(&config);
        InferenceService::new(config, transformer, classifier).expect("Should build")
    }

    #[test]
    fn test_clinical_defaults_give_valid_verdict() {
        let verdict = clinical_service(0.12)
            .predict(&ClinicalForm::default().to_record())
            .expect("Should predict");
        assert_eq!(verdict.pipeline, "clinical");
        assert_eq!(verdict.risk_level, RiskLevel::Low);
        assert_eq!(verdict.prediction, 0);
        assert!((verdict.confidence - 0.88).abs() < 1e-12);
    }

    #[test]
    fn test_threshold_boundary() {
        let record = ClinicalForm::default().to_record();
        assert_eq!(
            clinical_service(0.29).predict(&record).expect("Should predict").risk_level,
            RiskLevel::Low
        );
        let high = clinical_service(0.30).predict(&record).expect("Should predict");
        assert_eq!(high.risk_level, RiskLevel::High);
        assert_eq!(high.prediction, 0);
    }

    #[test]
    fn test_missing_field_never_predicts() {
        let mut record = ClinicalForm::default().to_record();
        record.remove("glucose");
        let err = clinical_service(0.5).predict(&record).expect_err("Should reject");
        assert!(err.is_request_error());
        assert!(matches!(
            err,
            StrokewatchError::Transform(TransformError::SchemaMismatch { ref missing, .. }) if missing == &["glucose".to_string()]
        ));
    }

    #[test]
    fn test_feature_order_mismatch_is_incompatible() {
        let config = PipelineConfig::clinical();
        let mut features = config.features.clone();
        features.reverse();
        let classifier = Arc::new(FixedClassifier {
            features,
            probability: 0.5,
        });
        let transformer = clinical_scaler(&config);
        let err = InferenceService::new(config, transformer, classifier).expect_err("Should reject");
        assert!(err.is_missing_artifact());
    }

    #[test]
    fn test_transformer_columns_must_match_config() {
        let mut config = PipelineConfig::clinical();
        config.transformer = TransformerSpec::Scaler {
            columns: vec!["bmi".to_string()],
        };
        let classifier = Arc::new(FixedClassifier {
            features: config.features.clone(),
            probability: 0.5,
        });
        let transformer = clinical_scaler(&PipelineConfig::clinical());
        assert!(InferenceService::new(config, transformer, classifier).is_err());
    }
}
