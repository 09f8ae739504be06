//! Classifier port: the model seam the inference service is generic over.

use crate::domain::CLASS_DECISION_BOUNDARY;
use crate::model::ModelError;

/// A binary classifier over ordered numeric rows.
///
/// Implementations are read-only after construction and shared across
/// worker threads.
pub trait Classifier: Send + Sync {
    /// Feature names, in the order `predict_proba` expects row values.
    fn feature_names(&self) -> &[String];

    /// Probability of class 1.
    ///
    /// # Errors
    /// Returns `ModelError::FeatureCountMismatch` for a row of the wrong width.
    fn predict_proba(&self, row: &[f64]) -> Result<f64, ModelError>;

    /// Discrete class: 1 when the class-1 probability exceeds one half.
    ///
    /// # Errors
    /// Same as [`Classifier::predict_proba`].
    fn predict_class(&self, row: &[f64]) -> Result<u8, ModelError> {
        Ok(u8::from(self.predict_proba(row)? > CLASS_DECISION_BOUNDARY))
    }
}
