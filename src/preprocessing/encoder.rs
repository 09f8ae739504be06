//! Categorical label encoders.
//!
//! Each encoder maps a fixed, sorted vocabulary of category strings to integer
//! codes (the index in the vocabulary). The vocabulary is the union of the
//! categories observed in training data and, optionally, the operator's
//! expected categories, so every choice a form offers stays encodable.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::TransformError;
use crate::domain::{CategoricalColumn, UnknownPolicy};

/// Fitted encoder for one categorical column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoricalEncoder {
    column: String,
    classes: Vec<String>,
    #[serde(default)]
    unknown: UnknownPolicy,
}

impl CategoricalEncoder {
    /// Fit the vocabulary from observed values, optionally merged with the expected ones.
    ///
    /// A fallback bucket is always part of the vocabulary.
    pub fn fit<'a>(
        spec: &CategoricalColumn,
        observed: impl IntoIterator<Item = &'a str>,
        merge_expected: bool,
    ) -> Self {
        let mut vocabulary: BTreeSet<String> =
            observed.into_iter().map(|v| v.trim().to_string()).collect();

        if merge_expected {
            vocabulary.extend(spec.expected.iter().map(|v| v.trim().to_string()));
        }
        if let UnknownPolicy::Fallback { bucket } = &spec.unknown {
            vocabulary.insert(bucket.trim().to_string());
        }

        Self {
            column: spec.name.clone(),
            classes: vocabulary.into_iter().collect(),
            unknown: spec.unknown.clone(),
        }
    }

    #[must_use]
    pub fn column(&self) -> &str {
        &self.column
    }

    /// Sorted vocabulary; a category's code is its index here.
    #[must_use]
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    #[must_use]
    pub fn unknown_policy(&self) -> &UnknownPolicy {
        &self.unknown
    }

    /// Encode one category.
    ///
    /// # Errors
    /// Returns `UnseenCategory` for a value outside the vocabulary under a strict policy.
    pub fn encode(&self, value: &str) -> Result<f64, TransformError> {
        let value = value.trim();
        if let Ok(idx) = self.classes.binary_search_by(|c| c.as_str().cmp(value)) {
            return Ok(idx as f64);
        }

        match &self.unknown {
            UnknownPolicy::Strict => Err(TransformError::UnseenCategory {
                field: self.column.clone(),
                value: value.to_string(),
                allowed: self.classes.clone(),
            }),
            UnknownPolicy::Fallback { bucket } => {
                tracing::debug!(
                    "Unseen category {:?} for {:?}, using fallback bucket {:?}",
                    value,
                    self.column,
                    bucket
                );
                self.classes
                    .binary_search_by(|c| c.as_str().cmp(bucket.trim()))
                    .map(|idx| idx as f64)
                    .map_err(|_| TransformError::InvalidValue {
                        field: self.column.clone(),
                        reason: format!("fallback bucket {bucket:?} missing from vocabulary"),
                    })
            }
        }
    }
}

/// One encoder per categorical column, fitted together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoricalEncoderSet {
    encoders: Vec<CategoricalEncoder>,
}

impl CategoricalEncoderSet {
    #[must_use]
    pub fn new(encoders: Vec<CategoricalEncoder>) -> Self {
        Self { encoders }
    }

    #[must_use]
    pub fn columns(&self) -> Vec<String> {
        self.encoders.iter().map(|e| e.column.clone()).collect()
    }

    #[must_use]
    pub fn get(&self, column: &str) -> Option<&CategoricalEncoder> {
        self.encoders.iter().find(|e| e.column == column)
    }

    #[must_use]
    pub fn encoders(&self) -> &[CategoricalEncoder] {
        &self.encoders
    }
}
