//! Preprocessing: fitted transformers, imputation and resampling.
//!
//! Training and inference share [`encode_record`], so a record is turned into
//! a model row by exactly one code path whichever side produced it.

mod encoder;
mod impute;
mod scaler;
mod smote;
mod split;

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{DuplicateField, FeatureRecord, FeatureValue, RecordFields};

pub use encoder::{CategoricalEncoder, CategoricalEncoderSet};
pub use impute::{median, MedianImputer};
pub use scaler::StandardScaler;
pub use smote::{class_counts, Smote, SmoteConfig};
pub use split::{train_test_split, SplitIndices};

/// Per-request transformation errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransformError {
    #[error("Schema mismatch: missing fields {missing:?}, unexpected fields {extra:?}")]
    SchemaMismatch {
        missing: Vec<String>,
        extra: Vec<String>,
    },

    #[error("Unseen category {value:?} for field {field:?} (allowed: {allowed:?})")]
    UnseenCategory {
        field: String,
        value: String,
        allowed: Vec<String>,
    },

    #[error("Invalid value for field {field:?}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Transformer was not fitted on column {column:?}")]
    NotFitted { column: String },
}

impl From<DuplicateField> for TransformError {
    fn from(e: DuplicateField) -> Self {
        Self::SchemaMismatch {
            missing: Vec::new(),
            extra: vec![e.name],
        }
    }
}

/// Errors from splitting and oversampling.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SamplingError {
    #[error("Splitting {rows} rows with test fraction {test_fraction} leaves an empty split")]
    EmptySplit { rows: usize, test_fraction: f64 },

    #[error("Target has a single class ({zeros} negatives, {ones} positives)")]
    DegenerateTarget { zeros: usize, ones: usize },

    #[error("Minority class has {count} samples; SMOTE needs at least 2")]
    TooFewMinority { count: usize },

    #[error("Got {rows} feature rows but {labels} labels")]
    LengthMismatch { rows: usize, labels: usize },
}

/// A fitted transformer, persisted as one artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Transformer {
    Scaler(StandardScaler),
    Encoders(CategoricalEncoderSet),
}

impl Transformer {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Scaler(_) => "scaler",
            Self::Encoders(_) => "encoders",
        }
    }

    /// Columns the transformer was fitted on.
    #[must_use]
    pub fn columns(&self) -> Vec<String> {
        match self {
            Self::Scaler(s) => s.columns().to_vec(),
            Self::Encoders(e) => e.columns(),
        }
    }

    #[must_use]
    pub fn handles(&self, column: &str) -> bool {
        match self {
            Self::Scaler(s) => s.handles(column),
            Self::Encoders(e) => e.get(column).is_some(),
        }
    }

    /// Check that the fitted columns are exactly `expected`, by name.
    ///
    /// # Errors
    /// `NotFitted` for an expected column the transformer lacks, `InvalidValue`
    /// for a fitted column nobody asked for.
    pub fn check_columns(&self, expected: &[String]) -> Result<(), TransformError> {
        let fitted: BTreeSet<String> = self.columns().into_iter().collect();
        let wanted: BTreeSet<&String> = expected.iter().collect();

        if let Some(column) = expected.iter().find(|c| !fitted.contains(*c)) {
            return Err(TransformError::NotFitted {
                column: column.clone(),
            });
        }
        if let Some(column) = fitted.iter().find(|c| !wanted.contains(c)) {
            return Err(TransformError::InvalidValue {
                field: column.clone(),
                reason: "transformer was fitted on a column the pipeline does not transform"
                    .to_string(),
            });
        }
        Ok(())
    }

    /// Transform one value of a fitted column.
    ///
    /// # Errors
    /// `InvalidValue` on a kind mismatch, plus whatever the underlying transformer rejects.
    pub fn transform_value(&self, column: &str, value: &FeatureValue) -> Result<f64, TransformError> {
        match self {
            Self::Scaler(scaler) => {
                let v = value.as_f64().ok_or_else(|| TransformError::InvalidValue {
                    field: column.to_string(),
                    reason: format!("expected a number, got a {}", value.kind()),
                })?;
                scaler.transform(column, v)
            }
            Self::Encoders(set) => {
                let encoder = set.get(column).ok_or_else(|| TransformError::NotFitted {
                    column: column.to_string(),
                })?;
                let category = value.as_category().ok_or_else(|| TransformError::InvalidValue {
                    field: column.to_string(),
                    reason: format!("expected a category, got a {}", value.kind()),
                })?;
                encoder.encode(category)
            }
        }
    }
}

/// Parse one JSON request object.
///
/// # Errors
/// `Serialization` for malformed JSON, and `SchemaMismatch` naming the field
/// when two keys collide after name normalization.
pub fn parse_record(json: &str) -> crate::Result<FeatureRecord> {
    let fields: RecordFields = serde_json::from_str(json)?;
    Ok(FeatureRecord::try_from(fields).map_err(TransformError::from)?)
}

/// Check that a record carries exactly the given features.
///
/// # Errors
/// Returns `SchemaMismatch` listing missing and unexpected fields.
pub fn check_schema(features: &[String], record: &FeatureRecord) -> Result<(), TransformError> {
    let missing: Vec<String> = features
        .iter()
        .filter(|f| !record.contains(f))
        .cloned()
        .collect();
    let extra: Vec<String> = record
        .names()
        .filter(|n| !features.iter().any(|f| f == n))
        .map(str::to_string)
        .collect();

    if missing.is_empty() && extra.is_empty() {
        Ok(())
    } else {
        Err(TransformError::SchemaMismatch { missing, extra })
    }
}

/// Turn a record into a model row in `features` order.
///
/// Transformed columns go through `transformer`; every other column must be a
/// finite number and passes through unchanged.
///
/// # Errors
/// `SchemaMismatch` first, then the first per-field error in feature order.
pub fn encode_record(
    features: &[String],
    transformer: &Transformer,
    record: &FeatureRecord,
) -> Result<Vec<f64>, TransformError> {
    check_schema(features, record)?;

    let mut row = Vec::with_capacity(features.len());
    for name in features {
        let value = record
            .get(name)
            .ok_or_else(|| TransformError::SchemaMismatch {
                missing: vec![name.clone()],
                extra: Vec::new(),
            })?;

        let encoded = if transformer.handles(name) {
            transformer.transform_value(name, value)?
        } else {
            let v = value.as_f64().ok_or_else(|| TransformError::InvalidValue {
                field: name.clone(),
                reason: format!("expected a number, got {value}"),
            })?;
            if !v.is_finite() {
                return Err(TransformError::InvalidValue {
                    field: name.clone(),
                    reason: format!("{v} is not a finite number"),
                });
            }
            v
        };
        row.push(encoded);
    }
    Ok(row)
}
