//! Domain layer: Core types.
//!
//! Records, pipeline configuration, verdicts and form inputs. All types are
//! serializable and validate themselves.

mod dataset;
mod form;
mod pipeline;
mod record;
mod verdict;

pub use dataset::{is_missing, RawTable};
pub use form::{default_form_record, ClinicalForm, Sex, StrokeForm};
pub use pipeline::{
    CategoricalColumn, PipelineConfig, SplitConfig, TransformerSpec, UnknownPolicy,
    CATEGORICAL_PIPELINE, CLINICAL_PIPELINE, MISSING_CATEGORY,
};
pub use record::{normalize_name, DuplicateField, FeatureRecord, FeatureValue, RecordFields};
pub use verdict::{DecisionPolicy, RiskLevel, RiskVerdict, CLASS_DECISION_BOUNDARY, CLINICAL_HIGH_RISK_THRESHOLD};
