//! # Strokewatch
#![allow(non_snake_case)]
//!
//! Stroke-risk prediction pipeline: offline training and validated inference
//! sharing one fitted feature transformer.
//!
//! This crate provides:
//! - Training of a random-forest classifier behind a fitted scaler or
//!   categorical encoder set, with SMOTE class balancing
//! - Atomically published, hash-bound artifacts per pipeline
//! - A serving context that loads artifacts once and answers requests
//!   concurrently
//!
//! ## Architecture
//!
//! The crate follows Hexagonal Architecture:
//! - `domain`: Core types (FeatureRecord, PipelineConfig, RiskVerdict, forms)
//! - `preprocessing`: Fitted transformers and training-time sampling
//! - `model`: The random forest classifier
//! - `ports`: Trait definitions for the classifier and artifact storage
//! - `adapters`: Concrete implementations (filesystem store, CSV reader, log sanitizer)
//! - `application`: Training and inference use cases

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod model;
pub mod ports;
pub mod preprocessing;

pub use domain::{FeatureRecord, FeatureValue, PipelineConfig, RiskLevel, RiskVerdict};

/// Result type for Strokewatch operations
pub type Result<T> = std::result::Result<T, StrokewatchError>;

/// Main error type for Strokewatch
#[derive(Debug, thiserror::Error)]
pub enum StrokewatchError {
    #[error("Artifact error: {0}")]
    Artifact(#[from] adapters::ArtifactError),

    #[error("{0}")]
    Transform(#[from] preprocessing::TransformError),

    #[error("Model error: {0}")]
    Model(#[from] model::ModelError),

    #[error("Training data error: {0}")]
    TrainingData(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl StrokewatchError {
    /// Whether this error concerns a single request and must not affect others.
    #[must_use]
    pub fn is_request_error(&self) -> bool {
        matches!(self, Self::Transform(_))
    }

    /// Whether this error means a persisted artifact is absent or unusable.
    #[must_use]
    pub fn is_missing_artifact(&self) -> bool {
        matches!(self, Self::Artifact(_))
    }
}
