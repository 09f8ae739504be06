//! Artifact store port: Trait for persisting fitted transformer/model pairs.
//!
//! This trait abstracts the artifact backend (local filesystem) from the
//! training and serving services.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{ModelMetrics, TrainedModel};
use crate::preprocessing::Transformer;

/// Artifact layout version written by this build.
pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

/// File name of the transformer artifact within a run.
pub const TRANSFORMER_FILE: &str = "transformer.json";

/// File name of the model artifact within a run.
pub const MODEL_FILE: &str = "model.json";

/// Binds the transformer and model of one training run together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactManifest {
    /// Pipeline identity the run belongs to
    pub pipeline: String,
    /// Unique, sortable run identifier
    pub run_id: String,
    pub created_at: DateTime<Utc>,
    pub format_version: u32,
    /// Transformer kind ("scaler" or "encoders")
    pub transformer_kind: String,
    /// Model column order
    pub feature_names: Vec<String>,
    /// File name -> lowercase hex sha256
    pub files: BTreeMap<String, String>,
    pub metrics: ModelMetrics,
}

/// A verified transformer/model pair and the manifest that binds them.
#[derive(Debug, Clone)]
pub struct ArtifactBundle {
    pub manifest: ArtifactManifest,
    pub transformer: Transformer,
    pub model: TrainedModel,
}

/// Trait for artifact persistence.
///
/// Publishing must be atomic per pipeline: readers see either the previous
/// pair or the new one, never a mix.
pub trait ArtifactStore: Send + Sync {
    /// Error type for artifact operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Persist a new run and make it the pipeline's current one.
    ///
    /// # Errors
    /// Returns error if any file cannot be written; the current run is then unchanged.
    fn publish(
        &self,
        pipeline: &str,
        transformer: &Transformer,
        model: &TrainedModel,
    ) -> Result<ArtifactManifest, Self::Error>;

    /// Load and verify the current run of a pipeline.
    ///
    /// # Errors
    /// Returns error if the run is absent, unreadable, tampered with or of an unsupported version.
    fn load(&self, pipeline: &str) -> Result<ArtifactBundle, Self::Error>;

    /// Manifest of the current run, if any.
    ///
    /// # Errors
    /// Returns error if the pointer exists but cannot be read.
    fn current_manifest(&self, pipeline: &str) -> Result<Option<ArtifactManifest>, Self::Error>;

    /// Identifiers of all runs recorded for a pipeline, oldest first.
    ///
    /// # Errors
    /// Returns error if the run directory cannot be listed.
    fn list_runs(&self, pipeline: &str) -> Result<Vec<String>, Self::Error>;
}
