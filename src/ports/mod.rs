//! Ports layer: Trait definitions for external operations.
//!
//! Following Hexagonal Architecture, these traits define the boundaries
//! between the application and external systems (model, artifact storage).

mod artifacts;
mod classifier;

pub use artifacts::{
    ArtifactBundle, ArtifactManifest, ArtifactStore, ARTIFACT_FORMAT_VERSION, MODEL_FILE,
    TRANSFORMER_FILE,
};
pub use classifier::Classifier;
