//! Filesystem adapter: Implementation of ArtifactStore on a local directory.
//!
//! # Layout
//!
//! ```text
//! <root>/<pipeline>/runs/<run_id>/transformer.json
//! <root>/<pipeline>/runs/<run_id>/model.json
//! <root>/<pipeline>/runs/<run_id>/manifest.json
//! <root>/<pipeline>/current.json
//! ```
//!
//! Every run is written into a fresh directory. `current.json` is a copy of
//! the active run's manifest and is replaced by writing a temporary file and
//! renaming it over the old pointer, so a reader either sees the previous run
//! or the new one. A run that fails half-way is removed and never pointed to.
//!
//! # Integrity
//!
//! The manifest binds both artifact files by sha256. Loading recomputes the
//! digests and refuses a pair whose bytes do not match.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use sha2::{Digest, Sha256};

use crate::model::TrainedModel;
use crate::ports::{
    ArtifactBundle, ArtifactManifest, ArtifactStore, Classifier, ARTIFACT_FORMAT_VERSION,
    MODEL_FILE, TRANSFORMER_FILE,
};
use crate::preprocessing::Transformer;

const RUNS_DIR: &str = "runs";
const MANIFEST_FILE: &str = "manifest.json";
const CURRENT_FILE: &str = "current.json";

/// Error type for artifact operations.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("Artifact not found: {path:?}")]
    Missing { path: PathBuf },

    #[error("Artifact {path:?} is unreadable: {reason}")]
    Unreadable { path: PathBuf, reason: String },

    #[error("Artifact {path:?} failed integrity check (expected sha256 {expected}, got {actual})")]
    HashMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("Incompatible artifacts: {0}")]
    Incompatible(String),

    #[error("Unsupported artifact format version {found} (supported: {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },

    #[error("Invalid pipeline key {0:?}")]
    InvalidKey(String),

    #[error("Artifact IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

fn validate_key(key: &str) -> Result<(), ArtifactError> {
    if key.is_empty() || key.starts_with('.') || key.contains(['/', '\\']) {
        return Err(ArtifactError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// Write and fsync a file.
fn write_synced(path: &Path, bytes: &[u8]) -> Result<(), ArtifactError> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    Ok(())
}

fn read_artifact(path: &Path) -> Result<Vec<u8>, ArtifactError> {
    fs::read(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ArtifactError::Missing {
            path: path.to_path_buf(),
        },
        _ => ArtifactError::Unreadable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        },
    })
}

fn parse_json<T: serde::de::DeserializeOwned>(path: &Path, bytes: &[u8]) -> Result<T, ArtifactError> {
    serde_json::from_slice(bytes).map_err(|e| ArtifactError::Unreadable {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

fn new_run_id() -> String {
    format!(
        "{}-{:08x}",
        Utc::now().format("%Y%m%dT%H%M%S%.3fZ"),
        rand::random::<u32>()
    )
}

/// Artifact store rooted at a local directory.
#[derive(Debug, Clone)]
pub struct FileArtifactStore {
    root: PathBuf,
}

impl FileArtifactStore {
    /// Create a store rooted at `root`. The directory is created on first publish.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn pipeline_dir(&self, pipeline: &str) -> PathBuf {
        self.root.join(pipeline)
    }

    /// Directory of one run.
    #[must_use]
    pub fn run_dir(&self, pipeline: &str, run_id: &str) -> PathBuf {
        self.pipeline_dir(pipeline).join(RUNS_DIR).join(run_id)
    }

    /// Path of the pipeline's current-run pointer.
    #[must_use]
    pub fn current_path(&self, pipeline: &str) -> PathBuf {
        self.pipeline_dir(pipeline).join(CURRENT_FILE)
    }

    fn write_run(
        &self,
        run_dir: &Path,
        pipeline: &str,
        run_id: &str,
        transformer: &Transformer,
        model: &TrainedModel,
    ) -> Result<ArtifactManifest, ArtifactError> {
        let transformer_bytes = serde_json::to_vec(transformer).map_err(|e| ArtifactError::Unreadable {
            path: run_dir.join(TRANSFORMER_FILE),
            reason: format!("serialization failed: {e}"),
        })?;
        let model_bytes = serde_json::to_vec(model).map_err(|e| ArtifactError::Unreadable {
            path: run_dir.join(MODEL_FILE),
            reason: format!("serialization failed: {e}"),
        })?;

        write_synced(&run_dir.join(TRANSFORMER_FILE), &transformer_bytes)?;
        write_synced(&run_dir.join(MODEL_FILE), &model_bytes)?;

        let manifest = ArtifactManifest {
            pipeline: pipeline.to_string(),
            run_id: run_id.to_string(),
            created_at: Utc::now(),
            format_version: ARTIFACT_FORMAT_VERSION,
            transformer_kind: transformer.kind().to_string(),
            feature_names: model.feature_names().to_vec(),
            files: [
                (TRANSFORMER_FILE.to_string(), sha256_hex(&transformer_bytes)),
                (MODEL_FILE.to_string(), sha256_hex(&model_bytes)),
            ]
            .into_iter()
            .collect(),
            metrics: model.metrics().clone(),
        };

        let manifest_bytes = serde_json::to_vec_pretty(&manifest).map_err(|e| ArtifactError::Unreadable {
            path: run_dir.join(MANIFEST_FILE),
            reason: format!("serialization failed: {e}"),
        })?;
        write_synced(&run_dir.join(MANIFEST_FILE), &manifest_bytes)?;

        // Pointer swap: the rename is the commit point.
        let current = self.current_path(pipeline);
        let tmp = self.pipeline_dir(pipeline).join(format!(".{CURRENT_FILE}.{run_id}.tmp"));
        write_synced(&tmp, &manifest_bytes)?;
        if let Err(e) = fs::rename(&tmp, &current) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }

        Ok(manifest)
    }

    fn verified_bytes(
        &self,
        run_dir: &Path,
        manifest: &ArtifactManifest,
        file: &str,
    ) -> Result<Vec<u8>, ArtifactError> {
        let path = run_dir.join(file);
        let expected = manifest.files.get(file).ok_or_else(|| ArtifactError::Unreadable {
            path: self.current_path(&manifest.pipeline),
            reason: format!("manifest does not bind {file}"),
        })?;

        let bytes = read_artifact(&path)?;
        let actual = sha256_hex(&bytes);
        if !actual.eq_ignore_ascii_case(expected) {
            return Err(ArtifactError::HashMismatch {
                path,
                expected: expected.clone(),
                actual,
            });
        }
        Ok(bytes)
    }
}

impl ArtifactStore for FileArtifactStore {
    type Error = ArtifactError;

    fn publish(
        &self,
        pipeline: &str,
        transformer: &Transformer,
        model: &TrainedModel,
    ) -> Result<ArtifactManifest, ArtifactError> {
        validate_key(pipeline)?;

        let run_id = new_run_id();
        let run_dir = self.run_dir(pipeline, &run_id);
        if let Some(parent) = run_dir.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::create_dir(&run_dir)?;

        match self.write_run(&run_dir, pipeline, &run_id, transformer, model) {
            Ok(manifest) => {
                tracing::info!(
                    "Published {} run {} ({} transformer, {} features)",
                    pipeline,
                    run_id,
                    manifest.transformer_kind,
                    manifest.feature_names.len()
                );
                Ok(manifest)
            }
            Err(e) => {
                tracing::error!("Publishing {} run {} failed: {}", pipeline, run_id, e);
                let _ = fs::remove_dir_all(&run_dir);
                Err(e)
            }
        }
    }

    fn load(&self, pipeline: &str) -> Result<ArtifactBundle, ArtifactError> {
        let manifest = self
            .current_manifest(pipeline)?
            .ok_or_else(|| ArtifactError::Missing {
                path: self.current_path(pipeline),
            })?;

        if manifest.format_version != ARTIFACT_FORMAT_VERSION {
            return Err(ArtifactError::UnsupportedVersion {
                found: manifest.format_version,
                supported: ARTIFACT_FORMAT_VERSION,
            });
        }
        if manifest.pipeline != pipeline {
            return Err(ArtifactError::Incompatible(format!(
                "pointer for {pipeline:?} names pipeline {:?}",
                manifest.pipeline
            )));
        }
        validate_key(&manifest.run_id)?;

        let run_dir = self.run_dir(pipeline, &manifest.run_id);
        let transformer_bytes = self.verified_bytes(&run_dir, &manifest, TRANSFORMER_FILE)?;
        let model_bytes = self.verified_bytes(&run_dir, &manifest, MODEL_FILE)?;

        let transformer: Transformer = parse_json(&run_dir.join(TRANSFORMER_FILE), &transformer_bytes)?;
        let model: TrainedModel = parse_json(&run_dir.join(MODEL_FILE), &model_bytes)?;

        model
            .validate()
            .map_err(|e| ArtifactError::Incompatible(format!("model: {e}")))?;
        if transformer.kind() != manifest.transformer_kind {
            return Err(ArtifactError::Incompatible(format!(
                "manifest declares a {} transformer, file holds {}",
                manifest.transformer_kind,
                transformer.kind()
            )));
        }
        if model.feature_names() != manifest.feature_names.as_slice() {
            return Err(ArtifactError::Incompatible(
                "model feature order differs from manifest".to_string(),
            ));
        }
        if let Some(column) = transformer
            .columns()
            .into_iter()
            .find(|c| !manifest.feature_names.contains(c))
        {
            return Err(ArtifactError::Incompatible(format!(
                "transformer column {column:?} is not a model feature"
            )));
        }

        tracing::info!(
            "Loaded {} run {} (accuracy {:.4})",
            pipeline,
            manifest.run_id,
            manifest.metrics.accuracy
        );

        Ok(ArtifactBundle {
            manifest,
            transformer,
            model,
        })
    }

    fn current_manifest(&self, pipeline: &str) -> Result<Option<ArtifactManifest>, ArtifactError> {
        validate_key(pipeline)?;
        let path = self.current_path(pipeline);
        match fs::read(&path) {
            Ok(bytes) => parse_json(&path, &bytes).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ArtifactError::Unreadable {
                path,
                reason: e.to_string(),
            }),
        }
    }

    fn list_runs(&self, pipeline: &str) -> Result<Vec<String>, ArtifactError> {
        validate_key(pipeline)?;
        let dir = self.pipeline_dir(pipeline).join(RUNS_DIR);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut runs = Vec::new();
        for entry in entries {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                runs.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        runs.sort();
        Ok(runs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CategoricalColumn;
    use crate::model::{ForestConfig, ModelMetrics, RandomForest};
    use crate::preprocessing::{CategoricalEncoder, CategoricalEncoderSet};
    use tempfile::TempDir;

    fn fixture() -> (Transformer, TrainedModel) {
        let spec = CategoricalColumn::strict("smoking_status", &["Never smoked", "Smokes"]);
        let transformer = Transformer::Encoders(CategoricalEncoderSet::new(vec![
            CategoricalEncoder::fit(&spec, ["Smokes"], true),
        ]));

        let x = vec![vec![30.0, 0.0], vec![35.0, 0.0], vec![70.0, 1.0], vec![75.0, 1.0]];
        let y = vec![0, 0, 1, 1];
        let config = ForestConfig {
            n_trees: 3,
            ..ForestConfig::default()
        };
        let forest = RandomForest::fit(&x, &y, &config).expect("Should fit");
        let metrics = ModelMetrics {
            accuracy: 1.0,
            train_rows: 4,
            test_rows: 1,
            class_counts_before: (2, 2),
            class_counts_after: (2, 2),
            test_class_counts: (0, 1),
        };
        let model = TrainedModel::new(
            vec!["age".to_string(), "smoking_status".to_string()],
            forest,
            metrics,
        )
        .expect("Should build");
        (transformer, model)
    }

    #[test]
    fn test_publish_then_load() {
        let dir = TempDir::new().expect("Should create temp dir");
        let store = FileArtifactStore::new(dir.path());
        let (transformer, model) = fixture();

        let manifest = store.publish("categorical", &transformer, &model).expect("Should publish");
        assert_eq!(manifest.format_version, ARTIFACT_FORMAT_VERSION);
        assert_eq!(manifest.files.len(), 2);

        let bundle = store.load("categorical").expect("Should load");
        assert_eq!(bundle.manifest, manifest);
        assert_eq!(bundle.transformer, transformer);
        assert_eq!(bundle.model, model);
        assert_eq!(
            store.current_manifest("categorical").expect("Should read"),
            Some(manifest)
        );
    }

    #[test]
    fn test_second_publish_moves_pointer() {
        let dir = TempDir::new().expect("Should create temp dir");
        let store = FileArtifactStore::new(dir.path());
        let (transformer, model) = fixture();

        let first = store.publish("clinical", &transformer, &model).expect("Should publish");
        let second = store.publish("clinical", &transformer, &model).expect("Should publish");
        assert_ne!(first.run_id, second.run_id);

        let runs = store.list_runs("clinical").expect("Should list");
        assert_eq!(runs.len(), 2);
        assert_eq!(store.load("clinical").expect("Should load").manifest.run_id, second.run_id);
    }

    #[test]
    fn test_missing_pointer() {
        let dir = TempDir::new().expect("Should create temp dir");
        let store = FileArtifactStore::new(dir.path());
        assert!(matches!(store.load("clinical"), Err(ArtifactError::Missing { .. })));
        assert_eq!(store.current_manifest("clinical").expect("Should read"), None);
        assert!(store.list_runs("clinical").expect("Should list").is_empty());
    }

    #[test]
    fn test_tampered_model_is_rejected() {
        let dir = TempDir::new().expect("Should create temp dir");
        let store = FileArtifactStore::new(dir.path());
        let (transformer, model) = fixture();
        let manifest = store.publish("clinical", &transformer, &model).expect("Should publish");

        let model_path = store.run_dir("clinical", &manifest.run_id).join(MODEL_FILE);
        let mut bytes = fs::read(&model_path).expect("Should read");
        bytes.push(b' ');
        fs::write(&model_path, bytes).expect("Should write");

        assert!(matches!(store.load("clinical"), Err(ArtifactError::HashMismatch { .. })));
    }

    #[test]
    fn test_deleted_transformer_is_missing() {
        let dir = TempDir::new().expect("Should create temp dir");
        let store = FileArtifactStore::new(dir.path());
        let (transformer, model) = fixture();
        let manifest = store.publish("clinical", &transformer, &model).expect("Should publish");

        fs::remove_file(store.run_dir("clinical", &manifest.run_id).join(TRANSFORMER_FILE))
            .expect("Should remove");
        assert!(matches!(store.load("clinical"), Err(ArtifactError::Missing { .. })));
    }

    #[test]
    fn test_unsupported_version() {
        let dir = TempDir::new().expect("Should create temp dir");
        let store = FileArtifactStore::new(dir.path());
        let (transformer, model) = fixture();
        let mut manifest = store.publish("clinical", &transformer, &model).expect("Should publish");

        manifest.format_version = ARTIFACT_FORMAT_VERSION + 1;
        fs::write(
            store.current_path("clinical"),
            serde_json::to_vec(&manifest).expect("Should serialize"),
        )
        .expect("Should write");

        assert!(matches!(
            store.load("clinical"),
            Err(ArtifactError::UnsupportedVersion { .. })
        ));
    }

    #[test]
    fn test_rejects_path_like_keys() {
        let dir = TempDir::new().expect("Should create temp dir");
        let store = FileArtifactStore::new(dir.path());
        let (transformer, model) = fixture();
        assert!(matches!(
            store.publish("../escape", &transformer, &model),
            Err(ArtifactError::InvalidKey(_))
        ));
    }
}
