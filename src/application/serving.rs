//! Serving context: loaded inference services for every configured pipeline.
//!
//! Built once at startup and injected wherever predictions are made. Each
//! pipeline's service sits behind an `RwLock<Arc<_>>`; requests clone the
//! `Arc` and release the lock immediately, so a reload only ever swaps a fully
//! built service in and in-flight requests finish on the snapshot they took.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::adapters::ArtifactError;
use crate::domain::{normalize_name, FeatureRecord, PipelineConfig, RiskVerdict};
use crate::model::TrainedModel;
use crate::ports::ArtifactStore;
use crate::{Result, StrokewatchError};

use super::InferenceService;

/// Shared handle to a pipeline's current inference service.
pub type SharedService = Arc<InferenceService<TrainedModel>>;

struct PipelineSlot {
    config: PipelineConfig,
    service: RwLock<SharedService>,
}

/// Inference services for a fixed set of pipelines, backed by an artifact store.
pub struct ServingContext<S>
where
    S: ArtifactStore,
{
    store: Arc<S>,
    slots: BTreeMap<String, PipelineSlot>,
}

impl<S> std::fmt::Debug for ServingContext<S>
where
    S: ArtifactStore,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServingContext")
            .field("pipelines", &self.slots.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl<S> ServingContext<S>
where
    S: ArtifactStore,
    S::Error: Into<ArtifactError>,
{
    /// Load the current artifacts of every pipeline.
    ///
    /// # Errors
    /// Fails on the first pipeline whose artifacts are missing, unverifiable or
    /// incompatible with its configuration. Nothing is served in that case.
    pub fn load(store: Arc<S>, configs: Vec<PipelineConfig>) -> Result<Self> {
        let mut slots = BTreeMap::new();
        for config in configs {
            config.validate().map_err(StrokewatchError::Config)?;
            let service = build_service(store.as_ref(), &config)?;
            tracing::info!(
                "Serving pipeline {} from run {}",
                config.id,
                service.run_id().unwrap_or("-")
            );
            let id = config.id.clone();
            let slot = PipelineSlot {
                config,
                service: RwLock::new(service),
            };
            if slots.insert(id.clone(), slot).is_some() {
                return Err(StrokewatchError::Config(format!("Pipeline {id:?} configured twice")));
            }
        }
        Ok(Self { store, slots })
    }

    /// Identifiers of the served pipelines.
    #[must_use]
    pub fn pipelines(&self) -> Vec<String> {
        self.slots.keys().cloned().collect()
    }

    fn slot(&self, pipeline: &str) -> Result<&PipelineSlot> {
        self.slots
            .get(&normalize_name(pipeline))
            .ok_or_else(|| StrokewatchError::Config(format!("Pipeline {pipeline:?} is not served")))
    }

    /// Snapshot of a pipeline's current service.
    ///
    /// # Errors
    /// Returns `Config` for a pipeline that is not served.
    pub fn service(&self, pipeline: &str) -> Result<SharedService> {
        let slot = self.slot(pipeline)?;
        let guard = slot.service.read().unwrap_or_else(PoisonError::into_inner);
        Ok(Arc::clone(&guard))
    }

    /// Predict with the current service of a pipeline.
    ///
    /// # Errors
    /// Same as [`InferenceService::predict`], plus `Config` for an unknown pipeline.
    pub fn predict(&self, pipeline: &str, record: &FeatureRecord) -> Result<RiskVerdict> {
        self.service(pipeline)?.predict(record)
    }

    /// Rebuild a pipeline's service from the store and swap it in.
    ///
    /// # Errors
    /// Returns the load error; the previous service then keeps serving.
    pub fn reload(&self, pipeline: &str) -> Result<SharedService> {
        let slot = self.slot(pipeline)?;
        let fresh = match build_service(self.store.as_ref(), &slot.config) {
            Ok(service) => service,
            Err(e) => {
                tracing::error!("Reload of {} failed, keeping current artifacts: {}", slot.config.id, e);
                return Err(e);
            }
        };

        let mut guard = slot.service.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Arc::clone(&fresh);
        drop(guard);

        tracing::info!(
            "Reloaded pipeline {} (run {})",
            slot.config.id,
            fresh.run_id().unwrap_or("-")
        );
        Ok(fresh)
    }
}

fn build_service<S>(store: &S, config: &PipelineConfig) -> Result<SharedService>
where
    S: ArtifactStore,
    S::Error: Into<ArtifactError>,
{
    let bundle = store
        .load(&config.id)
        .map_err(|e| StrokewatchError::Artifact(e.into()))?;
    Ok(Arc::new(InferenceService::from_bundle(config.clone(), bundle)?))
}
