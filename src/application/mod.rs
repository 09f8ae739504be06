//! Application layer: Use cases and services.
//!
//! This module orchestrates domain logic with ports to implement
//! the core use cases of the application: training a pipeline,
//! serving its artifacts and answering prediction requests.

mod inference;
mod serving;
mod training;
mod worker;

pub use inference::InferenceService;
pub use serving::{ServingContext, SharedService};
pub use training::{fit_pipeline, FittedPipeline, TrainingReport, TrainingService};
pub use worker::{parse_jobs, BatchHandle, BatchJob, BatchOutcome, BatchProgress, BatchWorkerPool, OutcomeBody};
