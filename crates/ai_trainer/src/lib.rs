//! Practicas AI Trainer - random forest training for outcome prediction
//!
//! Fits the preprocessing pipeline and a bagged Gini forest for one
//! prediction task, evaluates it on a held-out split and stores the
//! resulting artifact. Training is reproducible: the same rows and seed
//! always give the same artifact hash.

pub mod cart;
pub mod config;
pub mod dataset;
pub mod deterministic;
pub mod errors;
pub mod jobs;
pub mod trainer;

use std::path::Path;

use practicas_ai_core::{ArtifactInfo, ArtifactStore, ModelArtifact, RecordSource};
use tracing::info;

pub use crate::config::TrainerConfig;
pub use dataset::{load_csv, load_from_source, split, DatasetSplit};
pub use deterministic::{LcgRng, SplitTieBreaker};
pub use errors::{Result, TrainerError};
pub use jobs::{JobId, JobState, JobStatus, TrainingJobs, RETAINED_FINISHED_JOBS};
pub use trainer::{ForestTrainer, TrainingParams};

/// Train from the record source without storing the result
pub fn train_from_source(
    source: &dyn RecordSource,
    params: TrainingParams,
) -> Result<ModelArtifact> {
    let data = load_from_source(source, params.task)?;
    ForestTrainer::new(params).train(&data)
}

/// Train from a CSV export of `params.task` without storing the result
pub fn train_from_csv(path: &Path, params: TrainingParams) -> Result<ModelArtifact> {
    let data = load_csv(params.task, path)?;
    ForestTrainer::new(params).train(&data)
}

/// Train and replace the stored artifact of the task
pub fn train_and_store(
    source: &dyn RecordSource,
    store: &dyn ArtifactStore,
    params: TrainingParams,
) -> Result<ArtifactInfo> {
    let task = params.task;
    let artifact = train_from_source(source, params)?;
    store.put(task, &artifact)?;
    info!(%task, hash = %artifact.hash, "artifact stored");
    Ok(artifact.info())
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
