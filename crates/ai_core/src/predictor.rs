//! Single-record inference against the stored pipeline

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::artifact::ModelArtifact;
use crate::errors::{AiCoreError, Result};
use crate::features::extract_row;
use crate::label::Evaluation;
use crate::preprocessing::UnknownCategoryPolicy;
use crate::records::Record;
use crate::schema::PredictionTask;
use crate::source::RecordSource;
use crate::store::ArtifactStore;

/// Outcome of one prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub label: Evaluation,
    /// Probability of `Mejorable`
    pub prob_class_0: f64,
    /// Probability of `Positiva`
    pub prob_class_1: f64,
    /// Hash of the artifact that produced this result
    pub model_hash: String,
}

/// Read-only scorer; never mutates the artifact
pub struct Predictor {
    store: Arc<dyn ArtifactStore>,
    source: Arc<dyn RecordSource>,
    unknown_policy: Option<UnknownCategoryPolicy>,
}

impl Predictor {
    pub fn new(store: Arc<dyn ArtifactStore>, source: Arc<dyn RecordSource>) -> Self {
        Self {
            store,
            source,
            unknown_policy: None,
        }
    }

    /// Serve with a fixed unknown-category policy instead of the trained one
    pub fn with_unknown_policy(mut self, policy: UnknownCategoryPolicy) -> Self {
        self.unknown_policy = Some(policy);
        self
    }

    /// Current artifact of `task`, checked against the live schema
    fn artifact(&self, task: PredictionTask) -> Result<Arc<ModelArtifact>> {
        let artifact = self.store.get(task)?;
        artifact.pipeline.schema.ensure_matches(&task.schema())?;
        Ok(artifact)
    }

    /// Look up `id` through the record source and score it
    ///
    /// With `annotate` the label is handed to the source's annotation hook.
    #[instrument(skip(self), fields(task = %task, id = %id))]
    pub fn predict(&self, task: PredictionTask, id: Uuid, annotate: bool) -> Result<PredictionResult> {
        let artifact = self.artifact(task)?;

        let mut records = self.source.records_for(task, id)?;
        let record = match records.len() {
            0 => return Err(AiCoreError::NoData(format!("no {task} found with id {id}"))),
            1 => records.remove(0),
            n => {
                return Err(AiCoreError::InvalidInput(format!(
                    "id {id} matches {n} {task} rows; expected exactly one"
                )))
            }
        };

        let result = self.score(&artifact, &record)?;
        if annotate {
            self.source.record_prediction(task, id, result.label)?;
        }
        Ok(result)
    }

    /// Score an already assembled record
    #[instrument(skip(self, record), fields(task = %task))]
    pub fn predict_record(&self, task: PredictionTask, record: &Record) -> Result<PredictionResult> {
        let artifact = self.artifact(task)?;
        self.score(&artifact, record)
    }

    fn score(&self, artifact: &ModelArtifact, record: &Record) -> Result<PredictionResult> {
        let pipeline = &artifact.pipeline;
        let row = extract_row(&pipeline.schema, record)?;
        let policy = self
            .unknown_policy
            .unwrap_or(pipeline.preprocessor.unknown_policy);
        let scores = pipeline.score_row_with(&row, policy)?;

        debug!(
            label = %scores.label(),
            prob_class_1 = scores.prob_class_1,
            hash = %artifact.hash,
            "scored record"
        );

        Ok(PredictionResult {
            label: scores.label(),
            prob_class_0: scores.prob_class_0,
            prob_class_1: scores.prob_class_1,
            model_hash: artifact.hash.clone(),
        })
    }
}
