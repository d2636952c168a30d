//! Fitted pipeline artifacts
//!
//! An artifact bundles the schema it was trained for, the fitted
//! preprocessor, the forest and the parameters that produced it. Its hash is
//! BLAKE3 over the canonical JSON of the pipeline only, so two runs over the
//! same data with the same seed produce the same hash regardless of when
//! they ran.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{AiCoreError, Result};
use crate::features::{FeatureRow, FeatureTable};
use crate::forest::{ClassScores, RandomForest};
use crate::metrics::EvaluationMetrics;
use crate::preprocessing::{Preprocessor, UnknownCategoryPolicy};
use crate::schema::{FeatureSchema, PredictionTask};
use crate::serde_canon::{hash_canonical_hex, to_canonical_json};

pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

/// Forest hyper-parameters and split settings recorded in the artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestParams {
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features tried per split; `None` means `floor(sqrt(d))`
    pub max_features: Option<usize>,
    pub seed: u64,
    /// Share of rows held out for evaluation
    pub test_fraction: f64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: 10,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            seed: 42,
            test_fraction: 0.3,
        }
    }
}

impl ForestParams {
    pub fn features_per_split(&self, n_features: usize) -> usize {
        let k = self
            .max_features
            .unwrap_or_else(|| (n_features as f64).sqrt().floor() as usize);
        k.clamp(1, n_features.max(1))
    }

    pub fn validate(&self) -> Result<()> {
        if self.n_trees == 0 {
            return Err(AiCoreError::InvalidInput("n_trees must be at least 1".into()));
        }
        if self.max_depth == 0 {
            return Err(AiCoreError::InvalidInput("max_depth must be at least 1".into()));
        }
        if self.min_samples_leaf == 0 || self.min_samples_split < 2 {
            return Err(AiCoreError::InvalidInput(
                "min_samples_leaf must be >= 1 and min_samples_split >= 2".into(),
            ));
        }
        if !(0.0..1.0).contains(&self.test_fraction) {
            return Err(AiCoreError::InvalidInput(format!(
                "test_fraction must be in [0, 1), got {}",
                self.test_fraction
            )));
        }
        if self.max_features == Some(0) {
            return Err(AiCoreError::InvalidInput("max_features must be at least 1".into()));
        }
        Ok(())
    }
}

/// Preprocessor and forest fitted together for one schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedPipeline {
    pub schema: FeatureSchema,
    pub schema_fingerprint: String,
    pub preprocessor: Preprocessor,
    pub forest: RandomForest,
    pub params: ForestParams,
}

impl FittedPipeline {
    pub fn new(
        schema: FeatureSchema,
        preprocessor: Preprocessor,
        forest: RandomForest,
        params: ForestParams,
    ) -> Result<Self> {
        let schema_fingerprint = schema.fingerprint()?;
        let pipeline = Self {
            schema,
            schema_fingerprint,
            preprocessor,
            forest,
            params,
        };
        pipeline.validate()?;
        Ok(pipeline)
    }

    pub fn task(&self) -> PredictionTask {
        self.schema.task
    }

    pub fn validate(&self) -> Result<()> {
        if self.schema.fingerprint()? != self.schema_fingerprint {
            return Err(AiCoreError::InvalidArtifact(
                "schema fingerprint does not match the embedded schema".to_string(),
            ));
        }
        self.preprocessor
            .ensure_columns(&self.schema)
            .map_err(|e| AiCoreError::InvalidArtifact(e.to_string()))?;
        if self.forest.n_features != self.schema.len() {
            return Err(AiCoreError::InvalidArtifact(format!(
                "forest expects {} features, schema has {}",
                self.forest.n_features,
                self.schema.len()
            )));
        }
        self.forest.validate()
    }

    pub fn hash(&self) -> Result<String> {
        Ok(hash_canonical_hex(self)?)
    }

    pub fn score_row(&self, row: &FeatureRow) -> Result<ClassScores> {
        self.score_row_with(row, self.preprocessor.unknown_policy)
    }

    /// Score with a serving-time unknown-category policy
    pub fn score_row_with(
        &self,
        row: &FeatureRow,
        policy: UnknownCategoryPolicy,
    ) -> Result<ClassScores> {
        let transformed = self.preprocessor.transform_row_with(row, policy)?;
        self.forest.predict_proba(&transformed)
    }

    pub fn score_table(&self, table: &FeatureTable) -> Result<Vec<ClassScores>> {
        self.schema.ensure_matches(table.schema())?;
        self.preprocessor
            .transform(table)?
            .iter()
            .map(|row| self.forest.predict_proba(row))
            .collect()
    }
}

/// Training facts kept next to the pipeline; not part of the hash
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSummary {
    pub train_rows: usize,
    pub test_rows: usize,
    /// Training rows per class index
    pub class_counts: [usize; 2],
    /// `None` when the held-out split was empty
    pub metrics: Option<EvaluationMetrics>,
}

/// What gets persisted: a verified pipeline plus provenance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub format_version: u32,
    pub hash: String,
    pub created_at: DateTime<Utc>,
    pub summary: TrainingSummary,
    pub pipeline: FittedPipeline,
}

impl ModelArtifact {
    pub fn new(pipeline: FittedPipeline, summary: TrainingSummary) -> Result<Self> {
        let hash = pipeline.hash()?;
        Ok(Self {
            format_version: ARTIFACT_FORMAT_VERSION,
            hash,
            created_at: Utc::now(),
            summary,
            pipeline,
        })
    }

    pub fn task(&self) -> PredictionTask {
        self.pipeline.task()
    }

    /// Format, structure and hash checks run on every load
    pub fn verify(&self) -> Result<()> {
        if self.format_version != ARTIFACT_FORMAT_VERSION {
            return Err(AiCoreError::InvalidArtifact(format!(
                "unsupported artifact format version {}",
                self.format_version
            )));
        }
        self.pipeline.validate()?;
        let actual = self.pipeline.hash()?;
        if actual != self.hash {
            return Err(AiCoreError::InvalidArtifact(format!(
                "hash mismatch: recorded {}, computed {}",
                self.hash, actual
            )));
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(to_canonical_json(self)?)
    }

    /// Parse and verify; anything unreadable is `InvalidArtifact`
    pub fn from_json(json: &str) -> Result<Self> {
        let artifact: ModelArtifact = serde_json::from_str(json)
            .map_err(|e| AiCoreError::InvalidArtifact(format!("unreadable artifact: {e}")))?;
        artifact.verify()?;
        Ok(artifact)
    }

    pub fn info(&self) -> ArtifactInfo {
        ArtifactInfo {
            task: self.task(),
            hash: self.hash.clone(),
            created_at: self.created_at,
            schema_version: self.pipeline.schema.version,
            n_trees: self.pipeline.forest.num_trees(),
            summary: self.summary.clone(),
        }
    }
}

/// Lightweight description used by listings and the CLI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactInfo {
    pub task: PredictionTask,
    pub hash: String,
    pub created_at: DateTime<Utc>,
    pub schema_version: u32,
    pub n_trees: usize,
    pub summary: TrainingSummary,
}
