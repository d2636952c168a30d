//! Outcome prediction core for the internship management backend
//!
//! Predicts whether a topic agreement or a student task will be evaluated
//! `Positiva` or `Mejorable`, from categorical and demographic features of the
//! people and institutions involved.
//!
//! Modules:
//! - `schema`: Static, versioned feature schemas per prediction task
//! - `records`: Joined relational rows and their flat representation
//! - `features`: Schema-typed extraction and the CSV training export
//! - `preprocessing`: Imputation, ordinal encoding and min-max scaling
//! - `forest`: Integer-only random forest inference
//! - `artifact`: Fitted pipelines, hashing and verification
//! - `store`: Atomic artifact persistence with bounded history
//! - `source`: The query collaborator interface
//! - `predictor`: Single-record inference
//! - `metrics`: Held-out accuracy and F1

pub mod artifact;
pub mod errors;
pub mod features;
pub mod fixed;
pub mod forest;
pub mod label;
pub mod metrics;
pub mod predictor;
pub mod preprocessing;
pub mod records;
pub mod schema;
pub mod serde_canon;
pub mod source;
pub mod store;

pub use artifact::{
    ArtifactInfo, FittedPipeline, ForestParams, ModelArtifact, TrainingSummary,
    ARTIFACT_FORMAT_VERSION,
};
pub use errors::{AiCoreError, ErrorKind, ErrorReport, Result};
pub use features::{
    export_csv, extract, extract_labeled, extract_row, labeled_from_joined, FeatureRow,
    FeatureTable, FeatureValue, LabeledTable,
};
pub use fixed::SCALE;
pub use forest::{ClassScores, Node, RandomForest, Tree};
pub use label::Evaluation;
pub use metrics::{ConfusionMatrix, EvaluationMetrics};
pub use predictor::{PredictionResult, Predictor};
pub use preprocessing::{FixedRow, Preprocessor, UnknownCategoryPolicy};
pub use records::{
    AgreementRecord, FieldValue, JoinedRecord, LabeledRecord, Record, TaskRecord,
};
pub use schema::{ColumnKind, ColumnSpec, FeatureSchema, PredictionTask};
pub use source::{InMemorySource, RecordSource, SourceDump};
pub use store::{
    ArtifactStore, FileArtifactStore, MemoryArtifactStore, StoredVersion, DEFAULT_HISTORY_LIMIT,
};

/// Crate version string for artifact metadata and reports
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
