//! Error types for the outcome prediction core

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::serde_canon::CanonicalError;

/// Errors that can occur while extracting, preprocessing, storing or scoring
#[derive(Error, Debug)]
pub enum AiCoreError {
    /// Zero rows where at least one was required
    #[error("No data: {0}")]
    NoData(String),

    /// Incoming data does not match the feature schema of the model
    #[error("Schema mismatch on column '{column}': {reason}")]
    SchemaMismatch { column: String, reason: String },

    /// Predict requested before any successful training run
    #[error("Model for task '{task}' is not trained yet; train the model first")]
    ArtifactNotFound { task: String },

    /// Stored artifact is corrupt, truncated or fails validation
    #[error("Invalid artifact: {0}")]
    InvalidArtifact(String),

    /// Malformed caller input (labels, identifiers, parameters)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Failure reported by the relational query collaborator
    #[error("Upstream failure: {0}")]
    Upstream(#[source] anyhow::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// CSV export/import error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl From<CanonicalError> for AiCoreError {
    fn from(err: CanonicalError) -> Self {
        AiCoreError::InvalidArtifact(err.to_string())
    }
}

/// Stable error classification exposed to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NoData,
    SchemaMismatch,
    ArtifactNotFound,
    InvalidArtifact,
    InvalidInput,
    Upstream,
    Io,
    Serialization,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::NoData => "no_data",
            ErrorKind::SchemaMismatch => "schema_mismatch",
            ErrorKind::ArtifactNotFound => "artifact_not_found",
            ErrorKind::InvalidArtifact => "invalid_artifact",
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::Upstream => "upstream",
            ErrorKind::Io => "io",
            ErrorKind::Serialization => "serialization",
        };
        f.write_str(name)
    }
}

/// Structured error payload (kind + message) handed back to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub message: String,
}

impl AiCoreError {
    pub fn schema_mismatch(column: impl Into<String>, reason: impl Into<String>) -> Self {
        AiCoreError::SchemaMismatch {
            column: column.into(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AiCoreError::NoData(_) => ErrorKind::NoData,
            AiCoreError::SchemaMismatch { .. } => ErrorKind::SchemaMismatch,
            AiCoreError::ArtifactNotFound { .. } => ErrorKind::ArtifactNotFound,
            AiCoreError::InvalidArtifact(_) => ErrorKind::InvalidArtifact,
            AiCoreError::InvalidInput(_) => ErrorKind::InvalidInput,
            AiCoreError::Upstream(_) => ErrorKind::Upstream,
            AiCoreError::Io(_) => ErrorKind::Io,
            AiCoreError::Serialization(_) | AiCoreError::Csv(_) => ErrorKind::Serialization,
        }
    }

    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            kind: self.kind(),
            message: self.to_string(),
        }
    }
}

/// Result type for core operations
pub type Result<T> = std::result::Result<T, AiCoreError>;
