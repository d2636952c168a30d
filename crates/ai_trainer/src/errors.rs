use practicas_ai_core::{AiCoreError, ErrorKind};
use std::time::Duration;
use thiserror::Error;

/// Errors returned by the forest trainer and its job runner.
#[derive(Debug, Error)]
pub enum TrainerError {
    #[error("dataset error: {0}")]
    Dataset(String),

    #[error("training error: {0}")]
    Training(String),

    /// Evaluation on the held-out split fell short of `min_f1`
    #[error("quality gate failed: {0}")]
    QualityGate(String),

    #[error("training cancelled")]
    Cancelled,

    #[error("training timed out after {0:?}")]
    TimedOut(Duration),

    #[error("training job {0} not found")]
    JobNotFound(u64),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error(transparent)]
    Core(#[from] AiCoreError),
}

impl TrainerError {
    /// Kind of the wrapped core error, if this is one
    pub fn core_kind(&self) -> Option<ErrorKind> {
        match self {
            TrainerError::Core(err) => Some(err.kind()),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, TrainerError>;
