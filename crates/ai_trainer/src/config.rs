//! Trainer configuration
//!
//! Values come from an optional TOML file overlaid with `PRACTICAS_`
//! environment variables; nested keys use a double underscore, e.g.
//! `PRACTICAS_FOREST__N_TREES=200`. Anything unset keeps its default.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use practicas_ai_core::{
    FileArtifactStore, ForestParams, PredictionTask, UnknownCategoryPolicy,
    DEFAULT_HISTORY_LIMIT,
};
use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::trainer::TrainingParams;

pub const ENV_PREFIX: &str = "PRACTICAS";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    /// Directory holding `<task>.json` artifacts and their history
    pub store_dir: PathBuf,
    pub history_limit: usize,
    pub unknown_policy: UnknownCategoryPolicy,
    /// Upper bound for one training job
    pub job_timeout_secs: u64,
    pub forest: ForestParams,
    pub min_f1: Option<f64>,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            store_dir: PathBuf::from("models"),
            history_limit: DEFAULT_HISTORY_LIMIT,
            unknown_policy: UnknownCategoryPolicy::default(),
            job_timeout_secs: 600,
            forest: ForestParams::default(),
            min_f1: None,
        }
    }
}

impl TrainerConfig {
    /// Load from `path` (if given) and the process environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, None)
    }

    /// Like `load`, reading variables from `env` instead of the process
    pub fn load_with_env(
        path: Option<&Path>,
        env: Option<HashMap<String, String>>,
    ) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            if !path.exists() {
                return Err(ConfigError::Message(format!(
                    "configuration file {} not found",
                    path.display()
                ))
                .into());
            }
            builder = builder.add_source(File::from(path));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .source(env),
        );

        let config: TrainerConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.history_limit == 0 {
            return Err(ConfigError::Message("history_limit must be at least 1".into()).into());
        }
        if self.job_timeout_secs == 0 {
            return Err(ConfigError::Message("job_timeout_secs must be at least 1".into()).into());
        }
        self.forest.validate()?;
        Ok(())
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }

    pub fn training_params(&self, task: PredictionTask) -> TrainingParams {
        TrainingParams {
            task,
            forest: self.forest.clone(),
            unknown_policy: self.unknown_policy,
            min_f1: self.min_f1,
        }
    }

    pub fn open_store(&self) -> Result<FileArtifactStore> {
        Ok(FileArtifactStore::with_history_limit(
            &self.store_dir,
            self.history_limit,
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn env(pairs: &[(&str, &str)]) -> Option<HashMap<String, String>> {
        Some(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_defaults_without_sources() {
        let config = TrainerConfig::load_with_env(None, env(&[])).unwrap();
        assert_eq!(config, TrainerConfig::default());
        assert_eq!(config.forest.n_trees, 100);
        assert_eq!(config.forest.seed, 42);
        assert_eq!(config.history_limit, 3);
    }

    #[test]
    fn test_file_then_environment() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trainer.toml");
        fs::write(
            &path,
            r#"
store_dir = "/var/lib/practicas/models"
unknown_policy = "reject"
min_f1 = 0.6

[forest]
n_trees = 50
max_depth = 6
"#,
        )
        .unwrap();

        let config = TrainerConfig::load_with_env(
            Some(&path),
            env(&[
                ("PRACTICAS_FOREST__N_TREES", "25"),
                ("PRACTICAS_JOB_TIMEOUT_SECS", "30"),
            ]),
        )
        .unwrap();

        assert_eq!(config.store_dir, PathBuf::from("/var/lib/practicas/models"));
        assert_eq!(config.unknown_policy, UnknownCategoryPolicy::Reject);
        assert_eq!(config.min_f1, Some(0.6));
        assert_eq!(config.forest.n_trees, 25);
        assert_eq!(config.forest.max_depth, 6);
        assert_eq!(config.forest.seed, 42);
        assert_eq!(config.job_timeout(), Duration::from_secs(30));

        let params = config.training_params(PredictionTask::Agreement);
        assert_eq!(params.task, PredictionTask::Agreement);
        assert_eq!(params.forest.n_trees, 25);
        assert_eq!(params.unknown_policy, UnknownCategoryPolicy::Reject);
    }

    #[test]
    fn test_missing_file_and_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(TrainerConfig::load_with_env(Some(&missing), env(&[])).is_err());

        let err = TrainerConfig::load_with_env(None, env(&[("PRACTICAS_HISTORY_LIMIT", "0")]))
            .unwrap_err();
        assert!(matches!(err, crate::errors::TrainerError::Config(_)));
    }
}
