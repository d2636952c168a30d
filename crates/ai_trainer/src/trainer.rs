//! Random forest trainer
//!
//! Fits the preprocessing pipeline and a bagged forest of Gini trees on the
//! training split, evaluates on the held-out split and packages the result
//! as a verified artifact. Trees are fitted in parallel; each one draws its
//! randomness from a seed derived from the forest seed and its index, so the
//! artifact hash does not depend on thread scheduling.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use practicas_ai_core::{
    AiCoreError, Evaluation, EvaluationMetrics, FittedPipeline, FixedRow, ForestParams, LabeledTable,
    ModelArtifact, PredictionTask, Preprocessor, RandomForest, TrainingSummary,
    UnknownCategoryPolicy,
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cart::{CartBuilder, TreeConfig};
use crate::dataset::{split, DatasetSplit};
use crate::deterministic::{tree_seed, LcgRng};
use crate::errors::{Result, TrainerError};

/// Everything one training run needs besides the data
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrainingParams {
    pub task: PredictionTask,
    #[serde(default)]
    pub forest: ForestParams,
    #[serde(default)]
    pub unknown_policy: UnknownCategoryPolicy,
    /// Refuse to produce an artifact whose held-out F1 is below this
    #[serde(default)]
    pub min_f1: Option<f64>,
}

impl TrainingParams {
    pub fn new(task: PredictionTask) -> Self {
        Self {
            task,
            forest: ForestParams::default(),
            unknown_policy: UnknownCategoryPolicy::default(),
            min_f1: None,
        }
    }

    pub fn with_forest(mut self, forest: ForestParams) -> Self {
        self.forest = forest;
        self
    }

    pub fn with_min_f1(mut self, min_f1: f64) -> Self {
        self.min_f1 = Some(min_f1);
        self
    }
}

/// Random forest trainer
pub struct ForestTrainer {
    params: TrainingParams,
    cancel: Arc<AtomicBool>,
}

impl ForestTrainer {
    pub fn new(params: TrainingParams) -> Self {
        Self {
            params,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Share a cancellation flag with the caller; checked before every tree
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn params(&self) -> &TrainingParams {
        &self.params
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    /// Train a forest on `data` and package it as an artifact
    pub fn train(&self, data: &LabeledTable) -> Result<ModelArtifact> {
        let params = &self.params;
        params.forest.validate()?;
        if let Some(min_f1) = params.min_f1 {
            if !(0.0..=1.0).contains(&min_f1) {
                return Err(TrainerError::Training(format!(
                    "min_f1 must be in [0, 1], got {min_f1}"
                )));
            }
        }

        let schema = params.task.schema();
        schema.ensure_matches(data.schema())?;
        if data.is_empty() {
            return Err(AiCoreError::NoData(format!(
                "no labeled {} rows to train on",
                params.task
            ))
            .into());
        }

        let DatasetSplit { train, test } =
            split(data, params.forest.test_fraction, params.forest.seed);
        let class_counts = train.class_counts();
        info!(
            task = %params.task,
            train_rows = train.len(),
            test_rows = test.as_ref().map_or(0, LabeledTable::len),
            positives = class_counts[1],
            negatives = class_counts[0],
            "starting forest training"
        );
        if class_counts.contains(&0) {
            warn!(task = %params.task, "training split holds a single class");
        }

        let (preprocessor, rows) =
            Preprocessor::fit_transform(&train.table, params.unknown_policy)?;
        let classes: Vec<usize> = train.labels.iter().map(Evaluation::class_index).collect();
        let forest = self.fit_forest(&rows, &classes)?;

        let pipeline = FittedPipeline::new(schema, preprocessor, forest, params.forest.clone())?;
        let metrics = match &test {
            Some(test) => Some(evaluate(&pipeline, test)?),
            None => None,
        };
        if let Some(m) = &metrics {
            info!(accuracy = m.accuracy, f1 = m.f1, "held-out evaluation");
        }
        self.check_quality(metrics.as_ref())?;

        let summary = TrainingSummary {
            train_rows: train.len(),
            test_rows: test.as_ref().map_or(0, LabeledTable::len),
            class_counts,
            metrics,
        };
        let artifact = ModelArtifact::new(pipeline, summary)?;
        info!(task = %params.task, hash = %artifact.hash, "training complete");
        Ok(artifact)
    }

    /// Fit `n_trees` bootstrapped trees in parallel
    fn fit_forest(&self, rows: &[FixedRow], classes: &[usize]) -> Result<RandomForest> {
        let forest = &self.params.forest;
        let n_features = rows.first().map_or(0, Vec::len);
        let tree_config = TreeConfig {
            max_depth: forest.max_depth,
            min_samples_split: forest.min_samples_split,
            min_samples_leaf: forest.min_samples_leaf,
            max_features: forest.features_per_split(n_features),
        };
        let builder = CartBuilder::new(rows, classes, tree_config);

        let trees = (0..forest.n_trees)
            .into_par_iter()
            .map(|tree_idx| {
                if self.is_cancelled() {
                    return Err(TrainerError::Cancelled);
                }
                let mut rng = LcgRng::new(tree_seed(forest.seed, tree_idx));
                let sample = rng.bootstrap(rows.len());
                let tree = builder.build(&sample, &mut rng);
                debug!(
                    tree = tree_idx,
                    nodes = tree.nodes.len(),
                    depth = tree.depth(),
                    "tree fitted"
                );
                Ok(tree)
            })
            .collect::<Result<Vec<_>>>()?;

        if self.is_cancelled() {
            return Err(TrainerError::Cancelled);
        }
        Ok(RandomForest::new(n_features, trees))
    }

    fn check_quality(&self, metrics: Option<&EvaluationMetrics>) -> Result<()> {
        let Some(min_f1) = self.params.min_f1 else {
            return Ok(());
        };
        match metrics {
            None => Err(TrainerError::QualityGate(format!(
                "min_f1 {min_f1} set but no rows were held out for evaluation"
            ))),
            Some(m) if m.f1 < min_f1 => Err(TrainerError::QualityGate(format!(
                "held-out F1 {:.4} is below the required {min_f1}",
                m.f1
            ))),
            Some(_) => Ok(()),
        }
    }
}

/// Score the held-out split
///
/// Held-out rows may carry categories the training split never saw, so
/// they are bucketed whatever the serving policy is.
fn evaluate(pipeline: &FittedPipeline, test: &LabeledTable) -> Result<EvaluationMetrics> {
    let predicted = test
        .table
        .rows()
        .iter()
        .map(|row| {
            pipeline
                .score_row_with(row, UnknownCategoryPolicy::Bucket)
                .map(|scores| scores.label())
        })
        .collect::<practicas_ai_core::Result<Vec<_>>>()?;
    Ok(EvaluationMetrics::evaluate(&test.labels, &predicted))
}

#[cfg(test)]
mod tests {
    use super::*;
    use practicas_ai_core::{extract_labeled, ErrorKind, LabeledRecord, Record};

    /// Task rows whose outcome is decided by the task duration
    fn duration_table(n: usize) -> LabeledTable {
        let schema = PredictionTask::Task.schema();
        let records: Vec<LabeledRecord> = (0..n)
            .map(|i| {
                let days = (i % 20) as f64;
                let mut record = Record::new();
                for name in schema.column_names() {
                    record.insert(name, "x");
                }
                record.insert("tarea_participantes", (i % 3) as f64);
                record.insert("tarea_duracion_dias", days);
                record.insert("conc_actores_externos", 1.0);
                record.insert("tarea_tipo", if i % 2 == 0 { "Desarrollo" } else { "Analisis" });
                LabeledRecord {
                    record,
                    label: if days < 10.0 {
                        Evaluation::Positive
                    } else {
                        Evaluation::Improvable
                    },
                }
            })
            .collect();
        extract_labeled(&schema, &records).unwrap()
    }

    fn small_params() -> TrainingParams {
        TrainingParams::new(PredictionTask::Task).with_forest(ForestParams {
            n_trees: 12,
            max_depth: 4,
            max_features: Some(4),
            ..ForestParams::default()
        })
    }

    #[test]
    fn test_training_is_deterministic() {
        let data = duration_table(60);
        let a = ForestTrainer::new(small_params()).train(&data).unwrap();
        let b = ForestTrainer::new(small_params()).train(&data).unwrap();
        assert_eq!(a.hash, b.hash);
        assert_eq!(a.pipeline, b.pipeline);

        let mut other = small_params();
        other.forest.seed = 7;
        let c = ForestTrainer::new(other).train(&data).unwrap();
        assert_ne!(a.hash, c.hash);
    }

    #[test]
    fn test_learns_separable_signal() {
        let data = duration_table(100);
        let mut params = small_params();
        params.forest.max_features = Some(18);
        let artifact = ForestTrainer::new(params).train(&data).unwrap();

        assert_eq!(artifact.summary.train_rows, 70);
        assert_eq!(artifact.summary.test_rows, 30);
        assert_eq!(artifact.pipeline.forest.num_trees(), 12);
        let metrics = artifact.summary.metrics.clone().unwrap();
        assert!(metrics.accuracy > 0.8, "accuracy {}", metrics.accuracy);
        artifact.verify().unwrap();
    }

    #[test]
    fn test_empty_table_is_no_data() {
        let data = duration_table(10).select(&[]);
        let err = ForestTrainer::new(small_params()).train(&data).unwrap_err();
        assert_eq!(err.core_kind(), Some(ErrorKind::NoData));
    }

    #[test]
    fn test_wrong_task_schema_is_rejected() {
        let data = duration_table(10);
        let params = TrainingParams::new(PredictionTask::Agreement);
        let err = ForestTrainer::new(params).train(&data).unwrap_err();
        assert_eq!(err.core_kind(), Some(ErrorKind::SchemaMismatch));
    }

    #[test]
    fn test_cancelled_before_start() {
        let trainer = ForestTrainer::new(small_params());
        trainer.cancel_flag().store(true, Ordering::Relaxed);
        let err = trainer.train(&duration_table(40)).unwrap_err();
        assert!(matches!(err, TrainerError::Cancelled));
    }

    #[test]
    fn test_quality_gate() {
        let data = duration_table(100);
        let err = ForestTrainer::new(small_params().with_min_f1(1.01))
            .train(&data)
            .unwrap_err();
        assert!(matches!(err, TrainerError::Training(_)));

        // no positive rows at all: F1 of `Positiva` is 0
        let mut negative = data.clone();
        negative.labels.fill(Evaluation::Improvable);
        let err = ForestTrainer::new(small_params().with_min_f1(0.5))
            .train(&negative)
            .unwrap_err();
        assert!(matches!(err, TrainerError::QualityGate(_)));

        let ok = ForestTrainer::new(small_params().with_min_f1(0.0)).train(&data);
        assert!(ok.is_ok());
    }

    #[test]
    fn test_quality_gate_needs_held_out_rows() {
        let mut params = small_params().with_min_f1(0.5);
        params.forest.test_fraction = 0.0;
        let err = ForestTrainer::new(params)
            .train(&duration_table(30))
            .unwrap_err();
        assert!(matches!(err, TrainerError::QualityGate(_)));
    }
}
