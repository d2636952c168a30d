//! Random forest ensemble with integer-only inference

use serde::{Deserialize, Serialize};

use super::tree::{Node, Tree};
use crate::errors::{AiCoreError, Result};
use crate::fixed::{self, SCALE};
use crate::label::Evaluation;

/// Forest format version
pub const FOREST_VERSION: u32 = 1;

/// Class probabilities for one row
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassScores {
    /// Averaged class-1 fraction, fixed-point
    pub positive_fixed: i64,
    pub prob_class_0: f64,
    pub prob_class_1: f64,
}

impl ClassScores {
    fn from_fixed(positive_fixed: i64) -> Self {
        let prob_class_1 = fixed::to_f64(positive_fixed);
        Self {
            positive_fixed,
            prob_class_0: 1.0 - prob_class_1,
            prob_class_1,
        }
    }

    /// Arg-max over the two classes; an exact tie goes to class 0
    pub fn label(&self) -> Evaluation {
        if self.positive_fixed * 2 > SCALE {
            Evaluation::Positive
        } else {
            Evaluation::Improvable
        }
    }
}

/// Bagged classification trees over a fixed number of features
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RandomForest {
    pub version: u32,
    pub n_features: usize,
    pub trees: Vec<Tree>,
}

impl RandomForest {
    pub fn new(n_features: usize, trees: Vec<Tree>) -> Self {
        Self {
            version: FOREST_VERSION,
            n_features,
            trees,
        }
    }

    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn validate(&self) -> Result<()> {
        if self.version != FOREST_VERSION {
            return Err(AiCoreError::InvalidArtifact(format!(
                "unsupported forest version {}",
                self.version
            )));
        }
        if self.trees.is_empty() {
            return Err(AiCoreError::InvalidArtifact(
                "forest has no trees".to_string(),
            ));
        }
        for (i, tree) in self.trees.iter().enumerate() {
            tree.validate(self.n_features).map_err(|e| {
                AiCoreError::InvalidArtifact(format!("tree {i} validation failed: {e}"))
            })?;
        }
        Ok(())
    }

    /// Average the class-1 leaf fractions of every tree
    pub fn predict_proba(&self, row: &[i64]) -> Result<ClassScores> {
        if row.len() != self.n_features {
            return Err(AiCoreError::schema_mismatch(
                "<row>",
                format!(
                    "forest expects {} features, row has {}",
                    self.n_features,
                    row.len()
                ),
            ));
        }
        if self.trees.is_empty() {
            return Err(AiCoreError::InvalidArtifact(
                "forest has no trees".to_string(),
            ));
        }

        let mut sum: i128 = 0;
        for (i, tree) in self.trees.iter().enumerate() {
            let value = tree.evaluate(row).ok_or_else(|| {
                AiCoreError::InvalidArtifact(format!("tree {i} could not score the row"))
            })?;
            sum += value as i128;
        }

        let n = self.trees.len() as i128;
        let avg = ((sum + n / 2) / n).clamp(0, SCALE as i128) as i64;
        Ok(ClassScores::from_fixed(avg))
    }

    /// Number of split nodes per feature across the forest
    pub fn split_counts(&self) -> Vec<usize> {
        let mut counts = vec![0usize; self.n_features];
        for tree in &self.trees {
            for node in &tree.nodes {
                if let Node::Split { feature, .. } = node {
                    if let Some(slot) = counts.get_mut(*feature) {
                        *slot += 1;
                    }
                }
            }
        }
        counts
    }

    pub fn max_depth(&self) -> usize {
        self.trees.iter().map(Tree::depth).max().unwrap_or(0)
    }
}
