//! Held-out evaluation metrics for the two-class models

use serde::{Deserialize, Serialize};

use crate::label::Evaluation;

/// 2x2 confusion matrix, `counts[truth][predicted]` by class index
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub counts: [[u32; 2]; 2],
}

impl ConfusionMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a Evaluation, &'a Evaluation)>) -> Self {
        let mut cm = Self::new();
        for (truth, predicted) in pairs {
            cm.add(*truth, *predicted);
        }
        cm
    }

    pub fn add(&mut self, truth: Evaluation, predicted: Evaluation) {
        let slot = &mut self.counts[truth.class_index()][predicted.class_index()];
        *slot = slot.saturating_add(1);
    }

    pub fn get(&self, truth: Evaluation, predicted: Evaluation) -> u32 {
        self.counts[truth.class_index()][predicted.class_index()]
    }

    pub fn total(&self) -> u32 {
        self.counts.iter().flatten().sum()
    }

    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        (self.counts[0][0] + self.counts[1][1]) as f64 / total as f64
    }

    /// Precision, recall and F1 treating `positive` as the positive class
    pub fn class_stats(&self, positive: Evaluation) -> ClassStats {
        let p = positive.class_index();
        let n = 1 - p;
        let tp = self.counts[p][p] as f64;
        let fp = self.counts[n][p] as f64;
        let fn_ = self.counts[p][n] as f64;

        let precision = if tp + fp == 0.0 { 0.0 } else { tp / (tp + fp) };
        let recall = if tp + fn_ == 0.0 { 0.0 } else { tp / (tp + fn_) };
        let f1 = if precision + recall == 0.0 {
            0.0
        } else {
            2.0 * precision * recall / (precision + recall)
        };

        ClassStats {
            precision,
            recall,
            f1,
            support: self.counts[p][0] + self.counts[p][1],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassStats {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: u32,
}

/// Snapshot stored with each artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationMetrics {
    pub accuracy: f64,
    /// F1 of `Positiva`
    pub f1: f64,
    pub precision: f64,
    pub recall: f64,
    pub confusion: ConfusionMatrix,
}

impl EvaluationMetrics {
    pub fn from_confusion(confusion: ConfusionMatrix) -> Self {
        let stats = confusion.class_stats(Evaluation::Positive);
        Self {
            accuracy: confusion.accuracy(),
            f1: stats.f1,
            precision: stats.precision,
            recall: stats.recall,
            confusion,
        }
    }

    pub fn evaluate(truth: &[Evaluation], predicted: &[Evaluation]) -> Self {
        Self::from_confusion(ConfusionMatrix::from_pairs(truth.iter().zip(predicted)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use Evaluation::{Improvable as I, Positive as P};

    #[test]
    fn test_accuracy_and_f1() {
        let truth = [P, P, P, I, I];
        let predicted = [P, P, I, P, I];
        let metrics = EvaluationMetrics::evaluate(&truth, &predicted);

        assert_eq!(metrics.confusion.get(P, P), 2);
        assert_eq!(metrics.confusion.get(P, I), 1);
        assert_eq!(metrics.confusion.get(I, P), 1);
        assert!((metrics.accuracy - 0.6).abs() < 1e-12);
        assert!((metrics.precision - 2.0 / 3.0).abs() < 1e-12);
        assert!((metrics.recall - 2.0 / 3.0).abs() < 1e-12);
        assert!((metrics.f1 - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_no_positive_predictions() {
        let metrics = EvaluationMetrics::evaluate(&[P, I], &[I, I]);
        assert_eq!(metrics.f1, 0.0);
        assert_eq!(metrics.accuracy, 0.5);
        assert_eq!(ConfusionMatrix::new().accuracy(), 0.0);
    }
}
