//! CART classification tree builder
//!
//! Exact-greedy binary splits scored with integer Gini impurity. Feature
//! values are the fixed-point output of the preprocessor; thresholds are
//! midpoints between consecutive distinct values and rows go left when
//! `value <= threshold`. Leaves store the class-1 fraction of the samples
//! that reached them.

use practicas_ai_core::fixed;
use practicas_ai_core::forest::{Node, Tree};
use practicas_ai_core::FixedRow;
use practicas_ai_core::SCALE;

use crate::deterministic::{LcgRng, SplitTieBreaker};

/// Growth limits for a single tree
#[derive(Clone, Debug)]
pub struct TreeConfig {
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features drawn at each node
    pub max_features: usize,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_depth: 10,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: 1,
        }
    }
}

/// Split candidate with score and tie-breaker
#[derive(Debug, Clone)]
struct SplitCandidate {
    feature_idx: usize,
    threshold: i64,
    /// Sum over children of `(n0² + n1²) * SCALE / n`; higher is purer
    score: i128,
    tie_breaker: SplitTieBreaker,
}

impl SplitCandidate {
    fn new(feature_idx: usize, threshold: i64, score: i128) -> Self {
        Self {
            feature_idx,
            threshold,
            score,
            tie_breaker: SplitTieBreaker::new(feature_idx, threshold),
        }
    }

    fn beats(&self, other: &SplitCandidate) -> bool {
        self.score > other.score
            || (self.score == other.score && self.tie_breaker < other.tie_breaker)
    }
}

/// `(n0² + n1²) * SCALE / n`, the complement of Gini impurity weighted by `n`
fn purity(n0: usize, n1: usize) -> i128 {
    let n = (n0 + n1) as i128;
    if n == 0 {
        return 0;
    }
    let (a, b) = (n0 as i128, n1 as i128);
    (a * a + b * b) * SCALE as i128 / n
}

/// Build classification trees over one transformed training matrix
pub struct CartBuilder<'a> {
    rows: &'a [FixedRow],
    /// Class index per row
    classes: &'a [usize],
    config: TreeConfig,
    feature_count: usize,
}

impl<'a> CartBuilder<'a> {
    pub fn new(rows: &'a [FixedRow], classes: &'a [usize], config: TreeConfig) -> Self {
        let feature_count = rows.first().map_or(0, Vec::len);
        Self {
            rows,
            classes,
            config,
            feature_count,
        }
    }

    /// Grow one tree over `sample` (row indices, duplicates allowed)
    pub fn build(&self, sample: &[usize], rng: &mut LcgRng) -> Tree {
        let mut nodes = Vec::new();
        self.build_node(sample, 0, &mut nodes, rng);
        Tree::new(nodes)
    }

    fn class_counts(&self, indices: &[usize]) -> (usize, usize) {
        let positives = indices.iter().filter(|&&i| self.classes[i] == 1).count();
        (indices.len() - positives, positives)
    }

    fn push_leaf(nodes: &mut Vec<Node>, n0: usize, n1: usize) -> usize {
        let idx = nodes.len();
        let samples = n0 + n1;
        nodes.push(Node::Leaf {
            value: fixed::ratio(n1 as i64, samples as i64),
            samples: u32::try_from(samples).unwrap_or(u32::MAX),
        });
        idx
    }

    /// Recursively build tree nodes; children are always pushed after their parent
    fn build_node(
        &self,
        indices: &[usize],
        depth: usize,
        nodes: &mut Vec<Node>,
        rng: &mut LcgRng,
    ) -> usize {
        let (n0, n1) = self.class_counts(indices);

        if depth >= self.config.max_depth
            || indices.len() < self.config.min_samples_split
            || indices.len() < 2 * self.config.min_samples_leaf
            || n0 == 0
            || n1 == 0
        {
            return Self::push_leaf(nodes, n0, n1);
        }

        let features = rng.sample_indices(self.feature_count, self.config.max_features);
        let split = match self.find_best_split(indices, &features) {
            Some(split) if split.score > purity(n0, n1) => split,
            _ => return Self::push_leaf(nodes, n0, n1),
        };

        let (left, right): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&i| self.rows[i][split.feature_idx] <= split.threshold);

        let current = nodes.len();
        nodes.push(Node::Split {
            feature: split.feature_idx,
            threshold: split.threshold,
            left: 0,
            right: 0,
        });

        let left_idx = self.build_node(&left, depth + 1, nodes, rng);
        let right_idx = self.build_node(&right, depth + 1, nodes, rng);

        if let Node::Split { left, right, .. } = &mut nodes[current] {
            *left = left_idx;
            *right = right_idx;
        }
        current
    }

    /// Best split over the drawn features, sweeping each sorted column once
    fn find_best_split(&self, indices: &[usize], features: &[usize]) -> Option<SplitCandidate> {
        let total = self.class_counts(indices);
        let min_leaf = self.config.min_samples_leaf;
        let mut best: Option<SplitCandidate> = None;

        for &feature_idx in features {
            let mut column: Vec<(i64, usize)> = indices
                .iter()
                .map(|&i| (self.rows[i][feature_idx], self.classes[i]))
                .collect();
            column.sort_unstable();

            let mut left = (0usize, 0usize);
            for pos in 0..column.len() - 1 {
                let (value, class) = column[pos];
                if class == 1 {
                    left.1 += 1;
                } else {
                    left.0 += 1;
                }

                let next = column[pos + 1].0;
                if value == next {
                    continue;
                }
                let n_left = pos + 1;
                let n_right = column.len() - n_left;
                if n_left < min_leaf || n_right < min_leaf {
                    continue;
                }

                let right = (total.0 - left.0, total.1 - left.1);
                let score = purity(left.0, left.1) + purity(right.0, right.1);
                // floor midpoint stays in [value, next)
                let threshold = ((value as i128 + next as i128).div_euclid(2)) as i64;
                let candidate = SplitCandidate::new(feature_idx, threshold, score);

                if best.as_ref().map_or(true, |current| candidate.beats(current)) {
                    best = Some(candidate);
                }
            }
        }

        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(max_features: usize) -> TreeConfig {
        TreeConfig {
            max_depth: 4,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features,
        }
    }

    #[test]
    fn test_separable_feature_gives_pure_leaves() {
        let rows = vec![
            vec![0, 700_000],
            vec![250_000, 100_000],
            vec![750_000, 300_000],
            vec![SCALE, 900_000],
        ];
        let classes = vec![0, 0, 1, 1];
        let builder = CartBuilder::new(&rows, &classes, config(2));
        let mut rng = LcgRng::new(1);
        let tree = builder.build(&[0, 1, 2, 3], &mut rng);

        tree.validate(2).unwrap();
        assert_eq!(
            tree.nodes[0],
            Node::Split {
                feature: 0,
                threshold: 500_000,
                left: 1,
                right: 2
            }
        );
        assert_eq!(tree.evaluate(&[100_000, 0]), Some(0));
        assert_eq!(tree.evaluate(&[900_000, 0]), Some(SCALE));
    }

    #[test]
    fn test_pure_node_is_a_leaf() {
        let rows = vec![vec![0], vec![SCALE]];
        let classes = vec![1, 1];
        let builder = CartBuilder::new(&rows, &classes, config(1));
        let tree = builder.build(&[0, 1], &mut LcgRng::new(9));

        assert_eq!(tree.nodes.len(), 1);
        assert_eq!(tree.evaluate(&[0]), Some(SCALE));
    }

    #[test]
    fn test_constant_feature_gives_fraction_leaf() {
        let rows = vec![vec![5], vec![5], vec![5]];
        let classes = vec![0, 1, 1];
        let builder = CartBuilder::new(&rows, &classes, config(1));
        let tree = builder.build(&[0, 1, 2], &mut LcgRng::new(9));

        assert_eq!(
            tree.nodes,
            vec![Node::Leaf {
                value: 666_667,
                samples: 3
            }]
        );
    }

    #[test]
    fn test_min_samples_leaf_is_respected() {
        let rows: Vec<FixedRow> = (0..6).map(|i| vec![i * 100_000]).collect();
        let classes = vec![0, 1, 1, 1, 1, 1];
        let builder = CartBuilder::new(
            &rows,
            &classes,
            TreeConfig {
                min_samples_leaf: 2,
                ..config(1)
            },
        );
        let tree = builder.build(&[0, 1, 2, 3, 4, 5], &mut LcgRng::new(2));

        for node in &tree.nodes {
            if let Node::Leaf { samples, .. } = node {
                assert!(*samples >= 2);
            }
        }
    }

    #[test]
    fn test_depth_limit() {
        let rows: Vec<FixedRow> = (0..16).map(|i| vec![i * 10_000]).collect();
        let classes: Vec<usize> = (0..16).map(|i| i % 2).collect();
        let builder = CartBuilder::new(
            &rows,
            &classes,
            TreeConfig {
                max_depth: 2,
                ..config(1)
            },
        );
        let sample: Vec<usize> = (0..16).collect();
        let tree = builder.build(&sample, &mut LcgRng::new(5));
        assert!(tree.depth() <= 2);
    }
}
