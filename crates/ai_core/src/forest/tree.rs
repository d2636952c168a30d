//! Classification tree nodes and traversal
//!
//! Thresholds and leaf values are fixed-point integers at `SCALE`. Leaves
//! hold the fraction of class-1 samples that reached them.

use serde::{Deserialize, Serialize};

use crate::fixed::SCALE;

/// A tree node stored in a flat arena; index 0 is the root
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Node {
    /// Go left when `row[feature] <= threshold`
    Split {
        feature: usize,
        threshold: i64,
        left: usize,
        right: usize,
    },
    Leaf {
        /// Class-1 fraction, fixed-point in `[0, SCALE]`
        value: i64,
        samples: u32,
    },
}

impl Node {
    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf { .. })
    }
}

/// A single fitted classification tree
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Tree {
    pub nodes: Vec<Node>,
}

impl Tree {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    /// Class-1 fraction of the leaf `row` lands in
    ///
    /// `None` only for structurally broken trees; `validate` rules those out.
    pub fn evaluate(&self, row: &[i64]) -> Option<i64> {
        let mut idx = 0usize;
        loop {
            match self.nodes.get(idx)? {
                Node::Leaf { value, .. } => return Some(*value),
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if *row.get(*feature)? <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    /// Structural checks: children point forward, features exist, leaves are probabilities
    pub fn validate(&self, n_features: usize) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".to_string());
        }

        for (i, node) in self.nodes.iter().enumerate() {
            match node {
                Node::Split {
                    feature,
                    left,
                    right,
                    ..
                } => {
                    if *feature >= n_features {
                        return Err(format!(
                            "node {i} splits on feature {feature}, only {n_features} exist"
                        ));
                    }
                    // children always come after their parent, which also rules out cycles
                    for child in [left, right] {
                        if *child <= i || *child >= self.nodes.len() {
                            return Err(format!("node {i} has invalid child {child}"));
                        }
                    }
                }
                Node::Leaf { value, .. } => {
                    if !(0..=SCALE).contains(value) {
                        return Err(format!("leaf {i} holds {value}, outside [0, {SCALE}]"));
                    }
                }
            }
        }

        Ok(())
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], idx: usize) -> usize {
            match nodes.get(idx) {
                Some(Node::Split { left, right, .. }) => {
                    1 + walk(nodes, *left).max(walk(nodes, *right))
                }
                _ => 0,
            }
        }
        walk(&self.nodes, 0)
    }

    pub fn leaf_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf()).count()
    }
}
