//! Random forest classifier for the two-class outcome models
//!
//! Inference is integer-only: the transformed row, every split threshold and
//! every leaf value are fixed-point at [`SCALE`](crate::fixed::SCALE), and
//! the per-tree class-1 fractions are averaged with `i128` accumulation. The
//! same artifact therefore yields bit-identical probabilities everywhere.
//!
//! Serialized form (inside the artifact's canonical JSON):
//!
//! ```json
//! {
//!   "n_features": 33,
//!   "trees": [
//!     {"nodes": [
//!       {"type":"split","feature":3,"threshold":500000,"left":1,"right":2},
//!       {"type":"leaf","value":250000,"samples":4},
//!       {"type":"leaf","value":1000000,"samples":3}
//!     ]}
//!   ],
//!   "version": 1
//! }
//! ```

pub mod model;
pub mod tree;

pub use model::{ClassScores, RandomForest, FOREST_VERSION};
pub use tree::{Node, Tree};
