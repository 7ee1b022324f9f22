//! Near-duplicate detection over embedding vectors.
//!
//! ## Pipeline
//!
//! For every named vector source of a producer:
//!
//! 1. **Normalize** each column to unit L2 norm so no single dimension
//!    dominates the distance.
//! 2. **Neighbors**: an approximate kNN backend ([`KnnForest`] or [`KnnIvf`])
//!    returns the `k` closest points of every point.
//! 3. **Threshold**: the sorted, non-zero neighbor distances go through a
//!    [`ThresholdStrategy`] ([`Slope`] or [`Percentile`]) which picks the
//!    distance separating "duplicate" from "merely nearby".
//! 4. **Local sets**: each point keeps the neighbors within the threshold.
//! 5. **Merge**: overlapping local sets are merged transitively into disjoint
//!    groups ([`combine_clusters`]).
//! 6. **Describe**: each group gets centroid-distance statistics, a member
//!    ordering along its first principal component, and (for larger groups) a
//!    2D projection ([`DuplicateSetCandidate`]).
//!
//! ## Choosing a threshold
//!
//! The sorted distances of a typical dataset rise steeply, bend, then run out
//! along a long tail. [`Slope`] finds the bend without any knowledge of the
//! distance scale. [`Percentile`] is useful when the expected duplicate rate is
//! known.
//!
//! ## Cost
//!
//! Runtime is linear in both the number of samples and the dimension. Reducing
//! dimensionality upstream (to ~40) still gives good groups.
//!
//! ## Usage
//!
//! ```rust
//! use doppel::{Batch, Duplicates, DuplicatesConfig};
//!
//! let mut rows: Vec<Vec<f32>> = (0..60)
//!     .map(|i| {
//!         let t = i as f32;
//!         vec![(t * 0.37).sin() + 2.0, (t * 1.91).cos() + 2.0, (t * 0.53).sin() + 2.0]
//!     })
//!     .collect();
//! rows.push(rows[7].clone());
//!
//! let batch = Batch::new().with_field("embedding", rows).unwrap();
//! let dups = Duplicates::introspect(&batch, 16, &DuplicatesConfig::default()).unwrap();
//!
//! assert_eq!(dups.count(), 61);
//! for group in dups.get("embedding").unwrap() {
//!     assert!(group.size() > 1);
//! }
//! ```

mod candidate;
mod engine;
pub mod knn;
mod merge;
mod normalize;
mod pca;
mod threshold;
mod traits;
mod util;

pub use candidate::{DuplicateSetCandidate, ORDER_MIN_SIZE, PROJECTION_MIN_SIZE};
pub use engine::{Duplicates, DuplicatesConfig, DEFAULT_BATCH_SIZE};
pub use knn::{KnnForest, KnnIvf, KnnStrategy, NeighborTable};
pub use merge::combine_clusters;
pub use normalize::normalize_columns;
pub use threshold::{Percentile, Slope, Threshold, DEFAULT_SENSITIVITY};
pub use traits::{NeighborStrategy, ThresholdStrategy};
