//! Near-duplicate detection for embedding vectors.
//!
//! `doppel` finds groups of samples whose embeddings are nearly identical. It is
//! meant for dataset introspection: duplicated images, repeated text chunks,
//! near-copies that leak between train and test splits.
//!
//! The primary public API is under [`dedup`], which provides:
//! - approximate kNN backends (random-projection forest, inverted file)
//! - distance thresholds (elbow/slope, percentile)
//! - transitive merge of overlapping neighbor sets
//! - per-group descriptors and the [`Duplicates`] engine
//!
//! Input arrives through a [`Producer`] of [`Batch`]es (see [`batch`]).

#![forbid(unsafe_code)]

pub mod batch;
pub mod dedup;
pub mod error;

pub use batch::{accumulate_batches, Batch, BatchView, Producer};
pub use dedup::{
    combine_clusters, normalize_columns, DuplicateSetCandidate, Duplicates, DuplicatesConfig,
    KnnForest, KnnIvf, KnnStrategy, NeighborStrategy, NeighborTable, Percentile, Slope, Threshold,
    ThresholdStrategy,
};
pub use error::{Error, Result};
