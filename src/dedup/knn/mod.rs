//! Approximate k-nearest-neighbor backends.
//!
//! Both backends answer the same question: for every row of a matrix, which `k`
//! rows are closest (Euclidean), and how far away are they. Neither is exact.
//!
//! - [`KnnForest`]: a random-projection tree ensemble in the spirit of Annoy.
//!   Vectors are inserted one at a time and every point is queried on its own.
//!   Good default for up to a few hundred thousand points.
//! - [`KnnIvf`]: an inverted-file index. k-means partitions the data into lists,
//!   then one batched query probes the nearest lists for every point at once.
//!   Better when per-item queries dominate the cost.
//!
//! ## Choosing `k`
//!
//! `k = 10` is the validated default. Smaller `k` gives similar thresholds but
//! larger initial local sets; larger `k` costs more with little gain for
//! `k ∈ {2, 5, 10}`.

mod forest;
mod ivf;

pub use forest::KnnForest;
pub use ivf::{KnnIvf, DEFAULT_NPROBE};

use serde::{Deserialize, Serialize};

use super::traits::NeighborStrategy;
use super::util::validate_matrix;
use crate::error::{Error, Result};

/// Default number of neighbors per point.
pub const DEFAULT_NEIGHBORS: usize = 10;

/// Default number of trees for [`KnnForest`].
pub const DEFAULT_TREES: usize = 30;

/// Default seed for randomized index construction.
pub const DEFAULT_SEED: u64 = 0;

/// Neighbor lists for every point, `k` entries per row, ascending by distance.
///
/// Stored flat: row `i` occupies `[i * k, (i + 1) * k)` of both buffers.
#[derive(Debug, Clone, PartialEq)]
pub struct NeighborTable {
    k: usize,
    indices: Vec<usize>,
    distances: Vec<f32>,
}

impl NeighborTable {
    /// Build a table from flat row-major buffers.
    ///
    /// # Errors
    ///
    /// Returns an error if `k == 0` or the buffers do not hold whole rows of `k`.
    pub fn from_flat(k: usize, indices: Vec<usize>, distances: Vec<f32>) -> Result<Self> {
        if k == 0 {
            return Err(Error::InvalidParameter {
                name: "k",
                message: "must be at least 1",
            });
        }
        if indices.len() != distances.len() || indices.len() % k != 0 {
            return Err(Error::DimensionMismatch {
                expected: indices.len(),
                found: distances.len(),
            });
        }
        Ok(Self {
            k,
            indices,
            distances,
        })
    }

    /// Neighbors per row.
    pub fn k(&self) -> usize {
        self.k
    }

    /// Number of rows (points).
    pub fn len(&self) -> usize {
        self.indices.len() / self.k
    }

    /// Whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Neighbor indices of row `i`.
    pub fn indices(&self, i: usize) -> &[usize] {
        &self.indices[i * self.k..(i + 1) * self.k]
    }

    /// Neighbor distances of row `i`.
    pub fn distances(&self, i: usize) -> &[f32] {
        &self.distances[i * self.k..(i + 1) * self.k]
    }

    /// All distances, row-major.
    pub fn all_distances(&self) -> &[f32] {
        &self.distances
    }

    /// For every row, the neighbors at distance `<= threshold`.
    ///
    /// Rows with fewer than two such neighbors are dropped: a point that is only
    /// close to itself has no duplicate.
    pub fn local_sets(&self, threshold: f32) -> Vec<Vec<usize>> {
        (0..self.len())
            .filter_map(|i| {
                let set: Vec<usize> = self
                    .indices(i)
                    .iter()
                    .zip(self.distances(i))
                    .filter(|(_, &d)| d <= threshold)
                    .map(|(&j, _)| j)
                    .collect();
                (set.len() > 1).then_some(set)
            })
            .collect()
    }
}

/// Nearest-neighbor backend selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum KnnStrategy {
    /// See [`KnnForest`].
    Forest(KnnForest),
    /// See [`KnnIvf`].
    Ivf(KnnIvf),
}

impl Default for KnnStrategy {
    fn default() -> Self {
        Self::Forest(KnnForest::default())
    }
}

impl KnnStrategy {
    /// Check parameters without touching data.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] for out-of-range settings.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Forest(f) => f.validate(),
            Self::Ivf(i) => i.validate(),
        }
    }
}

impl From<KnnForest> for KnnStrategy {
    fn from(f: KnnForest) -> Self {
        Self::Forest(f)
    }
}

impl From<KnnIvf> for KnnStrategy {
    fn from(i: KnnIvf) -> Self {
        Self::Ivf(i)
    }
}

impl NeighborStrategy for KnnStrategy {
    fn find_neighbors(&self, vectors: &[Vec<f32>]) -> Result<NeighborTable> {
        match self {
            Self::Forest(f) => f.find_neighbors(vectors),
            Self::Ivf(i) => i.find_neighbors(vectors),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Forest(f) => f.name(),
            Self::Ivf(i) => i.name(),
        }
    }
}

/// Shared input checks; returns `(n, d, effective_k)`.
pub(crate) fn check_input(vectors: &[Vec<f32>], k: usize) -> Result<(usize, usize, usize)> {
    let n = vectors.len();
    if n < 2 {
        return Err(Error::TooFewSamples {
            required: 2,
            found: n,
        });
    }
    let d = validate_matrix(vectors)?;
    Ok((n, d, k.min(n)))
}

pub(crate) fn validate_k(k: usize) -> Result<()> {
    if k < 2 {
        return Err(Error::InvalidParameter {
            name: "k",
            message: "must be at least 2",
        });
    }
    Ok(())
}
