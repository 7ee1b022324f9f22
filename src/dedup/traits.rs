use super::knn::NeighborTable;
use crate::error::Result;

/// Common interface for nearest-neighbor backends.
pub trait NeighborStrategy {
    /// Find up to `k` nearest neighbors of every row, sorted by ascending distance.
    ///
    /// A row's own index may appear in its neighbor list at distance 0.
    fn find_neighbors(&self, vectors: &[Vec<f32>]) -> Result<NeighborTable>;

    /// Short backend name used in log output.
    fn name(&self) -> &'static str;
}

/// Common interface for duplicate-threshold heuristics.
pub trait ThresholdStrategy {
    /// Given ascending, strictly positive distances, return the largest distance at
    /// which two points still count as duplicates.
    fn compute(&self, distances: &[f32]) -> Result<f32>;
}
