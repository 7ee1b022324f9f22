//! Per-cluster descriptors.

use std::sync::Arc;

use super::pca;
use super::util::{centroid, euclidean, mean_std};
use crate::batch::{Batch, BatchView};
use crate::error::{Error, Result};

/// Groups larger than this are re-ordered along their first principal component.
pub const ORDER_MIN_SIZE: usize = 3;

/// Groups larger than this get a 2D projection.
pub const PROJECTION_MIN_SIZE: usize = 6;

/// One group of candidate duplicates.
#[derive(Debug, Clone)]
pub struct DuplicateSetCandidate {
    /// Mean distance from each member to the group centroid.
    pub mean: f32,

    /// Population standard deviation of the distances to the centroid.
    pub std: f32,

    /// 2D projection of the members (for groups of more than 5), in `indices` order.
    pub projection: Option<Vec<[f32; 2]>>,

    /// Indices of the members in the original producer, ordered so that similar
    /// members sit next to each other.
    pub indices: Vec<usize>,

    /// The member samples.
    pub batch: BatchView,
}

impl DuplicateSetCandidate {
    /// Describe the group of `vectors` rows at `indices`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyInput`] for an empty group,
    /// [`Error::IndexOutOfRange`] if an index is out of range for `vectors` or
    /// `batch`, and [`Error::DimensionMismatch`] if the member rows differ in length.
    pub fn build(vectors: &[Vec<f32>], batch: &Arc<Batch>, indices: &[usize]) -> Result<Self> {
        if indices.is_empty() {
            return Err(Error::EmptyInput);
        }
        if let Some(&index) = indices.iter().find(|&&i| i >= vectors.len()) {
            return Err(Error::IndexOutOfRange {
                index,
                len: vectors.len(),
            });
        }
        let d = vectors[indices[0]].len();
        if let Some(row) = indices.iter().map(|&i| &vectors[i]).find(|r| r.len() != d) {
            return Err(Error::DimensionMismatch {
                expected: d,
                found: row.len(),
            });
        }

        let mut indices = indices.to_vec();
        let mut samples: Vec<&[f32]> = indices.iter().map(|&i| vectors[i].as_slice()).collect();
        let center = centroid(&samples);
        let distances: Vec<f32> = samples.iter().map(|s| euclidean(s, &center)).collect();

        if samples.len() >= ORDER_MIN_SIZE {
            let order = pca::project(&samples, 1);
            let mut ranked: Vec<(f32, usize)> = order
                .iter()
                .map(|s| s[0])
                .zip(indices.iter().copied())
                .collect();
            ranked.sort_by(|a, b| a.0.total_cmp(&b.0));
            indices = ranked.into_iter().map(|(_, i)| i).collect();
            samples = indices.iter().map(|&i| vectors[i].as_slice()).collect();
        }

        let projection = (samples.len() >= PROJECTION_MIN_SIZE).then(|| {
            pca::project(&samples, 2)
                .into_iter()
                .map(|s| [s[0], s[1]])
                .collect()
        });

        let (mean, std) = mean_std(&distances);
        Ok(Self {
            mean,
            std,
            projection,
            batch: BatchView::new(batch, indices.clone())?,
            indices,
        })
    }

    /// Number of members.
    pub fn size(&self) -> usize {
        self.indices.len()
    }
}
