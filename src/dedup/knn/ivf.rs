//! Inverted-file (IVF) index with a single batched query.
//!
//! Build: k-means (k-means++ seeding) partitions the vectors into `nlist` inverted
//! lists. Query: for every point, rank the centroids, scan the `nprobe` closest
//! lists (more if they hold fewer than `k` vectors), and rank the members by exact
//! distance.
//!
//! All N queries are issued as one batch and run on the `rayon` pool. Rows are
//! independent, so the output does not depend on scheduling.

use rand::prelude::*;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::{check_input, validate_k, NeighborTable, DEFAULT_NEIGHBORS, DEFAULT_SEED};
use crate::dedup::traits::NeighborStrategy;
use crate::dedup::util::{euclidean, squared_euclidean};
use crate::error::{Error, Result};

/// Default number of inverted lists probed per query.
pub const DEFAULT_NPROBE: usize = 8;

const KMEANS_ITERS: usize = 25;

/// Inverted-file nearest-neighbor backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KnnIvf {
    k: usize,
    nlist: Option<usize>,
    nprobe: usize,
    seed: u64,
}

impl Default for KnnIvf {
    fn default() -> Self {
        Self {
            k: DEFAULT_NEIGHBORS,
            nlist: None,
            nprobe: DEFAULT_NPROBE,
            seed: DEFAULT_SEED,
        }
    }
}

impl KnnIvf {
    /// Create an IVF backend with default parameters.
    ///
    /// `nlist` defaults to `round(sqrt(N))` at query time.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of neighbors per point.
    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    /// Fix the number of inverted lists.
    pub fn with_nlist(mut self, nlist: usize) -> Self {
        self.nlist = Some(nlist);
        self
    }

    /// Set the number of lists probed per query.
    pub fn with_nprobe(mut self, nprobe: usize) -> Self {
        self.nprobe = nprobe;
        self
    }

    /// Set the k-means seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Neighbors per point.
    pub fn k(&self) -> usize {
        self.k
    }

    pub(crate) fn validate(&self) -> Result<()> {
        validate_k(self.k)?;
        if self.nlist == Some(0) {
            return Err(Error::InvalidParameter {
                name: "nlist",
                message: "must be at least 1",
            });
        }
        if self.nprobe == 0 {
            return Err(Error::InvalidParameter {
                name: "nprobe",
                message: "must be at least 1",
            });
        }
        Ok(())
    }
}

impl NeighborStrategy for KnnIvf {
    fn find_neighbors(&self, vectors: &[Vec<f32>]) -> Result<NeighborTable> {
        self.validate()?;
        let (n, d, k) = check_input(vectors, self.k)?;

        let nlist = self
            .nlist
            .unwrap_or_else(|| (n as f64).sqrt().round() as usize)
            .clamp(1, n);
        let nprobe = self.nprobe.min(nlist);

        let centroids = kmeans(vectors, nlist, self.seed);
        let mut lists: Vec<Vec<usize>> = vec![Vec::new(); centroids.len()];
        for (i, v) in vectors.iter().enumerate() {
            lists[nearest_centroid(v, &centroids)].push(i);
        }
        tracing::debug!(
            items = n,
            dimension = d,
            nlist = centroids.len(),
            nprobe,
            "built inverted lists"
        );

        let rows: Vec<Vec<(usize, f32)>> = vectors
            .par_iter()
            .map(|q| search(q, vectors, &centroids, &lists, k, nprobe))
            .collect();

        let mut indices = Vec::with_capacity(n * k);
        let mut distances = Vec::with_capacity(n * k);
        for row in rows {
            for (j, dist) in row {
                indices.push(j);
                distances.push(dist);
            }
        }
        NeighborTable::from_flat(k, indices, distances)
    }

    fn name(&self) -> &'static str {
        "ivf"
    }
}

fn search(
    q: &[f32],
    vectors: &[Vec<f32>],
    centroids: &[Vec<f32>],
    lists: &[Vec<usize>],
    k: usize,
    nprobe: usize,
) -> Vec<(usize, f32)> {
    let mut order: Vec<(usize, f32)> = centroids
        .iter()
        .enumerate()
        .map(|(c, centroid)| (c, squared_euclidean(q, centroid)))
        .collect();
    order.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));

    let mut scored: Vec<(usize, f32)> = Vec::new();
    for (probed, &(c, _)) in order.iter().enumerate() {
        if probed >= nprobe && scored.len() >= k {
            break;
        }
        scored.extend(lists[c].iter().map(|&j| (j, euclidean(q, &vectors[j]))));
    }

    scored.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
    scored.truncate(k);
    scored
}

fn nearest_centroid(v: &[f32], centroids: &[Vec<f32>]) -> usize {
    let mut best = 0;
    let mut best_dist = f32::INFINITY;
    for (c, centroid) in centroids.iter().enumerate() {
        let dist = squared_euclidean(v, centroid);
        if dist < best_dist {
            best_dist = dist;
            best = c;
        }
    }
    best
}

/// Lloyd iterations from a k-means++ start. Empty clusters keep their centroid.
fn kmeans(vectors: &[Vec<f32>], k: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let n = vectors.len();
    let d = vectors[0].len();

    // k-means++ seeding: sample proportional to squared distance to the nearest centroid.
    let mut centroids: Vec<Vec<f32>> = Vec::with_capacity(k);
    centroids.push(vectors[rng.random_range(0..n)].clone());
    let mut min_dist: Vec<f32> = vectors
        .iter()
        .map(|v| squared_euclidean(v, &centroids[0]))
        .collect();
    while centroids.len() < k {
        let total: f64 = min_dist.iter().map(|&x| f64::from(x)).sum();
        if total <= 0.0 {
            // Fewer distinct points than lists.
            break;
        }
        let target = rng.random::<f64>() * total;
        let mut cumulative = 0.0;
        let mut pick = n - 1;
        for (i, &dist) in min_dist.iter().enumerate() {
            cumulative += f64::from(dist);
            if cumulative >= target && dist > 0.0 {
                pick = i;
                break;
            }
        }
        let c = vectors[pick].clone();
        for (m, v) in min_dist.iter_mut().zip(vectors) {
            *m = m.min(squared_euclidean(v, &c));
        }
        centroids.push(c);
    }

    for _ in 0..KMEANS_ITERS {
        let mut sums = vec![vec![0.0f32; d]; centroids.len()];
        let mut counts = vec![0usize; centroids.len()];
        for v in vectors {
            let c = nearest_centroid(v, &centroids);
            counts[c] += 1;
            for (acc, &x) in sums[c].iter_mut().zip(v.iter()) {
                *acc += x;
            }
        }

        let mut moved = false;
        for ((centroid, sum), &count) in centroids.iter_mut().zip(sums).zip(counts.iter()) {
            if count == 0 {
                continue;
            }
            let next: Vec<f32> = sum.into_iter().map(|x| x / count as f32).collect();
            if squared_euclidean(centroid, &next) > 1e-12 {
                moved = true;
            }
            *centroid = next;
        }
        if !moved {
            break;
        }
    }
    centroids
}

#[cfg(test)]
mod tests {
    use super::*;

    fn random_data(n: usize, d: usize, seed: u64) -> Vec<Vec<f32>> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n)
            .map(|_| (0..d).map(|_| rng.random::<f32>()).collect())
            .collect()
    }

    fn brute_force_nn(data: &[Vec<f32>], i: usize) -> f32 {
        data.iter()
            .enumerate()
            .filter(|&(j, _)| j != i)
            .map(|(_, v)| euclidean(&data[i], v))
            .fold(f32::INFINITY, f32::min)
    }

    #[test]
    fn probing_every_list_is_exact() {
        let data = random_data(200, 6, 1);
        let table = KnnIvf::new()
            .with_k(3)
            .with_nlist(10)
            .with_nprobe(10)
            .find_neighbors(&data)
            .unwrap();
        for i in 0..data.len() {
            assert_eq!(table.indices(i)[0], i);
            assert!((table.distances(i)[1] - brute_force_nn(&data, i)).abs() < 1e-6);
        }
    }

    #[test]
    fn rows_are_full_even_with_tiny_lists() {
        // 50 lists over 60 points: most lists hold one or two vectors.
        let data = random_data(60, 4, 2);
        let table = KnnIvf::new()
            .with_k(10)
            .with_nlist(50)
            .with_nprobe(1)
            .find_neighbors(&data)
            .unwrap();
        assert_eq!(table.len(), 60);
        for i in 0..60 {
            assert!(table.distances(i).windows(2).all(|w| w[0] <= w[1]));
        }
    }

    #[test]
    fn batched_query_is_deterministic() {
        let data = random_data(500, 8, 3);
        let a = KnnIvf::new().with_seed(11).find_neighbors(&data).unwrap();
        let b = KnnIvf::new().with_seed(11).find_neighbors(&data).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn identical_points() {
        let data = vec![vec![0.5, 0.5]; 20];
        let table = KnnIvf::new().with_k(4).find_neighbors(&data).unwrap();
        assert!(table.all_distances().iter().all(|&d| d == 0.0));
    }

    #[test]
    fn invalid_parameters() {
        let data = random_data(10, 2, 4);
        assert!(KnnIvf::new().with_nprobe(0).find_neighbors(&data).is_err());
        assert!(KnnIvf::new().with_nlist(0).find_neighbors(&data).is_err());
        assert!(KnnIvf::new().with_k(0).find_neighbors(&data).is_err());
    }
}
