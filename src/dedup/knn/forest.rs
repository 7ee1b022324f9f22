//! Random-projection forest (Annoy-style).
//!
//! Each tree splits its points recursively on the perpendicular bisector of two
//! randomly chosen members until a node holds at most `max(k, 2)` points. A query
//! walks all trees at once with a single best-first priority queue ordered by the
//! signed margin to each split, collects `n_trees * k` candidates, and ranks them
//! by exact distance.
//!
//! More trees give better recall at the cost of build time and memory.
//!
//! # References
//!
//! Bernhardsson, E. "Annoy: Approximate Nearest Neighbors Oh Yeah".
//! `https://github.com/spotify/annoy`

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use rand::prelude::*;
use serde::{Deserialize, Serialize};

use super::{check_input, validate_k, NeighborTable, DEFAULT_NEIGHBORS, DEFAULT_SEED, DEFAULT_TREES};
use crate::dedup::traits::NeighborStrategy;
use crate::dedup::util::{dot, euclidean};
use crate::error::{Error, Result};

const SPLIT_ATTEMPTS: usize = 5;

/// Tree-ensemble nearest-neighbor backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KnnForest {
    k: usize,
    n_trees: usize,
    seed: u64,
}

impl Default for KnnForest {
    fn default() -> Self {
        Self {
            k: DEFAULT_NEIGHBORS,
            n_trees: DEFAULT_TREES,
            seed: DEFAULT_SEED,
        }
    }
}

impl KnnForest {
    /// Create a forest backend with default parameters (`k = 10`, 30 trees, seed 0).
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of neighbors per point.
    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    /// Set the number of trees.
    pub fn with_trees(mut self, n_trees: usize) -> Self {
        self.n_trees = n_trees;
        self
    }

    /// Set the RNG seed used to build the trees.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Neighbors per point.
    pub fn k(&self) -> usize {
        self.k
    }

    /// Number of trees.
    pub fn n_trees(&self) -> usize {
        self.n_trees
    }

    /// RNG seed.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub(crate) fn validate(&self) -> Result<()> {
        validate_k(self.k)?;
        if self.n_trees == 0 {
            return Err(Error::InvalidParameter {
                name: "n_trees",
                message: "must be at least 1",
            });
        }
        Ok(())
    }
}

impl NeighborStrategy for KnnForest {
    fn find_neighbors(&self, vectors: &[Vec<f32>]) -> Result<NeighborTable> {
        self.validate()?;
        let (n, d, k) = check_input(vectors, self.k)?;

        let mut forest = Forest::new(d, k.max(2));
        for v in vectors {
            forest.add_item(v);
        }
        tracing::debug!(items = n, dimension = d, "inserted items into forest");

        let mut rng = StdRng::seed_from_u64(self.seed);
        forest.build(self.n_trees, &mut rng);
        tracing::debug!(trees = self.n_trees, nodes = forest.nodes.len(), "built forest");

        let search_k = self.n_trees * k;
        let mut visited = Visited::new(n);
        let mut indices = Vec::with_capacity(n * k);
        let mut distances = Vec::with_capacity(n * k);
        for i in 0..n {
            for (j, dist) in forest.nearest(i, k, search_k, &mut visited) {
                indices.push(j);
                distances.push(dist);
            }
        }

        NeighborTable::from_flat(k, indices, distances)
    }

    fn name(&self) -> &'static str {
        "forest"
    }
}

enum Node {
    Split {
        normal: Vec<f32>,
        offset: f32,
        left: usize,
        right: usize,
    },
    Leaf(Vec<usize>),
}

struct Forest {
    dimension: usize,
    leaf_size: usize,
    data: Vec<f32>,
    num_items: usize,
    nodes: Vec<Node>,
    roots: Vec<usize>,
}

impl Forest {
    fn new(dimension: usize, leaf_size: usize) -> Self {
        Self {
            dimension,
            leaf_size,
            data: Vec::new(),
            num_items: 0,
            nodes: Vec::new(),
            roots: Vec::new(),
        }
    }

    fn add_item(&mut self, v: &[f32]) {
        self.data.extend_from_slice(v);
        self.num_items += 1;
    }

    #[inline]
    fn item(&self, i: usize) -> &[f32] {
        &self.data[i * self.dimension..(i + 1) * self.dimension]
    }

    fn build(&mut self, n_trees: usize, rng: &mut StdRng) {
        let all: Vec<usize> = (0..self.num_items).collect();
        for _ in 0..n_trees {
            let root = self.build_node(all.clone(), rng);
            self.roots.push(root);
        }
    }

    fn build_node(&mut self, mut items: Vec<usize>, rng: &mut StdRng) -> usize {
        if items.len() <= self.leaf_size {
            self.nodes.push(Node::Leaf(items));
            return self.nodes.len() - 1;
        }

        let (normal, offset, left_items, right_items) = match self.hyperplane(&items, rng) {
            Some((normal, offset)) => {
                let (l, r): (Vec<usize>, Vec<usize>) = items
                    .iter()
                    .copied()
                    .partition(|&i| dot(&normal, self.item(i)) - offset > 0.0);
                (normal, offset, l, r)
            }
            None => {
                // All sampled pairs coincide: halve at random. A zero normal gives
                // margin 0 at query time, so both halves stay reachable.
                items.shuffle(rng);
                let right = items.split_off(items.len() / 2);
                (vec![0.0; self.dimension], 0.0, items, right)
            }
        };

        let left = self.build_node(left_items, rng);
        let right = self.build_node(right_items, rng);
        self.nodes.push(Node::Split {
            normal,
            offset,
            left,
            right,
        });
        self.nodes.len() - 1
    }

    /// A unit-normal bisector between two random members that splits `items`
    /// into two non-empty sides.
    fn hyperplane(&self, items: &[usize], rng: &mut StdRng) -> Option<(Vec<f32>, f32)> {
        for _ in 0..SPLIT_ATTEMPTS {
            let a = items[rng.random_range(0..items.len())];
            let b = items[rng.random_range(0..items.len())];
            if a == b {
                continue;
            }
            let (va, vb) = (self.item(a), self.item(b));
            let mut normal: Vec<f32> = va.iter().zip(vb.iter()).map(|(x, y)| x - y).collect();
            let norm = normal.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm <= f32::EPSILON {
                continue;
            }
            for x in &mut normal {
                *x /= norm;
            }
            let midpoint: Vec<f32> = va.iter().zip(vb.iter()).map(|(x, y)| 0.5 * (x + y)).collect();
            let offset = dot(&normal, &midpoint);

            let left = items
                .iter()
                .filter(|&&i| dot(&normal, self.item(i)) - offset > 0.0)
                .count();
            if left > 0 && left < items.len() {
                return Some((normal, offset));
            }
        }
        None
    }

    /// The `k` nearest items to item `query`, ascending by distance.
    fn nearest(
        &self,
        query: usize,
        k: usize,
        search_k: usize,
        visited: &mut Visited,
    ) -> Vec<(usize, f32)> {
        let q = self.item(query);
        let mut heap: BinaryHeap<Probe> = self
            .roots
            .iter()
            .map(|&node| Probe {
                priority: f32::INFINITY,
                node,
            })
            .collect();

        visited.clear();
        let mut candidates: Vec<usize> = Vec::with_capacity(search_k);

        while candidates.len() < search_k {
            let Some(Probe { priority, node }) = heap.pop() else {
                break;
            };
            match &self.nodes[node] {
                Node::Leaf(items) => {
                    for &i in items {
                        if visited.insert(i) {
                            candidates.push(i);
                        }
                    }
                }
                Node::Split {
                    normal,
                    offset,
                    left,
                    right,
                } => {
                    let margin = dot(normal, q) - offset;
                    heap.push(Probe {
                        priority: priority.min(margin),
                        node: *left,
                    });
                    heap.push(Probe {
                        priority: priority.min(-margin),
                        node: *right,
                    });
                }
            }
        }

        let mut scored: Vec<(usize, f32)> = candidates
            .into_iter()
            .map(|i| (i, euclidean(q, self.item(i))))
            .collect();
        scored.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        scored.truncate(k);
        scored
    }
}

/// Per-query membership set over item ids, cleared in O(1) by bumping a stamp.
struct Visited {
    stamps: Vec<u32>,
    generation: u32,
}

impl Visited {
    fn new(num_items: usize) -> Self {
        Self {
            stamps: vec![0; num_items],
            generation: 0,
        }
    }

    fn clear(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        if self.generation == 0 {
            // Wrapped: stale stamps could collide with the new generation.
            self.stamps.fill(0);
            self.generation = 1;
        }
    }

    /// Returns `true` if `i` was not yet visited in this generation.
    fn insert(&mut self, i: usize) -> bool {
        if self.stamps[i] == self.generation {
            return false;
        }
        self.stamps[i] = self.generation;
        true
    }
}

struct Probe {
    priority: f32,
    node: usize,
}

impl PartialEq for Probe {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Probe {}

impl PartialOrd for Probe {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Probe {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .total_cmp(&other.priority)
            .then_with(|| other.node.cmp(&self.node))
    }
}
