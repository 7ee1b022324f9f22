//! Transitive merge of overlapping local duplicate sets.
//!
//! Every point contributes the neighbors it considers duplicates ("local set").
//! Local sets overlap: if `{5, 6}` and `{6, 9}` both appear, all three points are
//! one group. This module computes the transitive closure of the "shares an
//! index" relation incrementally with two maps:
//!
//! - `index -> cluster id`
//! - `cluster id -> members`
//!
//! When an incoming set touches existing clusters, everything is folded into the
//! lowest touched id and the other ids are removed. Every index maps to exactly
//! one live cluster id at all times.

use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Combine overlapping index sets into disjoint clusters.
///
/// Output clusters are ordered by the first input set that founded them, and each
/// cluster's members are sorted ascending. Taken as a set of sets, the result does
/// not depend on the order of `local_sets`.
///
/// ```
/// use doppel::dedup::combine_clusters;
///
/// let clusters = combine_clusters(&[vec![10, 11], vec![12, 13, 14], vec![5, 6], vec![6, 9]]);
/// assert_eq!(clusters, vec![vec![10, 11], vec![12, 13, 14], vec![5, 6, 9]]);
/// ```
pub fn combine_clusters(local_sets: &[Vec<usize>]) -> Vec<Vec<usize>> {
    let mut index_to_cluster: HashMap<usize, usize> = HashMap::new();
    let mut clusters: BTreeMap<usize, BTreeSet<usize>> = BTreeMap::new();
    let mut next_id = 0usize;

    for set in local_sets {
        if set.is_empty() {
            continue;
        }

        let overlap: BTreeSet<usize> = set
            .iter()
            .filter_map(|index| index_to_cluster.get(index).copied())
            .collect();

        let Some(&survivor) = overlap.first() else {
            let id = next_id;
            next_id += 1;
            for &index in set {
                index_to_cluster.insert(index, id);
            }
            clusters.insert(id, set.iter().copied().collect());
            continue;
        };

        let mut absorbed: Vec<usize> = set.clone();
        for &other in overlap.iter().skip(1) {
            if let Some(members) = clusters.remove(&other) {
                absorbed.extend(members);
            }
        }

        for &index in &absorbed {
            index_to_cluster.insert(index, survivor);
        }
        clusters.entry(survivor).or_default().extend(absorbed);
    }

    clusters
        .into_values()
        .map(|members| members.into_iter().collect())
        .collect()
}
