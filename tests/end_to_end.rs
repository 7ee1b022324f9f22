use std::collections::BTreeSet;

use doppel::{
    Batch, Duplicates, DuplicatesConfig, Error, KnnForest, KnnIvf, KnnStrategy, Percentile,
    Producer, Result, Slope, Threshold, ThresholdStrategy,
};
use rand::prelude::*;
use rand_distr::{Distribution, Normal};

const DIM: usize = 40;
const GROUPS: usize = 20;
const GROUP_SIZE: usize = 5;
const NOISE: usize = 900;

/// A fixed cutoff, for checking the rest of the pipeline in isolation.
struct Fixed(f32);

impl ThresholdStrategy for Fixed {
    fn compute(&self, _distances: &[f32]) -> Result<f32> {
        Ok(self.0)
    }
}

struct Planted {
    rows: Vec<Vec<f32>>,
    groups: Vec<BTreeSet<usize>>,
}

/// 20 groups of 5 jittered copies hidden among 900 uniform points, shuffled.
fn planted(seed: u64) -> Planted {
    let mut rng = StdRng::seed_from_u64(seed);
    let jitter = Normal::new(0.0f32, 1e-3).unwrap();

    let mut labeled: Vec<(Option<usize>, Vec<f32>)> = Vec::new();
    for g in 0..GROUPS {
        let base: Vec<f32> = (0..DIM).map(|_| rng.random::<f32>()).collect();
        for _ in 0..GROUP_SIZE {
            let copy = base.iter().map(|&x| x + jitter.sample(&mut rng)).collect();
            labeled.push((Some(g), copy));
        }
    }
    for _ in 0..NOISE {
        labeled.push((None, (0..DIM).map(|_| rng.random::<f32>()).collect()));
    }
    labeled.shuffle(&mut rng);

    let mut groups = vec![BTreeSet::new(); GROUPS];
    for (i, (label, _)) in labeled.iter().enumerate() {
        if let Some(g) = label {
            groups[*g].insert(i);
        }
    }
    Planted {
        rows: labeled.into_iter().map(|(_, row)| row).collect(),
        groups,
    }
}

fn batch_of(rows: Vec<Vec<f32>>) -> Batch {
    let ids = (0..rows.len()).map(|i| format!("sample-{i}")).collect();
    Batch::new()
        .with_field("embedding", rows)
        .unwrap()
        .with_sample_ids(ids)
        .unwrap()
}

fn found_sets(dups: &Duplicates, name: &str) -> Vec<BTreeSet<usize>> {
    dups.get(name)
        .unwrap()
        .iter()
        .map(|c| c.indices.iter().copied().collect())
        .collect()
}

#[test]
fn fixed_cutoff_recovers_every_planted_group() {
    let data = planted(7);
    let batch = batch_of(data.rows);
    let dups = Duplicates::introspect_using(&batch, 32, &KnnForest::new(), &Fixed(0.01)).unwrap();

    assert_eq!(dups.count(), GROUPS * GROUP_SIZE + NOISE);
    let found: BTreeSet<BTreeSet<usize>> = found_sets(&dups, "embedding").into_iter().collect();
    let expected: BTreeSet<BTreeSet<usize>> = data.groups.into_iter().collect();
    assert_eq!(found, expected);
}

#[test]
fn ivf_backend_recovers_every_planted_group() {
    let data = planted(11);
    let batch = batch_of(data.rows);
    let dups = Duplicates::introspect_using(&batch, 64, &KnnIvf::new(), &Fixed(0.01)).unwrap();

    let found: BTreeSet<BTreeSet<usize>> = found_sets(&dups, "embedding").into_iter().collect();
    let expected: BTreeSet<BTreeSet<usize>> = data.groups.into_iter().collect();
    assert_eq!(found, expected);
}

#[test]
fn default_config_keeps_planted_groups_together() {
    let data = planted(3);
    let noise_nn = mean_noise_nn_distance(&data);
    let batch = batch_of(data.rows);
    let dups = Duplicates::introspect(&batch, 32, &DuplicatesConfig::default()).unwrap();

    let threshold = dups.threshold("embedding").unwrap();
    assert!(threshold > 0.0);

    // On this data the slope elbow lands in the lower tail of the noise
    // distances: alongside the 20 planted groups it reports dozens of close
    // noise pairs, and some planted groups absorb nearby noise points. Exact
    // kNN behaves the same way. What holds is that no planted group is split
    // and exact planted groups are the tightest.
    let found = found_sets(&dups, "embedding");
    for group in &data.groups {
        assert!(
            found.iter().any(|c| group.is_subset(c)),
            "planted group {group:?} was split"
        );
    }

    let exact: Vec<f32> = dups
        .get("embedding")
        .unwrap()
        .iter()
        .filter(|c| {
            let members: BTreeSet<usize> = c.indices.iter().copied().collect();
            data.groups.contains(&members)
        })
        .map(|c| c.mean)
        .collect();
    assert!(!exact.is_empty());
    let exact_mean = exact.iter().sum::<f32>() / exact.len() as f32;
    assert!(exact_mean * 10.0 < noise_nn, "{exact_mean} vs {noise_nn}");

    let tightest = dups.ranked("embedding").unwrap()[0];
    let members: BTreeSet<usize> = tightest.indices.iter().copied().collect();
    assert!(data.groups.contains(&members));
}

/// Mean nearest-neighbor distance among noise points, after column normalization.
fn mean_noise_nn_distance(data: &Planted) -> f32 {
    let normalized = doppel::normalize_columns(&data.rows).unwrap();
    let planted: BTreeSet<usize> = data.groups.iter().flatten().copied().collect();
    let noise: Vec<usize> = (0..normalized.len()).filter(|i| !planted.contains(i)).collect();

    let mut total = 0.0f32;
    for &i in &noise {
        let nn = noise
            .iter()
            .filter(|&&j| j != i)
            .map(|&j| {
                normalized[i]
                    .iter()
                    .zip(&normalized[j])
                    .map(|(a, b)| (a - b) * (a - b))
                    .sum::<f32>()
                    .sqrt()
            })
            .fold(f32::INFINITY, f32::min);
        total += nn;
    }
    total / noise.len() as f32
}

#[test]
fn candidates_expose_member_ids() {
    let data = planted(5);
    let batch = batch_of(data.rows);
    let dups = Duplicates::introspect_using(&batch, 32, &KnnForest::new(), &Fixed(0.01)).unwrap();

    for candidate in dups.get("embedding").unwrap() {
        assert_eq!(candidate.size(), GROUP_SIZE);
        assert_eq!(candidate.batch.len(), GROUP_SIZE);
        let ids = candidate.batch.sample_ids().unwrap();
        let expected: Vec<String> = candidate
            .indices
            .iter()
            .map(|i| format!("sample-{i}"))
            .collect();
        assert_eq!(ids, expected);
        assert!(candidate.std >= 0.0);
        assert!(candidate.projection.is_none());
    }
}

#[test]
fn closest_pair_only_at_percentile_100() {
    let mut rng = StdRng::seed_from_u64(1);
    let rows: Vec<Vec<f32>> = (0..200)
        .map(|_| (0..16).map(|_| rng.random::<f32>()).collect())
        .collect();
    let threshold: Threshold = Percentile::new(100.0).unwrap().into();
    let dups = Duplicates::introspect_with(&batch_of(rows), 32, None, Some(threshold)).unwrap();

    let groups = dups.get("embedding").unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].size(), 2);
}

#[test]
fn well_separated_points_have_no_duplicates() {
    let mut rng = StdRng::seed_from_u64(2);
    let rows: Vec<Vec<f32>> = (0..150)
        .map(|_| (0..8).map(|_| rng.random::<f32>()).collect())
        .collect();
    let dups = Duplicates::introspect_using(&batch_of(rows), 32, &KnnForest::new(), &Fixed(1e-6))
        .unwrap();

    assert!(dups.get("embedding").unwrap().is_empty());
    assert!(dups.skipped().is_empty());
}

#[test]
fn bad_sources_are_skipped_without_failing_the_call() {
    let data = planted(9);
    let n = data.rows.len();
    let ragged: Vec<Vec<f32>> = (0..n).map(|i| vec![1.0; 3 + i % 2]).collect();
    let batch = Batch::new()
        .with_field("embedding", data.rows)
        .unwrap()
        .with_field("constant", vec![vec![0.5; 8]; n])
        .unwrap()
        .with_field("ragged", ragged)
        .unwrap();

    let dups = Duplicates::introspect(&batch, 100, &DuplicatesConfig::default()).unwrap();

    assert!(dups.get("embedding").is_some());
    assert!(dups.get("constant").is_none());
    assert_eq!(dups.skipped()["constant"], Error::DegenerateDistances);
    assert!(matches!(
        dups.skipped()["ragged"],
        Error::DimensionMismatch { .. }
    ));
    assert_eq!(dups.iter().count(), 1);
}

#[test]
fn introspect_with_fills_in_defaults() {
    let data = planted(13);
    let batch = batch_of(data.rows);
    let a = Duplicates::introspect_with(&batch, 32, None, None).unwrap();
    let b = Duplicates::introspect(&batch, 32, &DuplicatesConfig::default()).unwrap();

    assert_eq!(a.threshold("embedding"), b.threshold("embedding"));
    assert_eq!(found_sets(&a, "embedding"), found_sets(&b, "embedding"));
}

#[test]
fn ivf_backend_runs_through_the_config() {
    let data = planted(17);
    let batch = batch_of(data.rows);
    let strategy: KnnStrategy = KnnIvf::new().with_nprobe(4).into();
    let config = DuplicatesConfig::new(Some(Percentile::new(96.0).unwrap().into()), Some(strategy))
        .unwrap();
    let dups = Duplicates::introspect(&batch, 32, &config).unwrap();

    let found = found_sets(&dups, "embedding");
    assert!(!found.is_empty());
    for cluster in &found {
        assert!(cluster.len() > 1);
    }
}

struct Failing;

impl Producer for Failing {
    fn batches(&self, batch_size: usize) -> Box<dyn Iterator<Item = Result<Batch>> + '_> {
        let good = Batch::new()
            .with_field("embedding", vec![vec![0.0, 1.0]; batch_size])
            .map_err(|_| Error::EmptyInput);
        let bad = Err(Error::InvalidParameter {
            name: "source",
            message: "read failed",
        });
        Box::new(vec![good, bad].into_iter())
    }
}

#[test]
fn producer_errors_abort_the_call() {
    let err = Duplicates::introspect(&Failing, 4, &DuplicatesConfig::default()).unwrap_err();
    assert_eq!(
        err,
        Error::InvalidParameter {
            name: "source",
            message: "read failed"
        }
    );
}

#[test]
fn invalid_batch_size_is_rejected() {
    let data = planted(19);
    let batch = batch_of(data.rows);
    assert!(Duplicates::introspect(&batch, 0, &DuplicatesConfig::default()).is_err());
}

#[test]
fn config_round_trips_through_json() {
    let config = DuplicatesConfig::new(
        Some(Slope::new(7).unwrap().into()),
        Some(KnnForest::new().with_k(5).with_trees(12).into()),
    )
    .unwrap();
    let json = serde_json::to_string(&config).unwrap();
    let back: DuplicatesConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(back, config);

    let parsed: DuplicatesConfig =
        serde_json::from_str(r#"{"threshold": {"kind": "percentile", "value": 97.5}}"#).unwrap();
    assert_eq!(
        parsed.threshold(),
        &Threshold::Percentile(Percentile::new(97.5).unwrap())
    );
    assert_eq!(parsed.strategy(), &KnnStrategy::default());
}

#[test]
fn config_rejects_invalid_values_when_parsed() {
    assert!(serde_json::from_str::<DuplicatesConfig>(
        r#"{"threshold": {"kind": "slope", "value": 2}}"#
    )
    .is_err());
    assert!(serde_json::from_str::<DuplicatesConfig>(
        r#"{"threshold": {"kind": "percentile", "value": 120.0}}"#
    )
    .is_err());
}
