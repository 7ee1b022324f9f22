//! The duplicate-detection pipeline over every vector source of a producer.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::candidate::DuplicateSetCandidate;
use super::knn::KnnStrategy;
use super::merge::combine_clusters;
use super::normalize::normalize_columns;
use super::threshold::Threshold;
use super::traits::{NeighborStrategy, ThresholdStrategy};
use super::util::sorted_positive;
use crate::batch::{accumulate_batches, Batch, Producer};
use crate::error::{Error, Result};

/// Default number of samples pulled from a producer per read.
pub const DEFAULT_BATCH_SIZE: usize = 32;

/// Threshold and neighbor-backend selection for [`Duplicates::introspect`].
///
/// Unset parts fall back to [`Threshold::default`] (slope, sensitivity 5) and
/// [`KnnStrategy::default`] (forest, `k = 10`, 30 trees).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DuplicatesConfig {
    threshold: Threshold,
    strategy: KnnStrategy,
}

impl DuplicatesConfig {
    /// Build a config, filling in defaults for anything left unset.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] if the neighbor backend is misconfigured.
    pub fn new(threshold: Option<Threshold>, strategy: Option<KnnStrategy>) -> Result<Self> {
        let config = Self {
            threshold: threshold.unwrap_or_default(),
            strategy: strategy.unwrap_or_default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Check every parameter without touching data.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] for out-of-range settings.
    pub fn validate(&self) -> Result<()> {
        self.strategy.validate()
    }

    /// The threshold strategy.
    pub fn threshold(&self) -> &Threshold {
        &self.threshold
    }

    /// The neighbor backend.
    pub fn strategy(&self) -> &KnnStrategy {
        &self.strategy
    }
}

/// Candidate duplicate groups for every vector source of a producer.
#[derive(Debug, Clone)]
pub struct Duplicates {
    results: BTreeMap<String, Vec<DuplicateSetCandidate>>,
    thresholds: BTreeMap<String, f32>,
    skipped: BTreeMap<String, Error>,
    count: usize,
}

impl Duplicates {
    /// Find near-duplicate groups in every field of `producer`.
    ///
    /// The producer is drained completely (in reads of `batch_size`). Each field is
    /// L2-normalized per column, searched for neighbors, thresholded, and merged
    /// into disjoint groups.
    ///
    /// A field that cannot be processed on its own (too few samples, ragged rows,
    /// no positive distances) is left out of the results and reported by
    /// [`Duplicates::skipped`].
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid config, a zero `batch_size`, a producer
    /// error, or an empty producer.
    pub fn introspect<P: Producer + ?Sized>(
        producer: &P,
        batch_size: usize,
        config: &DuplicatesConfig,
    ) -> Result<Self> {
        config.validate()?;
        Self::introspect_using(producer, batch_size, &config.strategy, &config.threshold)
    }

    /// Like [`Duplicates::introspect`], with caller-supplied strategy implementations.
    ///
    /// # Errors
    ///
    /// See [`Duplicates::introspect`].
    pub fn introspect_using<P, N, T>(
        producer: &P,
        batch_size: usize,
        strategy: &N,
        threshold: &T,
    ) -> Result<Self>
    where
        P: Producer + ?Sized,
        N: NeighborStrategy + ?Sized,
        T: ThresholdStrategy + ?Sized,
    {
        let batch = Arc::new(accumulate_batches(producer, batch_size)?);
        if batch.is_empty() {
            return Err(Error::EmptyInput);
        }
        tracing::info!(
            samples = batch.len(),
            sources = batch.field_names().len(),
            strategy = strategy.name(),
            "detecting duplicates"
        );

        let mut out = Self {
            results: BTreeMap::new(),
            thresholds: BTreeMap::new(),
            skipped: BTreeMap::new(),
            count: batch.len(),
        };

        for (name, rows) in batch.fields() {
            match find_candidates(rows, &batch, strategy, threshold) {
                Ok((cutoff, candidates)) => {
                    tracing::info!(
                        source = name,
                        threshold = cutoff,
                        groups = candidates.len(),
                        "found duplicate groups"
                    );
                    out.thresholds.insert(name.to_string(), cutoff);
                    out.results.insert(name.to_string(), candidates);
                }
                Err(err) => {
                    tracing::warn!(source = name, error = %err, "skipping source");
                    out.skipped.insert(name.to_string(), err);
                }
            }
        }

        Ok(out)
    }

    /// Like [`Duplicates::introspect`], taking the two strategies separately.
    ///
    /// # Errors
    ///
    /// See [`Duplicates::introspect`].
    pub fn introspect_with<P: Producer + ?Sized>(
        producer: &P,
        batch_size: usize,
        strategy: Option<KnnStrategy>,
        threshold: Option<Threshold>,
    ) -> Result<Self> {
        let config = DuplicatesConfig::new(threshold, strategy)?;
        Self::introspect(producer, batch_size, &config)
    }

    /// Groups per source name.
    pub fn results(&self) -> &BTreeMap<String, Vec<DuplicateSetCandidate>> {
        &self.results
    }

    /// Groups for one source.
    pub fn get(&self, name: &str) -> Option<&[DuplicateSetCandidate]> {
        self.results.get(name).map(Vec::as_slice)
    }

    /// Groups for one source, tightest (smallest mean distance) first.
    pub fn ranked(&self, name: &str) -> Option<Vec<&DuplicateSetCandidate>> {
        let mut groups: Vec<&DuplicateSetCandidate> = self.results.get(name)?.iter().collect();
        groups.sort_by(|a, b| a.mean.total_cmp(&b.mean));
        Some(groups)
    }

    /// Distance threshold used for one source.
    pub fn threshold(&self, name: &str) -> Option<f32> {
        self.thresholds.get(name).copied()
    }

    /// Sources left out of the results, with the reason.
    pub fn skipped(&self) -> &BTreeMap<String, Error> {
        &self.skipped
    }

    /// Number of samples drained from the producer.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Iterate over `(source, groups)`.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[DuplicateSetCandidate])> {
        self.results.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

fn find_candidates<N, T>(
    rows: &[Vec<f32>],
    batch: &Arc<Batch>,
    strategy: &N,
    threshold: &T,
) -> Result<(f32, Vec<DuplicateSetCandidate>)>
where
    N: NeighborStrategy + ?Sized,
    T: ThresholdStrategy + ?Sized,
{
    let normalized = normalize_columns(rows)?;
    let neighbors = strategy.find_neighbors(&normalized)?;

    let distances = sorted_positive(neighbors.all_distances());
    let cutoff = threshold.compute(&distances)?;
    drop(distances);
    tracing::debug!(threshold = cutoff, "computed distance threshold");

    let local_sets = neighbors.local_sets(cutoff);
    tracing::debug!(local_sets = local_sets.len(), "collected local duplicate sets");

    let candidates = combine_clusters(&local_sets)
        .iter()
        .map(|members| DuplicateSetCandidate::build(&normalized, batch, members))
        .collect::<Result<Vec<_>>>()?;
    Ok((cutoff, candidates))
}
