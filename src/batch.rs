//! Sample batches and the producers that stream them.
//!
//! A [`Batch`] holds one or more named vector sources ("fields", e.g. one per
//! model layer) with the same number of rows, plus optional per-sample
//! identifiers. A [`Producer`] yields batches of a requested size; the engine
//! drains it completely with [`accumulate_batches`] before doing any work.

use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::Arc;

use crate::error::{Error, Result};

/// Named vector sources over a common set of samples.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    fields: BTreeMap<String, Vec<Vec<f32>>>,
    sample_ids: Option<Vec<String>>,
    len: Option<usize>,
}

impl Batch {
    /// Create an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a named vector source.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SampleCountMismatch`] if `rows` disagrees with the batch size.
    pub fn with_field(mut self, name: impl Into<String>, rows: Vec<Vec<f32>>) -> Result<Self> {
        let name = name.into();
        self.check_len(&name, rows.len())?;
        self.fields.insert(name, rows);
        Ok(self)
    }

    /// Attach per-sample identifiers.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SampleCountMismatch`] if `ids` disagrees with the batch size.
    pub fn with_sample_ids(mut self, ids: Vec<String>) -> Result<Self> {
        self.check_len("sample_ids", ids.len())?;
        self.sample_ids = Some(ids);
        Ok(self)
    }

    fn check_len(&mut self, field: &str, found: usize) -> Result<()> {
        match self.len {
            Some(expected) if expected != found => Err(Error::SampleCountMismatch {
                field: field.to_string(),
                expected,
                found,
            }),
            _ => {
                self.len = Some(found);
                Ok(())
            }
        }
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.len.unwrap_or(0)
    }

    /// Whether the batch holds no samples.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rows of the named field.
    pub fn field(&self, name: &str) -> Option<&[Vec<f32>]> {
        self.fields.get(name).map(Vec::as_slice)
    }

    /// All fields, ordered by name.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &[Vec<f32>])> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Field names, ordered.
    pub fn field_names(&self) -> Vec<String> {
        self.fields.keys().cloned().collect()
    }

    /// Per-sample identifiers, if attached.
    pub fn sample_ids(&self) -> Option<&[String]> {
        self.sample_ids.as_deref()
    }

    /// Copy out the samples in `range`.
    pub fn slice(&self, range: Range<usize>) -> Batch {
        let end = range.end.min(self.len());
        let start = range.start.min(end);
        Batch {
            fields: self
                .fields
                .iter()
                .map(|(k, v)| (k.clone(), v[start..end].to_vec()))
                .collect(),
            sample_ids: self.sample_ids.as_ref().map(|ids| ids[start..end].to_vec()),
            len: self.len.map(|_| end - start),
        }
    }

    /// Concatenate batches that carry the same fields.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FieldMismatch`] if the batches carry different fields, and
    /// [`Error::SampleCountMismatch`] if only some of them carry sample ids.
    pub fn concat(batches: Vec<Batch>) -> Result<Batch> {
        let mut iter = batches.into_iter();
        let Some(mut out) = iter.next() else {
            return Ok(Batch::new());
        };
        let names = out.field_names();
        let mut total = out.len();
        let mut with_ids = if out.sample_ids.is_some() { total } else { 0 };

        for batch in iter {
            let found = batch.field_names();
            if found != names {
                return Err(Error::FieldMismatch {
                    expected: names,
                    found,
                });
            }
            total += batch.len();
            if let Some(ids) = batch.sample_ids {
                with_ids += ids.len();
                out.sample_ids.get_or_insert_with(Vec::new).extend(ids);
            }
            for (name, rows) in batch.fields {
                out.fields.entry(name).or_default().extend(rows);
            }
        }

        if with_ids != 0 && with_ids != total {
            return Err(Error::SampleCountMismatch {
                field: "sample_ids".to_string(),
                expected: total,
                found: with_ids,
            });
        }
        out.len = Some(total);
        Ok(out)
    }
}

/// A restricted, read-only view over some samples of a shared [`Batch`].
#[derive(Debug, Clone)]
pub struct BatchView {
    batch: Arc<Batch>,
    indices: Vec<usize>,
}

impl BatchView {
    /// A view over the samples of `batch` at `indices`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexOutOfRange`] if an index is not a sample of `batch`.
    pub fn new(batch: &Arc<Batch>, indices: Vec<usize>) -> Result<Self> {
        if let Some(&index) = indices.iter().find(|&&i| i >= batch.len()) {
            return Err(Error::IndexOutOfRange {
                index,
                len: batch.len(),
            });
        }
        Ok(Self {
            batch: Arc::clone(batch),
            indices,
        })
    }

    /// Number of samples in the view.
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    /// Whether the view is empty.
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Indices into the underlying batch, in view order.
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// Identifiers of the viewed samples, in view order.
    pub fn sample_ids(&self) -> Option<Vec<&str>> {
        let ids = self.batch.sample_ids()?;
        Some(self.indices.iter().map(|&i| ids[i].as_str()).collect())
    }

    /// Rows of `name` for the viewed samples, in view order.
    pub fn field<'a>(&'a self, name: &str) -> Option<impl Iterator<Item = &'a [f32]> + 'a> {
        let rows = self.batch.field(name)?;
        Some(self.indices.iter().map(move |&i| rows[i].as_slice()))
    }

    /// Materialize the view as a standalone batch.
    pub fn to_batch(&self) -> Batch {
        Batch {
            fields: self
                .batch
                .fields
                .iter()
                .map(|(k, rows)| (k.clone(), self.indices.iter().map(|&i| rows[i].clone()).collect()))
                .collect(),
            sample_ids: self
                .batch
                .sample_ids
                .as_ref()
                .map(|ids| self.indices.iter().map(|&i| ids[i].clone()).collect()),
            len: Some(self.indices.len()),
        }
    }
}

/// A source of batches.
pub trait Producer {
    /// Yield the data in batches of at most `batch_size` samples.
    fn batches(&self, batch_size: usize) -> Box<dyn Iterator<Item = Result<Batch>> + '_>;
}

impl Producer for Batch {
    fn batches(&self, batch_size: usize) -> Box<dyn Iterator<Item = Result<Batch>> + '_> {
        let step = batch_size.max(1);
        Box::new(
            (0..self.len())
                .step_by(step)
                .map(move |start| Ok(self.slice(start..start + step))),
        )
    }
}

/// Drain `producer` into one in-memory batch.
///
/// # Errors
///
/// Returns [`Error::InvalidParameter`] if `batch_size == 0`, the first error the
/// producer yields, or a concatenation error.
pub fn accumulate_batches<P: Producer + ?Sized>(producer: &P, batch_size: usize) -> Result<Batch> {
    if batch_size == 0 {
        return Err(Error::InvalidParameter {
            name: "batch_size",
            message: "must be at least 1",
        });
    }
    let batches = producer.batches(batch_size).collect::<Result<Vec<_>>>()?;
    tracing::debug!(batches = batches.len(), batch_size, "accumulated batches");
    Batch::concat(batches)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Batch {
        Batch::new()
            .with_field("a", (0..5).map(|i| vec![i as f32]).collect())
            .unwrap()
            .with_field("b", (0..5).map(|i| vec![i as f32, 1.0]).collect())
            .unwrap()
            .with_sample_ids((0..5).map(|i| format!("s{i}")).collect())
            .unwrap()
    }

    #[test]
    fn mismatched_field_is_rejected() {
        let err = Batch::new()
            .with_field("a", vec![vec![0.0]; 3])
            .unwrap()
            .with_field("b", vec![vec![0.0]; 2])
            .unwrap_err();
        assert_eq!(
            err,
            Error::SampleCountMismatch {
                field: "b".to_string(),
                expected: 3,
                found: 2
            }
        );
    }

    #[test]
    fn accumulate_round_trips_any_batch_size() {
        let batch = sample();
        for size in [1, 2, 3, 5, 32] {
            let acc = accumulate_batches(&batch, size).unwrap();
            assert_eq!(acc, batch, "batch_size {size}");
        }
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        assert!(accumulate_batches(&sample(), 0).is_err());
    }

    #[test]
    fn concat_rejects_different_fields() {
        let a = Batch::new().with_field("x", vec![vec![0.0]]).unwrap();
        let b = Batch::new().with_field("y", vec![vec![0.0]]).unwrap();
        assert!(matches!(
            Batch::concat(vec![a, b]),
            Err(Error::FieldMismatch { .. })
        ));
    }

    #[test]
    fn concat_rejects_partial_ids() {
        let a = Batch::new()
            .with_field("x", vec![vec![0.0]])
            .unwrap()
            .with_sample_ids(vec!["a".into()])
            .unwrap();
        let b = Batch::new().with_field("x", vec![vec![1.0]]).unwrap();
        assert!(matches!(
            Batch::concat(vec![a, b]),
            Err(Error::SampleCountMismatch { .. })
        ));
    }

    #[test]
    fn view_follows_index_order() {
        let batch = Arc::new(sample());
        let view = BatchView::new(&batch, vec![4, 1]).unwrap();
        assert_eq!(view.len(), 2);
        assert_eq!(view.sample_ids().unwrap(), vec!["s4", "s1"]);
        let rows: Vec<&[f32]> = view.field("a").unwrap().collect();
        assert_eq!(rows, vec![&[4.0][..], &[1.0][..]]);
        assert!(view.field("missing").is_none());
        assert_eq!(view.to_batch().len(), 2);
    }

    #[test]
    fn view_rejects_indices_past_the_end() {
        let batch = Arc::new(sample());
        assert_eq!(
            BatchView::new(&batch, vec![0, 5]).unwrap_err(),
            Error::IndexOutOfRange { index: 5, len: 5 }
        );
        assert!(BatchView::new(&Arc::new(Batch::new()), vec![0]).is_err());
        assert!(BatchView::new(&batch, Vec::new()).unwrap().is_empty());
    }
}
