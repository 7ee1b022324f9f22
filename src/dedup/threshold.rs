//! Duplicate-distance thresholds.
//!
//! Both strategies look at the sorted, flattened, strictly positive distances of
//! every (point, neighbor) pair and pick one scalar below which two points are
//! considered duplicates.
//!
//! ## Percentile
//!
//! Take the distance at a fixed rank. `Percentile::new(98.5)` returns a threshold
//! such that 98.5% of all pairs are *not* considered close. Higher percentiles
//! give smaller thresholds and fewer duplicates.
//!
//! ## Slope
//!
//! Sorted neighbor distances usually show a steep rise, an elbow, and then a long
//! (possibly rising) tail. The target slope is the spread between the 25th and
//! 75th percentile. Starting at the median, a window of `len / sensitivity`
//! entries walks backwards until the rise inside the window exceeds the target,
//! which approximates the tail end of the elbow.
//!
//! A lower sensitivity (down to 3) means a wider window and more duplicates; 5 is
//! a good default and 20 a reasonable large value.

use serde::{Deserialize, Serialize};

use super::traits::ThresholdStrategy;
use crate::error::{Error, Result};

/// Default sensitivity for [`Slope`].
pub const DEFAULT_SENSITIVITY: usize = 5;

/// Threshold at a fixed percentile of the sorted distances.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "f32", into = "f32")]
pub struct Percentile {
    percentile: f32,
}

impl Percentile {
    /// Create a percentile threshold.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] unless `0 <= percentile <= 100`.
    pub fn new(percentile: f32) -> Result<Self> {
        if !percentile.is_finite() || !(0.0..=100.0).contains(&percentile) {
            return Err(Error::InvalidParameter {
                name: "percentile",
                message: "must be within [0, 100]",
            });
        }
        Ok(Self { percentile })
    }

    /// The configured percentile.
    pub fn percentile(&self) -> f32 {
        self.percentile
    }
}

impl TryFrom<f32> for Percentile {
    type Error = Error;

    fn try_from(value: f32) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Percentile> for f32 {
    fn from(p: Percentile) -> Self {
        p.percentile
    }
}

impl ThresholdStrategy for Percentile {
    fn compute(&self, distances: &[f32]) -> Result<f32> {
        let len = distances.len();
        if len == 0 {
            return Err(Error::DegenerateDistances);
        }
        let cut = (f64::from(self.percentile) * len as f64 / 100.0) as usize;
        // p = 0 would index one past the end.
        let index = (len - cut.min(len)).min(len - 1);
        Ok(distances[index])
    }
}

/// Elbow-seeking threshold driven by a window-slope comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "usize", into = "usize")]
pub struct Slope {
    sensitivity: usize,
}

impl Slope {
    /// Create a slope threshold.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] if `sensitivity <= 2`.
    pub fn new(sensitivity: usize) -> Result<Self> {
        if sensitivity <= 2 {
            return Err(Error::InvalidParameter {
                name: "sensitivity",
                message: "must be > 2",
            });
        }
        Ok(Self { sensitivity })
    }

    /// The configured sensitivity.
    pub fn sensitivity(&self) -> usize {
        self.sensitivity
    }
}

impl Default for Slope {
    fn default() -> Self {
        Self {
            sensitivity: DEFAULT_SENSITIVITY,
        }
    }
}

impl TryFrom<usize> for Slope {
    type Error = Error;

    fn try_from(value: usize) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Slope> for usize {
    fn from(s: Slope) -> Self {
        s.sensitivity
    }
}

impl ThresholdStrategy for Slope {
    fn compute(&self, distances: &[f32]) -> Result<f32> {
        let len = distances.len();
        if len == 0 {
            return Err(Error::DegenerateDistances);
        }
        let last = len - 1;

        let stride = len / 1000 + 1;
        let mut probe = len / 2;

        // Spread between the 25th and 75th percentile.
        let target_delta = distances[(probe + probe / 2).min(last)] - distances[probe - probe / 2];

        let window_size = len / self.sensitivity;

        while probe > stride {
            let probe_delta = distances[(probe + window_size).min(last)] - distances[probe];
            if probe_delta > target_delta {
                break;
            }
            probe -= stride;
        }

        let close = distances[probe];
        tracing::debug!(
            probe,
            target_delta,
            stride,
            window_size,
            threshold = close,
            "slope threshold"
        );
        Ok(close)
    }
}

/// Threshold strategy selection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Threshold {
    /// See [`Percentile`].
    Percentile(Percentile),
    /// See [`Slope`].
    Slope(Slope),
}

impl Default for Threshold {
    fn default() -> Self {
        Self::Slope(Slope::default())
    }
}

impl From<Percentile> for Threshold {
    fn from(p: Percentile) -> Self {
        Self::Percentile(p)
    }
}

impl From<Slope> for Threshold {
    fn from(s: Slope) -> Self {
        Self::Slope(s)
    }
}

impl ThresholdStrategy for Threshold {
    fn compute(&self, distances: &[f32]) -> Result<f32> {
        match self {
            Self::Percentile(p) => p.compute(distances),
            Self::Slope(s) => s.compute(distances),
        }
    }
}
