use thiserror::Error;

/// Errors returned by the duplicate-detection engine.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    /// Input is empty (no samples, or a producer that yields nothing).
    #[error("empty input")]
    EmptyInput,

    /// Invalid parameter value.
    #[error("invalid parameter {name}: {message}")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// Human-readable explanation.
        message: &'static str,
    },

    /// Rows of a vector source have inconsistent dimensionality.
    #[error("dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch {
        /// Expected dimensionality.
        expected: usize,
        /// Found dimensionality.
        found: usize,
    },

    /// A field (or the sample id list) of a batch disagrees with the batch size.
    #[error("sample count mismatch in {field}: expected {expected}, found {found}")]
    SampleCountMismatch {
        /// Field name (`"sample_ids"` for identifiers).
        field: String,
        /// Expected number of samples.
        expected: usize,
        /// Found number of samples.
        found: usize,
    },

    /// Batches being accumulated do not carry the same fields.
    #[error("field mismatch: expected {expected:?}, found {found:?}")]
    FieldMismatch {
        /// Field names of the first batch.
        expected: Vec<String>,
        /// Field names of the offending batch.
        found: Vec<String>,
    },

    /// Not enough samples to build a neighbor index.
    #[error("too few samples: need at least {required}, found {found}")]
    TooFewSamples {
        /// Minimum number of samples.
        required: usize,
        /// Number of samples provided.
        found: usize,
    },

    /// A sample index past the end of the data it refers to.
    #[error("index {index} out of range for {len} samples")]
    IndexOutOfRange {
        /// Offending index.
        index: usize,
        /// Number of samples available.
        len: usize,
    },

    /// A NaN or infinite value in a vector source.
    #[error("non-finite value at row {row}, column {column}")]
    NonFinite {
        /// Row of the offending value.
        row: usize,
        /// Column of the offending value.
        column: usize,
    },

    /// No positive neighbor distance exists, so no threshold can be derived.
    ///
    /// This happens when every sample is an exact copy of its neighbors.
    #[error("no positive neighbor distances to derive a threshold from")]
    DegenerateDistances,
}

/// Result type used by this crate.
pub type Result<T> = std::result::Result<T, Error>;
