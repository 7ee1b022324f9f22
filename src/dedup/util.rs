use crate::error::{Error, Result};

#[inline]
pub(crate) fn squared_euclidean(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

#[inline]
pub(crate) fn euclidean(a: &[f32], b: &[f32]) -> f32 {
    squared_euclidean(a, b).sqrt()
}

#[inline]
pub(crate) fn dot(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Check that `rows` is a proper 2D matrix of finite values and return its dimension.
pub(crate) fn validate_matrix(rows: &[Vec<f32>]) -> Result<usize> {
    let Some(first) = rows.first() else {
        return Err(Error::EmptyInput);
    };
    let d = first.len();
    if d == 0 {
        return Err(Error::InvalidParameter {
            name: "dimension",
            message: "must be at least 1",
        });
    }
    for (row, v) in rows.iter().enumerate() {
        if v.len() != d {
            return Err(Error::DimensionMismatch {
                expected: d,
                found: v.len(),
            });
        }
        if let Some(column) = v.iter().position(|x| !x.is_finite()) {
            return Err(Error::NonFinite { row, column });
        }
    }
    Ok(d)
}

/// Flatten `distances`, sort ascending, and drop zero entries.
///
/// Zero distances are self-matches or exact copies and carry no information about
/// where "close" ends.
pub(crate) fn sorted_positive(distances: &[f32]) -> Vec<f32> {
    let mut out: Vec<f32> = distances
        .iter()
        .copied()
        .filter(|d| d.is_finite() && *d > 0.0)
        .collect();
    out.sort_by(|a, b| a.total_cmp(b));
    out
}

/// Mean and population standard deviation.
pub(crate) fn mean_std(values: &[f32]) -> (f32, f32) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().map(|&v| f64::from(v)).sum::<f64>() / n;
    let var = values
        .iter()
        .map(|&v| {
            let d = f64::from(v) - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    (mean as f32, var.sqrt() as f32)
}

/// Column-wise mean of the selected rows.
pub(crate) fn centroid(rows: &[&[f32]]) -> Vec<f32> {
    let d = rows.first().map_or(0, |r| r.len());
    let mut c = vec![0.0f32; d];
    for row in rows {
        for (acc, &x) in c.iter_mut().zip(row.iter()) {
            *acc += x;
        }
    }
    let n = rows.len().max(1) as f32;
    for x in &mut c {
        *x /= n;
    }
    c
}
