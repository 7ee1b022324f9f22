//! Per-column L2 normalization.
//!
//! Distances over raw responses are dominated by whichever columns carry the
//! largest magnitudes. Dividing each column by its L2 norm (taken over all rows)
//! puts every dimension on the same footing before neighbors are searched.

use super::util::validate_matrix;
use crate::error::Result;

/// L2-normalize every column of `rows`, returning a new matrix.
///
/// A column whose norm is zero contains only zeros; it is left as zeros rather
/// than divided into NaN.
///
/// # Errors
///
/// Returns an error if `rows` is empty, ragged, or contains non-finite values.
pub fn normalize_columns(rows: &[Vec<f32>]) -> Result<Vec<Vec<f32>>> {
    let d = validate_matrix(rows)?;

    let mut norms = vec![0.0f64; d];
    for row in rows {
        for (acc, &x) in norms.iter_mut().zip(row.iter()) {
            *acc += f64::from(x) * f64::from(x);
        }
    }

    let inv: Vec<f32> = norms
        .iter()
        .map(|&n| {
            let n = n.sqrt();
            if n > 0.0 {
                (1.0 / n) as f32
            } else {
                0.0
            }
        })
        .collect();

    let zero_columns = inv.iter().filter(|&&s| s == 0.0).count();
    if zero_columns > 0 {
        tracing::debug!(zero_columns, "all-zero columns left unscaled");
    }

    Ok(rows
        .iter()
        .map(|row| row.iter().zip(inv.iter()).map(|(x, s)| x * s).collect())
        .collect())
}
