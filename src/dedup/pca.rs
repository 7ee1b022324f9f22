//! Principal-component projection for small groups.
//!
//! Duplicate clusters are small (a handful to a few hundred members), so the
//! projection works on whichever of the covariance (`d x d`) or Gram (`m x m`)
//! matrix is smaller and extracts the leading eigenvectors by power iteration with
//! deflation.
//!
//! Component signs are arbitrary in PCA. Each score vector is flipped so that its
//! largest-magnitude entry is positive, which keeps orderings reproducible.

const MAX_ITERS: usize = 200;
const TOLERANCE: f64 = 1e-10;

/// Project `rows` onto their first `components` principal components.
///
/// Returns one score vector per row, each of length `components`. Components
/// beyond the rank of the data come out as zeros.
pub(crate) fn project(rows: &[&[f32]], components: usize) -> Vec<Vec<f32>> {
    let m = rows.len();
    if m == 0 || components == 0 {
        return vec![Vec::new(); m];
    }
    let d = rows[0].len();

    let mut mean = vec![0.0f64; d];
    for row in rows {
        for (acc, &x) in mean.iter_mut().zip(row.iter()) {
            *acc += f64::from(x);
        }
    }
    for x in &mut mean {
        *x /= m as f64;
    }
    let centered: Vec<Vec<f64>> = rows
        .iter()
        .map(|row| {
            row.iter()
                .zip(mean.iter())
                .map(|(&x, mu)| f64::from(x) - mu)
                .collect()
        })
        .collect();

    // scores[c][i] = score of row i on component c
    let scores: Vec<Vec<f64>> = if m <= d {
        gram_scores(&centered, components)
    } else {
        covariance_scores(&centered, components)
    };

    (0..m)
        .map(|i| scores.iter().map(|s| s[i] as f32).collect())
        .collect()
}

fn gram_scores(x: &[Vec<f64>], components: usize) -> Vec<Vec<f64>> {
    let m = x.len();
    let mut gram = vec![0.0f64; m * m];
    for i in 0..m {
        for j in i..m {
            let v: f64 = x[i].iter().zip(x[j].iter()).map(|(a, b)| a * b).sum();
            gram[i * m + j] = v;
            gram[j * m + i] = v;
        }
    }

    eigen_pairs(&mut gram, m, components)
        .into_iter()
        .map(|(lambda, u)| {
            let scale = lambda.max(0.0).sqrt();
            let mut s: Vec<f64> = u.iter().map(|x| x * scale).collect();
            fix_sign(&mut s);
            s
        })
        .collect()
}

fn covariance_scores(x: &[Vec<f64>], components: usize) -> Vec<Vec<f64>> {
    let d = x.first().map_or(0, Vec::len);
    let mut cov = vec![0.0f64; d * d];
    for row in x {
        for a in 0..d {
            if row[a] == 0.0 {
                continue;
            }
            for b in a..d {
                cov[a * d + b] += row[a] * row[b];
            }
        }
    }
    for a in 0..d {
        for b in 0..a {
            cov[a * d + b] = cov[b * d + a];
        }
    }

    eigen_pairs(&mut cov, d, components)
        .into_iter()
        .map(|(_, v)| {
            let mut s: Vec<f64> = x
                .iter()
                .map(|row| row.iter().zip(v.iter()).map(|(a, b)| a * b).sum())
                .collect();
            fix_sign(&mut s);
            s
        })
        .collect()
}

/// Leading `k` eigenpairs of the symmetric PSD `matrix` (`n x n`), deflating in place.
fn eigen_pairs(matrix: &mut [f64], n: usize, k: usize) -> Vec<(f64, Vec<f64>)> {
    let mut out = Vec::with_capacity(k);
    for _ in 0..k {
        let v = power_iteration(matrix, n);
        let lambda = rayleigh_quotient(matrix, n, &v);
        if lambda <= TOLERANCE {
            out.push((0.0, vec![0.0; n]));
            continue;
        }
        for i in 0..n {
            for j in 0..n {
                matrix[i * n + j] -= lambda * v[i] * v[j];
            }
        }
        out.push((lambda, v));
    }
    out
}

fn power_iteration(matrix: &[f64], n: usize) -> Vec<f64> {
    let mut v: Vec<f64> = (0..n).map(|i| ((i * 7 + 13) % 100) as f64 / 100.0 + 0.01).collect();
    normalize(&mut v);

    for _ in 0..MAX_ITERS {
        let mut next = mat_vec(matrix, n, &v);
        if normalize(&mut next) <= TOLERANCE {
            return next;
        }
        let delta: f64 = next
            .iter()
            .zip(v.iter())
            .map(|(a, b)| (a - b).abs())
            .sum();
        v = next;
        if delta < TOLERANCE {
            break;
        }
    }
    v
}

fn mat_vec(matrix: &[f64], n: usize, v: &[f64]) -> Vec<f64> {
    (0..n)
        .map(|i| {
            matrix[i * n..(i + 1) * n]
                .iter()
                .zip(v.iter())
                .map(|(a, b)| a * b)
                .sum()
        })
        .collect()
}

fn rayleigh_quotient(matrix: &[f64], n: usize, v: &[f64]) -> f64 {
    let av = mat_vec(matrix, n, v);
    let num: f64 = av.iter().zip(v.iter()).map(|(a, b)| a * b).sum();
    let den: f64 = v.iter().map(|x| x * x).sum();
    if den > 0.0 {
        num / den
    } else {
        0.0
    }
}

fn normalize(v: &mut [f64]) -> f64 {
    let norm = v.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm > TOLERANCE {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
    norm
}

fn fix_sign(s: &mut [f64]) {
    let pivot = s
        .iter()
        .copied()
        .max_by(|a, b| a.abs().total_cmp(&b.abs()))
        .unwrap_or(0.0);
    if pivot < 0.0 {
        for x in s.iter_mut() {
            *x = -*x;
        }
    }
}
