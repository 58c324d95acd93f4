//! Probability-vector normalization utilities.
//!
//! These helpers turn unnormalized non-negative weights into rows of a
//! conditional probability table. They are used by bn-core so that row
//! normalization and the zero-mass fallback are centralized.

/// Tolerance used when checking that a row is a distribution.
pub const ROW_SUM_TOLERANCE: f64 = 1e-6;

/// Normalize weights in place so they sum to 1.
///
/// A row whose total is zero becomes uniform. Returns the pre-normalization
/// total.
pub fn normalize_in_place(row: &mut [f64]) -> f64 {
    if row.is_empty() {
        return 0.0;
    }
    let total: f64 = row.iter().sum();
    if total != 0.0 {
        for v in row.iter_mut() {
            *v /= total;
        }
    } else {
        let uniform = 1.0 / row.len() as f64;
        row.iter_mut().for_each(|v| *v = uniform);
    }
    total
}

/// Normalize a slice of weights into a new vector (see [`normalize_in_place`]).
pub fn normalize(weights: &[f64]) -> Vec<f64> {
    let mut out = weights.to_vec();
    normalize_in_place(&mut out);
    out
}

/// True if every entry is a probability and the entries sum to 1 within `tol`.
pub fn is_distribution(row: &[f64], tol: f64) -> bool {
    if row.is_empty() || row.iter().any(|v| v.is_nan() || *v < 0.0 || *v > 1.0) {
        return false;
    }
    let sum: f64 = row.iter().sum();
    (sum - 1.0).abs() < tol
}

/// Build a random distribution of `size` entries from i.i.d. uniform draws.
///
/// `draw` is called exactly `size` times. Normalized uniforms are not a
/// Dirichlet sample; they are a cheap stand-in that still covers the simplex.
pub fn random_weights(size: usize, mut draw: impl FnMut() -> f64) -> Vec<f64> {
    let mut row: Vec<f64> = (0..size).map(|_| draw()).collect();
    normalize_in_place(&mut row);
    row
}

/// Index of the first cumulative bucket that exceeds `r`, for `r` in `[0, 1)`.
///
/// Zero-probability buckets are never chosen.
///
/// Falls back to the last index when rounding leaves the cumulative sum just
/// below `r`.
pub fn sample_index(row: &[f64], r: f64) -> usize {
    let mut sum = 0.0;
    for (k, p) in row.iter().enumerate() {
        sum += p;
        if r < sum {
            return k;
        }
    }
    row.len().saturating_sub(1)
}
