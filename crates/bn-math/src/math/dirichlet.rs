//! BDe (Bayesian Dirichlet equivalent) factor scoring.
//!
//! For one family with `r` parent configurations (rows) and `c` child
//! categories (columns), the log marginal likelihood is
//!
//! ```text
//! Σ_j [ lnΓ(α_j) − lnΓ(α_j + N_j) ] + Σ_j Σ_k [ lnΓ(α_jk + N_jk) − lnΓ(α_jk) ]
//! ```
//!
//! where `α_jk` are prior pseudo-counts, `N_jk` observed counts, and `α_j`,
//! `N_j` their row sums (Heckerman, Geiger & Chickering 1995).
//!
//! A term whose log-gamma evaluation fails contributes zero; every failure is
//! reported back in [`FactorScore::failures`] so the caller decides whether
//! that is acceptable.

use serde::{Deserialize, Serialize};

use super::gamma::{ln_gamma, LnGammaError};

/// Outcome of scoring a single factor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorScore {
    /// Sum of every term that evaluated successfully.
    pub score: f64,
    /// Terms that failed and were counted as zero.
    #[serde(skip)]
    pub failures: Vec<LnGammaError>,
}

impl FactorScore {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Flat prior that spreads one pseudo-count over the whole factor.
///
/// Every cell receives `1 / (num_rows * num_cols)`, so the total prior mass is
/// 1 regardless of the factor's shape.
pub fn flat_factor_prior(num_rows: usize, num_cols: usize) -> f64 {
    1.0 / (num_rows * num_cols) as f64
}

/// Score one factor. `prior` and `observed` are row-major `num_rows x num_cols`.
///
/// # Panics
///
/// Panics if either slice is not exactly `num_rows * num_cols` long.
pub fn bde_factor_score(
    prior: &[f64],
    observed: &[f64],
    num_rows: usize,
    num_cols: usize,
) -> FactorScore {
    assert_eq!(prior.len(), num_rows * num_cols, "prior table shape");
    assert_eq!(observed.len(), num_rows * num_cols, "observed table shape");

    let mut failures = Vec::new();
    let mut term = |value: Result<f64, LnGammaError>| match value {
        Ok(v) => v,
        Err(e) => {
            failures.push(e);
            0.0
        }
    };

    let mut sum = 0.0;
    for j in 0..num_rows {
        let row = j * num_cols..(j + 1) * num_cols;
        let prior_row = &prior[row.clone()];
        let observed_row = &observed[row];
        let prior_sum: f64 = prior_row.iter().sum();
        let observed_sum: f64 = observed_row.iter().sum();

        // Each lnΓ is its own term so one failure does not discard its partner.
        sum += term(ln_gamma(prior_sum)) - term(ln_gamma(prior_sum + observed_sum));

        let mut sum_k = 0.0;
        for (a, n) in prior_row.iter().zip(observed_row) {
            sum_k += term(ln_gamma(a + n)) - term(ln_gamma(*a));
        }
        sum += sum_k;
    }

    FactorScore {
        score: sum,
        failures,
    }
}
