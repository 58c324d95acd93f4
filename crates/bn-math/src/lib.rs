//! Bayes-net math utilities.

pub mod math;

pub use math::dirichlet::{bde_factor_score, flat_factor_prior, FactorScore};
pub use math::gamma::{ln_gamma, LnGammaError};
pub use math::simplex::*;
