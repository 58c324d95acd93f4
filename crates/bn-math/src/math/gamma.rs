//! Log-gamma function.
//!
//! Lanczos approximation (g = 7, nine coefficients) with the reflection
//! formula below 0.5. Relative error is around 1e-15 over the positive reals,
//! which is well below what the BDe sums need.

use std::f64::consts::PI;

use thiserror::Error;

const LANCZOS_G: f64 = 7.0;

const LANCZOS_COEF: [f64; 9] = [
    0.999_999_999_999_809_9,
    676.520_368_121_885_1,
    -1_259.139_216_722_402_8,
    771.323_428_777_653_1,
    -176.615_029_162_140_6,
    12.507_343_278_686_905,
    -0.138_571_095_265_720_12,
    9.984_369_578_019_572e-6,
    1.505_632_735_149_311_6e-7,
];

/// Domain failures of [`ln_gamma`].
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum LnGammaError {
    #[error("lngamma undefined for non-positive argument {0}")]
    NonPositive(f64),

    #[error("lngamma argument is not finite: {0}")]
    NotFinite(f64),
}

/// Natural logarithm of the gamma function for `x > 0`.
pub fn ln_gamma(x: f64) -> Result<f64, LnGammaError> {
    if !x.is_finite() {
        return Err(LnGammaError::NotFinite(x));
    }
    if x <= 0.0 {
        return Err(LnGammaError::NonPositive(x));
    }
    Ok(ln_gamma_positive(x))
}

fn ln_gamma_positive(x: f64) -> f64 {
    if x < 0.5 {
        // Reflection: Γ(x)Γ(1-x) = π / sin(πx); sin(πx) > 0 on (0, 0.5).
        return (PI / (PI * x).sin()).ln() - ln_gamma_positive(1.0 - x);
    }
    let x = x - 1.0;
    let mut a = LANCZOS_COEF[0];
    let t = x + LANCZOS_G + 0.5;
    for (i, coef) in LANCZOS_COEF.iter().enumerate().skip(1) {
        a += coef / (x + i as f64);
    }
    0.5 * (2.0 * PI).ln() + (x + 0.5) * t.ln() - t + a.ln()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() <= tol * (1.0 + b.abs())
    }

    #[test]
    fn integers_match_factorials() {
        let mut fact = 1.0f64;
        for n in 1..20u32 {
            // Γ(n) = (n-1)!
            let got = ln_gamma(n as f64).unwrap();
            assert!(approx_eq(got, fact.ln(), 1e-12), "n={n} got={got}");
            fact *= n as f64;
        }
    }

    #[test]
    fn half_is_sqrt_pi() {
        let got = ln_gamma(0.5).unwrap();
        assert!(approx_eq(got, PI.sqrt().ln(), 1e-12));
    }

    #[test]
    fn small_arguments_use_reflection() {
        // Γ(0.25) ≈ 3.625609908221908
        let got = ln_gamma(0.25).unwrap();
        assert!(approx_eq(got, 3.625_609_908_221_908_f64.ln(), 1e-12));
    }

    #[test]
    fn rejects_non_positive() {
        assert_eq!(ln_gamma(0.0), Err(LnGammaError::NonPositive(0.0)));
        assert_eq!(ln_gamma(-2.5), Err(LnGammaError::NonPositive(-2.5)));
    }

    #[test]
    fn rejects_non_finite() {
        assert!(matches!(ln_gamma(f64::NAN), Err(LnGammaError::NotFinite(_))));
        assert!(matches!(
            ln_gamma(f64::INFINITY),
            Err(LnGammaError::NotFinite(_))
        ));
    }

    proptest! {
        #[test]
        fn recurrence_holds(x in 0.01f64..200.0) {
            // lnΓ(x+1) = ln(x) + lnΓ(x)
            let lhs = ln_gamma(x + 1.0).unwrap();
            let rhs = x.ln() + ln_gamma(x).unwrap();
            prop_assert!((lhs - rhs).abs() <= 1e-9 * (1.0 + lhs.abs()));
        }
    }
}
