//! Poisson distribution utilities.

use pl_core::{Error, Result};
use statrs::function::gamma::ln_gamma;

/// Log-PMF of a Poisson distribution with mean `lam` at count `n`.
///
/// `n` is taken as a real number so observed counts can flow through the parameter
/// dictionary unchanged. Negative or fractional counts have zero probability.
pub fn logpmf(n: f64, lam: f64) -> Result<f64> {
    if !lam.is_finite() || lam < 0.0 {
        return Err(Error::Validation(format!("lam must be finite and >= 0, got {}", lam)));
    }
    if !n.is_finite() {
        return Err(Error::Validation(format!("n must be finite, got {}", n)));
    }
    if n < 0.0 || n.fract() != 0.0 {
        return Ok(f64::NEG_INFINITY);
    }
    if lam == 0.0 {
        return Ok(if n == 0.0 { 0.0 } else { f64::NEG_INFINITY });
    }
    Ok(n * lam.ln() - lam - ln_gamma(n + 1.0))
}
