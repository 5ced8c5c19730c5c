//! Count and constraint models.

use pl_core::types::lookup;
use pl_core::{Error, Model, Params, Result, SimulateOptions, Value};
use rand::RngCore;
use rand_distr::{Distribution, Normal, Poisson};

/// Re-tag domain errors of the density helpers as model-input errors.
fn invalid_input(e: Error) -> Error {
    match e {
        Error::Validation(msg) => Error::InvalidModelInput(msg),
        other => other,
    }
}

/// Scalar argument `name`, required to be finite.
fn finite_arg(arg: &Params, name: &str) -> Result<f64> {
    let v = lookup(arg, name)?.as_scalar()?;
    if !v.is_finite() {
        return Err(Error::InvalidModelInput(format!("{name} must be finite, got {v}")));
    }
    Ok(v)
}

/// One draw as a scalar, `size` draws as an array.
fn draws(opts: SimulateOptions, mut sample: impl FnMut() -> f64) -> Value {
    match opts.size {
        None => Value::Scalar(sample()),
        Some(n) => Value::from((0..n).map(|_| sample()).collect::<Vec<f64>>()),
    }
}

/// Poisson counting model.
///
/// `ln L = n ln(lam) - lam - ln Γ(n+1)`, summed when `n` is an array of counts.
///
/// A negative rate has zero likelihood. It is rejected only when simulating.
#[derive(Debug, Default, Clone, Copy)]
pub struct PoissonModel;

impl PoissonModel {
    /// Registry key.
    pub const KIND: &'static str = "poisson";
}

impl Model for PoissonModel {
    fn kind(&self) -> &str {
        Self::KIND
    }

    fn arg_names(&self) -> &[&'static str] {
        &["lam"]
    }

    fn obs_names(&self) -> &[&'static str] {
        &["n"]
    }

    fn loglikelihood(&self, arg: &Params, obs: &Params) -> Result<f64> {
        let lam = finite_arg(arg, "lam")?;
        let counts = lookup(obs, "n")?.to_f64_vec()?;
        if lam < 0.0 {
            return Ok(f64::NEG_INFINITY);
        }
        counts.iter().try_fold(0.0, |acc, &n| -> Result<f64> {
            Ok(acc + pl_prob::poisson::logpmf(n, lam).map_err(invalid_input)?)
        })
    }

    fn simulate(
        &self,
        arg: &Params,
        opts: SimulateOptions,
        rng: &mut dyn RngCore,
    ) -> Result<Value> {
        let lam = finite_arg(arg, "lam")?;
        if lam < 0.0 {
            return Err(Error::InvalidModelInput(format!("lam must be >= 0, got {lam}")));
        }
        if lam == 0.0 {
            return Ok(draws(opts, || 0.0));
        }
        let dist = Poisson::new(lam).map_err(|e| Error::InvalidModelInput(e.to_string()))?;
        Ok(draws(opts, || dist.sample(&mut *rng)))
    }
}

/// Gaussian model, typically an ancillary constraint on a nuisance parameter.
///
/// `ln L = -0.5 ln(2π std²) - 0.5 (x - mu)² / std²`
#[derive(Debug, Default, Clone, Copy)]
pub struct GaussianModel;

impl GaussianModel {
    /// Registry key.
    pub const KIND: &'static str = "gaussian";
}

impl Model for GaussianModel {
    fn kind(&self) -> &str {
        Self::KIND
    }

    fn arg_names(&self) -> &[&'static str] {
        &["mu", "std"]
    }

    fn obs_names(&self) -> &[&'static str] {
        &["x"]
    }

    fn loglikelihood(&self, arg: &Params, obs: &Params) -> Result<f64> {
        let mu = lookup(arg, "mu")?.as_scalar()?;
        let std = lookup(arg, "std")?.as_scalar()?;
        let xs = lookup(obs, "x")?.to_f64_vec()?;
        xs.iter().try_fold(0.0, |acc, &x| -> Result<f64> {
            Ok(acc + pl_prob::normal::logpdf(x, mu, std).map_err(invalid_input)?)
        })
    }

    fn simulate(
        &self,
        arg: &Params,
        opts: SimulateOptions,
        rng: &mut dyn RngCore,
    ) -> Result<Value> {
        let mu = finite_arg(arg, "mu")?;
        let std = finite_arg(arg, "std")?;
        if std <= 0.0 {
            return Err(Error::InvalidModelInput(format!("std must be > 0, got {std}")));
        }
        let dist = Normal::new(mu, std).map_err(|e| Error::InvalidModelInput(e.to_string()))?;
        Ok(draws(opts, || dist.sample(&mut *rng)))
    }
}
