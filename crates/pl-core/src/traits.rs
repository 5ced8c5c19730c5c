//! Core traits for proflik
//!
//! This module defines the seams between the likelihood engine and the things it
//! evaluates: statistical models (one additive log-likelihood term each) and the shared
//! density resources those models consume. High-level profiling logic (pl-inference)
//! depends on these traits, not on concrete model or template implementations.

use crate::{Params, Result, Value};
use rand::RngCore;
use std::fmt;

/// Shared probability-density resource (e.g. a histogram template built from MC).
pub trait Template: Send + Sync + fmt::Debug {
    /// Resource name (the configuration key it was built under).
    fn name(&self) -> &str;

    /// Normalized density at `x`.
    fn pdf(&self, x: f64) -> f64;

    /// Expected number of events represented by the template.
    fn normalization(&self) -> f64;

    /// Draw `count` events from the density.
    fn draw(&self, count: usize, rng: &mut dyn RngCore) -> Vec<f64>;
}

/// Options forwarded to [`Model::simulate`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimulateOptions {
    /// Number of draws. `None` asks the model for its natural single outcome.
    pub size: Option<usize>,
}

impl SimulateOptions {
    /// Request `size` draws.
    pub fn with_size(size: usize) -> Self {
        Self { size: Some(size) }
    }
}

/// Statistical model trait
///
/// A model declares the argument and observable names it needs. The likelihood engine
/// resolves those names from the flat parameter space and hands them over as `arg` and
/// `obs` dictionaries.
pub trait Model: Send + Sync + fmt::Debug {
    /// Model kind (registry key), e.g. `"poisson"`.
    fn kind(&self) -> &str;

    /// Required argument names.
    fn arg_names(&self) -> &[&'static str];

    /// Required observable names.
    fn obs_names(&self) -> &[&'static str];

    /// Log-likelihood of `obs` under the model configured by `arg`.
    ///
    /// Invalid inputs either propagate to `-inf` or fail with
    /// [`crate::Error::InvalidModelInput`]; they are never clamped.
    fn loglikelihood(&self, arg: &Params, obs: &Params) -> Result<f64>;

    /// Draw synthetic observations.
    fn simulate(&self, arg: &Params, opts: SimulateOptions, rng: &mut dyn RngCore)
    -> Result<Value>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::lookup;

    #[derive(Debug)]
    struct ConstantModel;

    impl Model for ConstantModel {
        fn kind(&self) -> &str {
            "constant"
        }

        fn arg_names(&self) -> &[&'static str] {
            &["c"]
        }

        fn obs_names(&self) -> &[&'static str] {
            &[]
        }

        fn loglikelihood(&self, arg: &Params, _obs: &Params) -> Result<f64> {
            lookup(arg, "c")?.as_scalar()
        }

        fn simulate(
            &self,
            arg: &Params,
            opts: SimulateOptions,
            _rng: &mut dyn RngCore,
        ) -> Result<Value> {
            let c = lookup(arg, "c")?.as_scalar()?;
            Ok(match opts.size {
                Some(n) => Value::from(vec![c; n]),
                None => Value::Scalar(c),
            })
        }
    }

    #[test]
    fn test_model_object_safety() {
        use rand::SeedableRng;

        let model: Box<dyn Model> = Box::new(ConstantModel);
        let arg = crate::types::scalars([("c", -1.5)]);
        assert_eq!(model.kind(), "constant");
        assert_eq!(model.loglikelihood(&arg, &Params::new()).unwrap(), -1.5);

        let mut rng = rand::rngs::StdRng::seed_from_u64(0);
        let sim = model.simulate(&arg, SimulateOptions::with_size(3), &mut rng).unwrap();
        assert_eq!(sim.as_array().unwrap(), &[-1.5, -1.5, -1.5]);
    }
}
