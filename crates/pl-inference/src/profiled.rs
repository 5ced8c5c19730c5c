//! Profile likelihood: maximization over a parameter subset with the rest held fixed.

use crate::bounds::ParamRanges;
use crate::likelihood::Likelihood;
use crate::optimizer::{ObjectiveFunction, Optimizer};
use pl_core::{Error, Params, Result, Value};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock};

/// Outcome of one profiling call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileFit {
    /// Maximized log-likelihood.
    pub loglikelihood: f64,
    /// Best-fit values of the profiled parameters.
    pub bestfit: BTreeMap<String, f64>,
    /// Strategy that produced the optimum (`"direct"` when nothing was profiled).
    pub strategy: String,
    /// Objective evaluations spent.
    pub n_fev: usize,
}

/// Objective seen by the optimizer: the profiled names overlaid on `fixed`.
struct ProfileObjective<'a, P: ?Sized> {
    target: &'a P,
    fixed: &'a Params,
    names: &'a [String],
}

impl<P: Profiled + ?Sized> ProfileObjective<'_, P> {
    fn params_at(&self, x: &[f64]) -> Params {
        let mut params = self.fixed.clone();
        for (name, &v) in self.names.iter().zip(x) {
            params.insert(name.clone(), Value::Scalar(v));
        }
        params
    }
}

impl<P: Profiled + ?Sized> ObjectiveFunction for ProfileObjective<'_, P> {
    fn eval(&self, x: &[f64]) -> Result<f64> {
        self.target.loglikelihood(&self.params_at(x))
    }
}

/// Shared profiling behaviour of single and combined likelihoods.
///
/// State machine: unbound → data bound → maximum known. Binding new data drops the
/// cached maximum.
pub trait Profiled: Send + Sync {
    /// Log-likelihood at `params`, bound data included.
    fn loglikelihood(&self, params: &Params) -> Result<f64>;

    /// Keys the likelihood reads.
    fn param_needed(&self) -> &BTreeSet<String>;

    /// Allowed parameter ranges.
    fn param_range(&self) -> &ParamRanges;

    /// Optimizer used for profiling.
    fn optimizer(&self) -> &Optimizer;

    /// Cached global maximum, if computed for the current data.
    fn max_loglikelihood(&self) -> Option<f64>;

    /// Cache the global maximum.
    fn store_max_loglikelihood(&mut self, value: f64);

    /// Bind a data dictionary. Drops any cached maximum.
    fn set_data(&mut self, data: Params) -> Result<()>;

    /// Independent copy: no state is shared with `self` afterwards.
    fn detached(&self) -> Result<Self>
    where
        Self: Sized;

    /// Generate one toy data dictionary at `params`.
    fn simulate(&self, params: &Params, rng: &mut dyn RngCore) -> Result<Params>;

    /// Simulate at `params` and bind the result as data.
    fn set_data_from_toymc(&mut self, params: &Params, rng: &mut dyn RngCore) -> Result<()> {
        let data = self.simulate(params, rng)?;
        self.set_data(data)
    }

    /// Maximize over the parameters named in `guess` (starting at the guessed values)
    /// with `fixed` held constant.
    ///
    /// An empty `guess` evaluates the likelihood at `fixed`.
    fn profile(&self, fixed: &Params, guess: &BTreeMap<String, f64>) -> Result<ProfileFit> {
        let names: Vec<String> = guess.keys().cloned().collect();
        let x0: Vec<f64> = guess.values().copied().collect();
        let objective = ProfileObjective { target: self, fixed, names: &names };

        let result = self.optimizer().maximize(&objective, &x0)?;
        log::debug!("profiled {names:?}: {result}");
        Ok(ProfileFit {
            loglikelihood: result.fval,
            bestfit: names.into_iter().zip(result.parameters).collect(),
            strategy: result.strategy,
            n_fev: result.n_fev,
        })
    }

    /// Profiled log-likelihood value (see [`Profiled::profile`]).
    fn profiled_loglikelihood(
        &self,
        fixed: &Params,
        guess: &BTreeMap<String, f64>,
    ) -> Result<f64> {
        Ok(self.profile(fixed, guess)?.loglikelihood)
    }

    /// Maximize over every parameter in `guess`, cache the maximum and return the
    /// best fit.
    fn set_max_loglikelihood(
        &mut self,
        guess: &BTreeMap<String, f64>,
    ) -> Result<BTreeMap<String, f64>> {
        let fit = self.profile(&Params::new(), guess)?;
        log::debug!("global maximum {} via {}", fit.loglikelihood, fit.strategy);
        self.store_max_loglikelihood(fit.loglikelihood);
        Ok(fit.bestfit)
    }

    /// Likelihood-ratio statistic `2 (max - profiled)`.
    fn chi2(&self, fixed: &Params, guess: &BTreeMap<String, f64>) -> Result<f64> {
        Ok(self.chi2_with_bestfit(fixed, guess)?.0)
    }

    /// [`Profiled::chi2`] together with the conditional best fit.
    fn chi2_with_bestfit(
        &self,
        fixed: &Params,
        guess: &BTreeMap<String, f64>,
    ) -> Result<(f64, BTreeMap<String, f64>)> {
        let max = self.max_loglikelihood().ok_or(Error::StaleMaximumUsed)?;
        let fit = self.profile(fixed, guess)?;
        Ok((2.0 * (max - fit.loglikelihood), fit.bestfit))
    }
}

/// A [`Likelihood`] with bound data, a cached maximum and an optimizer.
#[derive(Debug, Clone)]
pub struct ProfiledLikelihood {
    likelihood: Likelihood,
    data: Option<Params>,
    max_loglikelihood: Option<f64>,
    optimizer: Optimizer,
    generation: u64,
}

/// Handle shared between a standalone likelihood and the combinations it is part of.
pub type SharedProfiled = Arc<RwLock<ProfiledLikelihood>>;

impl ProfiledLikelihood {
    /// Wrap `likelihood` with the default optimizer chain.
    pub fn new(likelihood: Likelihood) -> Self {
        Self {
            likelihood,
            data: None,
            max_loglikelihood: None,
            optimizer: Optimizer::default(),
            generation: 0,
        }
    }

    /// Use `optimizer` for profiling.
    pub fn with_optimizer(mut self, optimizer: Optimizer) -> Self {
        self.optimizer = optimizer;
        self
    }

    /// Underlying likelihood.
    pub fn likelihood(&self) -> &Likelihood {
        &self.likelihood
    }

    /// Mutable access to the underlying likelihood. Drops any cached maximum.
    pub fn likelihood_mut(&mut self) -> &mut Likelihood {
        self.max_loglikelihood = None;
        self.generation += 1;
        &mut self.likelihood
    }

    /// Counter bumped whenever the data or the likelihood may have changed.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Bound data.
    pub fn data(&self) -> Option<&Params> {
        self.data.as_ref()
    }

    /// Wrap into a shareable handle.
    pub fn into_shared(self) -> SharedProfiled {
        Arc::new(RwLock::new(self))
    }
}

impl Profiled for ProfiledLikelihood {
    fn loglikelihood(&self, params: &Params) -> Result<f64> {
        let merged = match &self.data {
            None => Cow::Borrowed(params),
            Some(data) => {
                let mut merged = data.clone();
                merged.extend(params.iter().map(|(k, v)| (k.clone(), v.clone())));
                Cow::Owned(merged)
            }
        };
        self.likelihood.loglikelihood(&merged)
    }

    fn param_needed(&self) -> &BTreeSet<String> {
        self.likelihood.param_needed()
    }

    fn param_range(&self) -> &ParamRanges {
        self.likelihood.param_range()
    }

    fn optimizer(&self) -> &Optimizer {
        &self.optimizer
    }

    fn max_loglikelihood(&self) -> Option<f64> {
        self.max_loglikelihood
    }

    fn store_max_loglikelihood(&mut self, value: f64) {
        self.max_loglikelihood = Some(value);
    }

    fn set_data(&mut self, data: Params) -> Result<()> {
        if self.max_loglikelihood.take().is_some() {
            log::debug!("data re-bound; cached maximum dropped");
        }
        self.data = Some(data);
        self.generation += 1;
        Ok(())
    }

    fn detached(&self) -> Result<Self> {
        Ok(self.clone())
    }

    fn simulate(&self, params: &Params, rng: &mut dyn RngCore) -> Result<Params> {
        self.likelihood.simulate(params, rng)
    }
}
