//! Likelihood aggregation over tagged terms.

use crate::bounds::ParamRanges;
use crate::registry::ModelRegistry;
use crate::term::{LikelihoodTerm, TermSpec};
use pl_core::{Error, Params, Result};
use rand::RngCore;
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::sync::Arc;

/// User-provided toy generator: returns the data dictionary for one pseudo-experiment.
pub type Simulator =
    Arc<dyn Fn(&Likelihood, &Params, &mut dyn RngCore) -> Result<Params> + Send + Sync>;

/// Sum of term log-likelihoods plus soft boundary penalties.
///
/// Terms are evaluated in insertion order. Tags are unique.
#[derive(Clone, Default)]
pub struct Likelihood {
    terms: Vec<LikelihoodTerm>,
    param_needed: BTreeSet<String>,
    param_range: ParamRanges,
    simulator: Option<Simulator>,
}

impl Likelihood {
    /// Likelihood without terms.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build `specs` through `registry` and append them.
    ///
    /// Either every spec is added or none is.
    pub fn define(
        &mut self,
        registry: &ModelRegistry,
        specs: impl IntoIterator<Item = TermSpec>,
    ) -> Result<()> {
        let mut tags: HashSet<String> = self.terms.iter().map(|t| t.tag().to_string()).collect();
        let mut built = Vec::new();
        for spec in specs {
            if !tags.insert(spec.tag.clone()) {
                return Err(Error::DuplicateTag(spec.tag));
            }
            built.push(LikelihoodTerm::from_spec(registry, spec)?);
        }
        for term in built {
            self.push(term);
        }
        Ok(())
    }

    /// Append an already built term.
    pub fn add_term(&mut self, term: LikelihoodTerm) -> Result<()> {
        if self.terms.iter().any(|t| t.tag() == term.tag()) {
            return Err(Error::DuplicateTag(term.tag().to_string()));
        }
        self.push(term);
        Ok(())
    }

    fn push(&mut self, term: LikelihoodTerm) {
        self.param_needed.extend(term.param_needed().iter().cloned());
        self.terms.push(term);
    }

    /// Term tagged `tag`.
    pub fn term(&self, tag: &str) -> Result<&LikelihoodTerm> {
        self.terms
            .iter()
            .find(|t| t.tag() == tag)
            .ok_or_else(|| Error::Validation(format!("no likelihood term tagged '{tag}'")))
    }

    /// Terms in evaluation order.
    pub fn terms(&self) -> &[LikelihoodTerm] {
        &self.terms
    }

    /// Union of every term's parameter dependencies.
    pub fn param_needed(&self) -> &BTreeSet<String> {
        &self.param_needed
    }

    /// Allowed parameter ranges.
    pub fn param_range(&self) -> &ParamRanges {
        &self.param_range
    }

    /// Merge `entries` into the allowed ranges; later calls overwrite the same key.
    pub fn set_param_range<K, I>(&mut self, entries: I) -> Result<()>
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, (f64, f64))>,
    {
        self.param_range.extend(entries)
    }

    /// Soft penalty of `params` against the allowed ranges (`<= 0`).
    pub fn boundary_penalty(&self, params: &Params) -> Result<f64> {
        self.param_range.penalty(params)
    }

    /// Penalty plus the sum of term contributions.
    pub fn loglikelihood(&self, params: &Params) -> Result<f64> {
        let mut total = self.boundary_penalty(params)?;
        for term in &self.terms {
            total += term.loglikelihood_from_param(params)?;
        }
        Ok(total)
    }

    /// Install the toy generator used by [`Likelihood::simulate`].
    pub fn set_simulator<F>(&mut self, simulator: F)
    where
        F: Fn(&Likelihood, &Params, &mut dyn RngCore) -> Result<Params> + Send + Sync + 'static,
    {
        self.simulator = Some(Arc::new(simulator));
    }

    /// Builder form of [`Likelihood::set_simulator`].
    pub fn with_simulator<F>(mut self, simulator: F) -> Self
    where
        F: Fn(&Likelihood, &Params, &mut dyn RngCore) -> Result<Params> + Send + Sync + 'static,
    {
        self.set_simulator(simulator);
        self
    }

    /// Generate one toy data dictionary at `params`.
    pub fn simulate(&self, params: &Params, rng: &mut dyn RngCore) -> Result<Params> {
        let simulator = self.simulator.as_ref().ok_or_else(|| {
            Error::NotImplemented("no simulator installed for this likelihood".to_string())
        })?;
        simulator(self, params, rng)
    }
}

impl fmt::Debug for Likelihood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Likelihood")
            .field("terms", &self.terms.iter().map(LikelihoodTerm::tag).collect::<Vec<_>>())
            .field("param_needed", &self.param_needed)
            .field("param_range", &self.param_range)
            .field("has_simulator", &self.simulator.is_some())
            .finish()
    }
}

/// Human-readable view of every term's remap.
impl fmt::Display for Likelihood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, term) in self.terms.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{term}")?;
        }
        Ok(())
    }
}
