//! Likelihood terms: one tagged model plus the remap feeding it.

use crate::alias::Alias;
use crate::registry::ModelRegistry;
use crate::remap::RemapSpec;
use pl_core::{Error, Model, Params, Result, SimulateOptions, Value};
use rand::RngCore;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// Declarative description of a term, built into a [`LikelihoodTerm`] through a
/// [`ModelRegistry`].
#[derive(Debug, Clone)]
pub struct TermSpec {
    /// Unique tag within a likelihood.
    pub tag: String,
    /// Registered model kind.
    pub model: String,
    /// Input aliases.
    pub remap: RemapSpec,
}

impl TermSpec {
    /// Term `tag` using the model registered as `model`.
    pub fn new(tag: impl Into<String>, model: impl Into<String>) -> Self {
        Self { tag: tag.into(), model: model.into(), remap: RemapSpec::new() }
    }

    /// Alias argument `name`.
    pub fn arg(mut self, name: impl Into<String>, alias: impl Into<Alias>) -> Self {
        self.remap = self.remap.arg(name, alias);
        self
    }

    /// Alias observable `name`.
    pub fn obs(mut self, name: impl Into<String>, alias: impl Into<Alias>) -> Self {
        self.remap = self.remap.obs(name, alias);
        self
    }
}

/// A model bound to a tag and a validated remap. Immutable once built.
#[derive(Debug, Clone)]
pub struct LikelihoodTerm {
    tag: String,
    model: Arc<dyn Model>,
    remap: RemapSpec,
    param_needed: BTreeSet<String>,
    arg_param_needed: BTreeSet<String>,
    obs_param_needed: BTreeSet<String>,
}

impl LikelihoodTerm {
    /// Bind `model` to `remap`, validating the remap against the model's declared inputs.
    pub fn new(tag: impl Into<String>, model: Box<dyn Model>, remap: RemapSpec) -> Result<Self> {
        remap.validate(model.as_ref())?;
        let arg_param_needed = remap.arg_dependencies();
        let obs_param_needed = remap.obs_dependencies();
        let param_needed = arg_param_needed.union(&obs_param_needed).cloned().collect();
        Ok(Self {
            tag: tag.into(),
            model: Arc::from(model),
            remap,
            param_needed,
            arg_param_needed,
            obs_param_needed,
        })
    }

    /// Build from a spec through `registry`.
    pub fn from_spec(registry: &ModelRegistry, spec: TermSpec) -> Result<Self> {
        let model = registry.build(&spec.model)?;
        Self::new(spec.tag, model, spec.remap)
    }

    /// Term tag.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Underlying model.
    pub fn model(&self) -> &dyn Model {
        self.model.as_ref()
    }

    /// Input aliases.
    pub fn remap(&self) -> &RemapSpec {
        &self.remap
    }

    /// Every key of the flat dictionary this term reads.
    pub fn param_needed(&self) -> &BTreeSet<String> {
        &self.param_needed
    }

    /// Keys read by the argument aliases (all that simulation needs).
    pub fn arg_param_needed(&self) -> &BTreeSet<String> {
        &self.arg_param_needed
    }

    /// Keys read by the observable aliases.
    pub fn obs_param_needed(&self) -> &BTreeSet<String> {
        &self.obs_param_needed
    }

    /// Resolve the model arguments from `params`.
    pub fn resolve_args(&self, params: &Params) -> Result<Params> {
        resolve_inputs(self.model.arg_names(), &self.remap.arg, params)
    }

    /// Resolve the model observables from `params`.
    pub fn resolve_obs(&self, params: &Params) -> Result<Params> {
        resolve_inputs(self.model.obs_names(), &self.remap.obs, params)
    }

    /// This term's log-likelihood contribution at `params`.
    pub fn loglikelihood_from_param(&self, params: &Params) -> Result<f64> {
        let arg = self.resolve_args(params)?;
        let obs = self.resolve_obs(params)?;
        self.model.loglikelihood(&arg, &obs)
    }

    /// Draw observations from the model configured at `params`.
    pub fn simulate_from_param(
        &self,
        params: &Params,
        opts: SimulateOptions,
        rng: &mut dyn RngCore,
    ) -> Result<Value> {
        let arg = self.resolve_args(params)?;
        self.model.simulate(&arg, opts, rng)
    }
}

fn resolve_inputs(
    names: &[&'static str],
    aliases: &BTreeMap<String, Alias>,
    params: &Params,
) -> Result<Params> {
    names
        .iter()
        .map(|&name| -> Result<(String, Value)> {
            // Presence is checked when the term is built.
            let alias = aliases.get(name).ok_or_else(|| {
                Error::Computation(format!("no alias bound for input '{name}'"))
            })?;
            Ok((name.to_string(), alias.resolve(params)?))
        })
        .collect()
}

impl fmt::Display for LikelihoodTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}: {}(", self.tag, self.model.kind())?;
        for (name, alias) in &self.remap.obs {
            writeln!(f, "\t{name} = {alias}")?;
        }
        for (name, alias) in &self.remap.arg {
            writeln!(f, "\t{name} = {alias}")?;
        }
        write!(f, ")")
    }
}
