//! # pl-inference
//!
//! Likelihood composition and profile-likelihood inference for proflik.
//!
//! This crate provides:
//! - Aliases and remaps from the flat parameter space onto model inputs
//! - Tagged likelihood terms and their sum, with soft boundary penalties
//! - Profile likelihoods (single and combined) with cached global maxima
//! - An optimizer chain (L-BFGS, then Nelder–Mead) on top of argmin
//! - A thread-pool batch executor and seeded toy Monte Carlo studies
//!
//! ## Architecture
//!
//! Terms depend on the `Model` trait from pl-core, never on concrete models. Built-in
//! kinds are wired in through [`ModelRegistry::with_builtins`].

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Aliases: how one model input is computed from the flat parameter dictionary.
pub mod alias;
/// Parallel batch execution over identifiers.
pub mod batch;
/// Allowed parameter ranges and the soft boundary penalty.
pub mod bounds;
/// Sum of several profiled likelihoods sharing parameters.
pub mod combined;
/// Likelihood aggregation over tagged terms.
pub mod likelihood;
/// Built-in Poisson and Gaussian models.
pub mod models;
/// Generic numerical optimizer chain (argmin backend).
pub mod optimizer;
/// Profile likelihood with bound data and a cached maximum.
pub mod profiled;
/// Model kind → constructor table.
pub mod registry;
/// Remap specifications (model input → alias).
pub mod remap;
/// One model bound to a remap under a unique tag.
pub mod term;
/// Toy Monte Carlo likelihood-ratio studies.
pub mod toys;

pub use alias::{Alias, DerivedFn};
pub use batch::{compute_many, compute_many_with_progress};
pub use bounds::{ParamRanges, boundary_penalty};
pub use combined::CombinedProfiledLikelihood;
pub use likelihood::{Likelihood, Simulator};
pub use models::{GaussianModel, PoissonModel};
pub use optimizer::{
    LbfgsConfig, LbfgsStrategy, Method, MinimizationStrategy, NelderMeadConfig,
    NelderMeadStrategy, ObjectiveFunction, OptimizationResult, Optimizer,
};
pub use profiled::{ProfileFit, Profiled, ProfiledLikelihood, SharedProfiled};
pub use registry::{ModelCtor, ModelRegistry};
pub use remap::RemapSpec;
pub use term::{LikelihoodTerm, TermSpec};
pub use toys::{ToyConfig, ToyFit, toy_chi2};
