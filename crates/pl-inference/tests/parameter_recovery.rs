//! Parameter recovery on a counting experiment with an ancillary rate measurement.
//!
//! `ln L(λ) = n ln λ - λ - (λ - 100)² / 200`, with `λ = 10^lg_rate`, peaks at
//! `λ̂ = 10 √n`.

use approx::assert_relative_eq;
use pl_core::{Error, Params, Result, SimulateOptions, Value, scalars};
use pl_inference::{
    Alias, Likelihood, MinimizationStrategy, ModelRegistry, NelderMeadStrategy, ObjectiveFunction,
    OptimizationResult, Optimizer, Profiled, ProfiledLikelihood, TermSpec,
};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::BTreeMap;
use std::sync::Arc;

fn rate() -> Alias {
    Alias::derived_scalar(["lg_rate"], |p| 10f64.powf(p[0])).with_label("10^lg_rate")
}

fn counting_with_constraint() -> Likelihood {
    let mut lk = Likelihood::new();
    lk.define(
        &ModelRegistry::with_builtins(),
        [
            TermSpec::new("count", "poisson").arg("lam", rate()).obs("n", "n"),
            TermSpec::new("rate_constraint", "gaussian")
                .arg("mu", 100.0)
                .arg("std", 10.0)
                .obs("x", rate()),
        ],
    )
    .unwrap();
    lk.set_param_range([("lg_rate", (-5.0, 5.0))]).unwrap();
    lk.with_simulator(|lk, params, rng| {
        let n = lk.term("count")?.simulate_from_param(params, SimulateOptions::default(), rng)?;
        Ok([("n".to_string(), n)].into_iter().collect())
    })
}

fn analytic_loglikelihood(n: f64, lam: f64) -> f64 {
    n * lam.ln() - lam - (lam - 100.0).powi(2) / 200.0
}

fn guess(lg_rate: f64) -> BTreeMap<String, f64> {
    [("lg_rate".to_string(), lg_rate)].into_iter().collect()
}

#[test]
fn test_mle_matches_closed_form() {
    let mut pl = ProfiledLikelihood::new(counting_with_constraint());
    pl.set_data(scalars([("n", 121.0)])).unwrap();

    let bestfit = pl.set_max_loglikelihood(&guess(2.0)).unwrap();
    let lam_hat = 10f64.powf(bestfit["lg_rate"]);
    assert_relative_eq!(lam_hat, 110.0, max_relative = 1e-4);

    // chi2 at the nominal rate, nothing left to profile.
    let chi2 = pl.chi2(&scalars([("lg_rate", 2.0)]), &BTreeMap::new()).unwrap();
    let expected =
        2.0 * (analytic_loglikelihood(121.0, 110.0) - analytic_loglikelihood(121.0, 100.0));
    assert_relative_eq!(chi2, expected, epsilon = 1e-4);
    assert!(chi2 > 0.0);
}

#[test]
fn test_toy_fit_recovers_closed_form() {
    let mut pl = ProfiledLikelihood::new(counting_with_constraint());
    let mut rng = StdRng::seed_from_u64(42);
    pl.set_data_from_toymc(&scalars([("lg_rate", 2.0)]), &mut rng).unwrap();

    let n = pl.data().unwrap()["n"].as_scalar().unwrap();
    assert!(n >= 0.0 && n.fract() == 0.0);

    let bestfit = pl.set_max_loglikelihood(&guess(2.0)).unwrap();
    let lam_hat = 10f64.powf(bestfit["lg_rate"]);
    assert_relative_eq!(lam_hat, 10.0 * n.sqrt(), max_relative = 1e-4);
}

#[test]
fn test_chi2_requires_maximum() {
    let mut pl = ProfiledLikelihood::new(counting_with_constraint());
    pl.set_data(scalars([("n", 100.0)])).unwrap();
    let test_point = scalars([("lg_rate", 2.0)]);

    assert!(matches!(pl.chi2(&test_point, &BTreeMap::new()), Err(Error::StaleMaximumUsed)));

    pl.set_max_loglikelihood(&guess(1.5)).unwrap();
    assert!(pl.chi2(&test_point, &BTreeMap::new()).is_ok());

    // New data invalidates the cached maximum.
    pl.set_data(scalars([("n", 90.0)])).unwrap();
    assert!(matches!(pl.chi2(&test_point, &BTreeMap::new()), Err(Error::StaleMaximumUsed)));
}

#[derive(Debug)]
struct Refuses;

impl MinimizationStrategy for Refuses {
    fn name(&self) -> &str {
        "refuses"
    }

    fn minimize(
        &self,
        _objective: &dyn ObjectiveFunction,
        _x0: &[f64],
    ) -> Result<OptimizationResult> {
        Err(Error::OptimizerFailed { strategy: self.name().to_string(), reason: "forced".into() })
    }
}

#[test]
fn test_forced_failure_falls_back_to_nelder_mead() {
    let optimizer =
        Optimizer::new(vec![Arc::new(Refuses), Arc::new(NelderMeadStrategy::default())]);
    let mut pl = ProfiledLikelihood::new(counting_with_constraint()).with_optimizer(optimizer);
    pl.set_data(scalars([("n", 121.0)])).unwrap();

    let fit = pl.profile(&Params::new(), &guess(2.0)).unwrap();
    assert_eq!(fit.strategy, "nelder-mead");
    assert_relative_eq!(10f64.powf(fit.bestfit["lg_rate"]), 110.0, max_relative = 1e-3);
}

#[test]
fn test_missing_data_is_not_swallowed_by_the_chain() {
    let pl = ProfiledLikelihood::new(counting_with_constraint());
    match pl.profile(&Params::new(), &guess(2.0)) {
        Err(Error::MissingParameter { key }) => assert_eq!(key, "n"),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_caller_value_overrides_bound_data() {
    let mut pl = ProfiledLikelihood::new(counting_with_constraint());
    pl.set_data(scalars([("n", 121.0)])).unwrap();

    let mut params = scalars([("lg_rate", 2.0)]);
    let bound = pl.loglikelihood(&params).unwrap();
    params.insert("n".to_string(), Value::Scalar(100.0));
    let overridden = pl.loglikelihood(&params).unwrap();

    assert_ne!(bound, overridden);
    let expected = pl.likelihood().loglikelihood(&params).unwrap();
    assert_relative_eq!(overridden, expected, epsilon = 1e-12);
}

#[test]
fn test_linear_rate_with_zero_count_fits_at_boundary() {
    let mut lk = Likelihood::new();
    lk.define(
        &ModelRegistry::with_builtins(),
        [TermSpec::new("count", "poisson").arg("lam", "mu").obs("n", "n")],
    )
    .unwrap();
    lk.set_param_range([("mu", (0.0, 100.0))]).unwrap();
    let mut pl = ProfiledLikelihood::new(lk);
    pl.set_data(scalars([("n", 0.0)])).unwrap();

    // Steps below zero must read as zero likelihood, not abort the fit.
    let mu: BTreeMap<String, f64> = [("mu".to_string(), 1.0)].into_iter().collect();
    let bestfit = pl.set_max_loglikelihood(&mu).unwrap();
    assert!(bestfit["mu"] >= 0.0 && bestfit["mu"] < 1e-3, "{bestfit:?}");
    assert!(pl.max_loglikelihood().unwrap() > -1e-3);
}
