//! Optimization algorithms
//!
//! Wrappers around argmin solvers behind a small strategy interface, plus an
//! [`Optimizer`] that tries strategies in order until one reports success.

use argmin::core::{CostFunction, Executor, Gradient, State, TerminationReason, TerminationStatus};
use argmin::solver::linesearch::MoreThuenteLineSearch;
use argmin::solver::neldermead::NelderMead;
use argmin::solver::quasinewton::LBFGS;
use pl_core::{Error, Result};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Objective function trait for optimization
pub trait ObjectiveFunction: Send + Sync {
    /// Evaluate function at given parameters
    fn eval(&self, params: &[f64]) -> Result<f64>;

    /// Compute gradient at given parameters (numerical if not overridden)
    fn gradient(&self, params: &[f64]) -> Result<Vec<f64>> {
        // Central differences, step = cbrt(machine_epsilon) * max(|x_i|, 1)
        let n = params.len();
        let mut grad = vec![0.0; n];
        let mut probe = params.to_vec();

        for i in 0..n {
            let eps = f64::EPSILON.cbrt() * params[i].abs().max(1.0);

            probe[i] = params[i] + eps;
            let f_plus = self.eval(&probe)?;
            probe[i] = params[i] - eps;
            let f_minus = self.eval(&probe)?;
            probe[i] = params[i];

            grad[i] = (f_plus - f_minus) / (2.0 * eps);
        }

        Ok(grad)
    }
}

/// Result of optimization
#[derive(Debug, Clone)]
pub struct OptimizationResult {
    /// Best-fit parameters
    pub parameters: Vec<f64>,
    /// Function value at the optimum
    pub fval: f64,
    /// Strategy that produced the result
    pub strategy: String,
    /// Number of iterations
    pub n_iter: u64,
    /// Number of objective (cost) evaluations.
    pub n_fev: usize,
    /// Number of gradient evaluations.
    pub n_gev: usize,
    /// Termination message
    pub message: String,
}

impl fmt::Display for OptimizationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "OptimizationResult(strategy={}, fval={:.6}, n_iter={}, n_fev={}, n_gev={})",
            self.strategy, self.fval, self.n_iter, self.n_fev, self.n_gev
        )
    }
}

/// One minimization algorithm.
///
/// Implementations return [`Error::OptimizerFailed`] when they do not reach a valid
/// optimum. Any other error is an error of the objective and must be returned as-is.
pub trait MinimizationStrategy: Send + Sync + fmt::Debug {
    /// Strategy name used in results and failure reports.
    fn name(&self) -> &str;

    /// Minimize `objective` starting from `x0`.
    fn minimize(&self, objective: &dyn ObjectiveFunction, x0: &[f64])
    -> Result<OptimizationResult>;
}

#[derive(Default)]
struct FuncCounts {
    cost: AtomicUsize,
    grad: AtomicUsize,
    /// First error raised by the objective itself.
    objective_error: Mutex<Option<Error>>,
}

impl FuncCounts {
    fn record(&self, e: Error) -> argmin::core::Error {
        let msg = e.to_string();
        if let Ok(mut slot) = self.objective_error.lock()
            && slot.is_none()
        {
            *slot = Some(e);
        }
        argmin::core::Error::msg(msg)
    }

    fn take_objective_error(&self) -> Option<Error> {
        self.objective_error.lock().ok().and_then(|mut slot| slot.take())
    }
}

/// Wrapper to make ObjectiveFunction compatible with argmin
struct ArgminProblem<'a> {
    objective: &'a dyn ObjectiveFunction,
    counts: Arc<FuncCounts>,
}

impl CostFunction for ArgminProblem<'_> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, params: &Self::Param) -> std::result::Result<Self::Output, argmin::core::Error> {
        self.counts.cost.fetch_add(1, Ordering::Relaxed);
        self.objective.eval(params).map_err(|e| self.counts.record(e))
    }
}

impl Gradient for ArgminProblem<'_> {
    type Param = Vec<f64>;
    type Gradient = Vec<f64>;

    fn gradient(
        &self,
        params: &Self::Param,
    ) -> std::result::Result<Self::Gradient, argmin::core::Error> {
        self.counts.grad.fetch_add(1, Ordering::Relaxed);
        self.objective.gradient(params).map_err(|e| self.counts.record(e))
    }
}

fn failed(strategy: &str, reason: impl Into<String>) -> Error {
    Error::OptimizerFailed { strategy: strategy.to_string(), reason: reason.into() }
}

/// Turn a finished argmin run into a result, or into the error it represents.
///
/// Objective errors take precedence over solver failures.
fn finish<S: State<Param = Vec<f64>, Float = f64>>(
    strategy: &str,
    run: std::result::Result<S, argmin::core::Error>,
    counts: &FuncCounts,
) -> Result<OptimizationResult> {
    if let Some(e) = counts.take_objective_error() {
        return Err(e);
    }
    let state = run.map_err(|e| failed(strategy, e.to_string()))?;

    let termination = state.get_termination_status();
    let converged = matches!(
        termination,
        TerminationStatus::Terminated(TerminationReason::SolverConverged)
            | TerminationStatus::Terminated(TerminationReason::TargetCostReached)
    );
    let message = termination.to_string();
    if !converged {
        return Err(failed(strategy, format!("did not converge: {message}")));
    }

    let parameters = state
        .get_best_param()
        .ok_or_else(|| failed(strategy, "no best parameters found"))?
        .clone();
    let fval = state.get_best_cost();
    if !fval.is_finite() || parameters.iter().any(|x| !x.is_finite()) {
        return Err(failed(strategy, format!("non-finite optimum (fval={fval})")));
    }

    Ok(OptimizationResult {
        parameters,
        fval,
        strategy: strategy.to_string(),
        n_iter: state.get_iter(),
        n_fev: counts.cost.load(Ordering::Relaxed),
        n_gev: counts.grad.load(Ordering::Relaxed),
        message,
    })
}

/// Configuration for the L-BFGS strategy
#[derive(Debug, Clone)]
pub struct LbfgsConfig {
    /// Maximum number of iterations
    pub max_iter: u64,
    /// Convergence tolerance for gradient norm
    pub tol: f64,
    /// Number of corrections to approximate inverse Hessian
    pub m: usize,
}

impl Default for LbfgsConfig {
    fn default() -> Self {
        Self { max_iter: 1000, tol: 1e-6, m: 10 }
    }
}

/// Quasi-Newton L-BFGS with More–Thuente line search on numerical gradients.
#[derive(Debug, Clone, Default)]
pub struct LbfgsStrategy {
    config: LbfgsConfig,
}

impl LbfgsStrategy {
    /// Create with the given configuration
    pub fn new(config: LbfgsConfig) -> Self {
        Self { config }
    }
}

impl MinimizationStrategy for LbfgsStrategy {
    fn name(&self) -> &str {
        "lbfgs"
    }

    fn minimize(
        &self,
        objective: &dyn ObjectiveFunction,
        x0: &[f64],
    ) -> Result<OptimizationResult> {
        let counts = Arc::new(FuncCounts::default());
        let problem = ArgminProblem { objective, counts: counts.clone() };

        let linesearch = MoreThuenteLineSearch::new();
        // Argmin's default cost tolerance is ~EPS, which is too strict for log-likelihood
        // scales and turns converged fits into max-iter terminations.
        let tol_cost =
            if self.config.tol == 0.0 { 0.0 } else { (0.1 * self.config.tol).max(1e-12) };
        let solver = LBFGS::new(linesearch, self.config.m)
            .with_tolerance_grad(self.config.tol)
            .map_err(|e| Error::Validation(format!("Invalid optimizer configuration (tol): {e}")))?
            .with_tolerance_cost(tol_cost)
            .map_err(|e| {
                Error::Validation(format!("Invalid optimizer configuration (tol_cost): {e}"))
            })?;

        let max_iter = self.config.max_iter;
        let run = Executor::new(problem, solver)
            .configure(|state| state.param(x0.to_vec()).max_iters(max_iter))
            .run()
            .map(|res| res.state);
        finish(self.name(), run, &counts)
    }
}

/// Configuration for the Nelder–Mead strategy
#[derive(Debug, Clone)]
pub struct NelderMeadConfig {
    /// Maximum number of iterations
    pub max_iter: u64,
    /// Stop when the standard deviation of the simplex costs drops below this
    pub sd_tolerance: f64,
    /// Relative size of the initial simplex
    pub rel_step: f64,
    /// Initial simplex step for coordinates equal to zero
    pub abs_step: f64,
}

impl Default for NelderMeadConfig {
    fn default() -> Self {
        Self { max_iter: 10_000, sd_tolerance: 1e-9, rel_step: 0.05, abs_step: 1e-3 }
    }
}

/// Derivative-free downhill simplex.
#[derive(Debug, Clone, Default)]
pub struct NelderMeadStrategy {
    config: NelderMeadConfig,
}

impl NelderMeadStrategy {
    /// Create with the given configuration
    pub fn new(config: NelderMeadConfig) -> Self {
        Self { config }
    }

    /// Initial simplex: `x0` plus one vertex per coordinate, perturbed by
    /// `rel_step * |x_i|` (or `abs_step` when `x_i == 0`).
    fn initial_simplex(&self, x0: &[f64]) -> Vec<Vec<f64>> {
        let mut vertices = Vec::with_capacity(x0.len() + 1);
        vertices.push(x0.to_vec());
        for i in 0..x0.len() {
            let step =
                if x0[i] == 0.0 { self.config.abs_step } else { self.config.rel_step * x0[i].abs() };
            let mut vertex = x0.to_vec();
            vertex[i] += step;
            vertices.push(vertex);
        }
        vertices
    }
}

impl MinimizationStrategy for NelderMeadStrategy {
    fn name(&self) -> &str {
        "nelder-mead"
    }

    fn minimize(
        &self,
        objective: &dyn ObjectiveFunction,
        x0: &[f64],
    ) -> Result<OptimizationResult> {
        let counts = Arc::new(FuncCounts::default());
        let problem = ArgminProblem { objective, counts: counts.clone() };

        let solver: NelderMead<Vec<f64>, f64> = NelderMead::new(self.initial_simplex(x0))
            .with_sd_tolerance(self.config.sd_tolerance)
            .map_err(|e| {
                Error::Validation(format!("Invalid optimizer configuration (sd_tolerance): {e}"))
            })?;

        let max_iter = self.config.max_iter;
        let run = Executor::new(problem, solver)
            .configure(|state| state.max_iters(max_iter))
            .run()
            .map(|res| res.state);
        finish(self.name(), run, &counts)
    }
}

/// Named optimizer presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Method {
    /// L-BFGS, falling back to Nelder–Mead.
    #[default]
    Chain,
    /// L-BFGS only.
    Lbfgs,
    /// Nelder–Mead only.
    NelderMead,
}

impl FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "chain" => Ok(Method::Chain),
            "lbfgs" | "l-bfgs" => Ok(Method::Lbfgs),
            "nelder-mead" | "neldermead" | "nelder_mead" => Ok(Method::NelderMead),
            other => Err(Error::Validation(format!(
                "unknown optimizer method '{other}' (expected chain, lbfgs or nelder-mead)"
            ))),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Method::Chain => "chain",
            Method::Lbfgs => "lbfgs",
            Method::NelderMead => "nelder-mead",
        })
    }
}

struct Negated<'a>(&'a dyn ObjectiveFunction);

impl ObjectiveFunction for Negated<'_> {
    fn eval(&self, params: &[f64]) -> Result<f64> {
        Ok(-self.0.eval(params)?)
    }

    fn gradient(&self, params: &[f64]) -> Result<Vec<f64>> {
        Ok(self.0.gradient(params)?.into_iter().map(|g| -g).collect())
    }
}

/// Ordered chain of minimization strategies.
///
/// The first strategy that succeeds wins. A strategy failure is logged and the next
/// strategy is tried; errors of the objective stop the chain immediately.
#[derive(Debug, Clone)]
pub struct Optimizer {
    strategies: Vec<Arc<dyn MinimizationStrategy>>,
}

impl Optimizer {
    /// Chain of the given strategies, tried in order.
    pub fn new(strategies: Vec<Arc<dyn MinimizationStrategy>>) -> Self {
        Self { strategies }
    }

    /// Preset chain.
    pub fn from_method(method: Method) -> Self {
        let lbfgs: Arc<dyn MinimizationStrategy> = Arc::new(LbfgsStrategy::default());
        let nelder_mead: Arc<dyn MinimizationStrategy> = Arc::new(NelderMeadStrategy::default());
        match method {
            Method::Chain => Self::new(vec![lbfgs, nelder_mead]),
            Method::Lbfgs => Self::new(vec![lbfgs]),
            Method::NelderMead => Self::new(vec![nelder_mead]),
        }
    }

    /// Strategies in the order they are tried.
    pub fn strategies(&self) -> &[Arc<dyn MinimizationStrategy>] {
        &self.strategies
    }

    /// Minimize `objective` starting from `x0`.
    ///
    /// A zero-dimensional problem is evaluated directly.
    pub fn minimize(
        &self,
        objective: &dyn ObjectiveFunction,
        x0: &[f64],
    ) -> Result<OptimizationResult> {
        if x0.is_empty() {
            let fval = objective.eval(x0)?;
            return Ok(OptimizationResult {
                parameters: Vec::new(),
                fval,
                strategy: "direct".to_string(),
                n_iter: 0,
                n_fev: 1,
                n_gev: 0,
                message: "no free parameters".to_string(),
            });
        }
        if self.strategies.is_empty() {
            return Err(Error::AllOptimizersFailed("no strategies configured".to_string()));
        }

        let mut failures = Vec::with_capacity(self.strategies.len());
        for strategy in &self.strategies {
            match strategy.minimize(objective, x0) {
                Ok(result) => {
                    log::debug!("optimizer: {result}");
                    return Ok(result);
                }
                Err(e) if e.is_optimizer_failure() => {
                    log::warn!("{e}; trying next strategy");
                    failures.push(e.to_string());
                }
                Err(e) => return Err(e),
            }
        }
        Err(Error::AllOptimizersFailed(failures.join("; ")))
    }

    /// Maximize `objective` starting from `x0`. `fval` is the maximum.
    pub fn maximize(
        &self,
        objective: &dyn ObjectiveFunction,
        x0: &[f64],
    ) -> Result<OptimizationResult> {
        let mut result = self.minimize(&Negated(objective), x0)?;
        result.fval = -result.fval;
        Ok(result)
    }
}

impl Default for Optimizer {
    fn default() -> Self {
        Self::from_method(Method::Chain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    // Simple test function: f(x, y) = (x - 2)^2 + (y - 3)^2
    // Minimum at (2, 3) with f = 0
    struct QuadraticFunction;

    impl ObjectiveFunction for QuadraticFunction {
        fn eval(&self, params: &[f64]) -> Result<f64> {
            let x = params[0];
            let y = params[1];
            Ok((x - 2.0).powi(2) + (y - 3.0).powi(2))
        }
    }

    // Rosenbrock: curved valley, minimum at (1, 1).
    struct Rosenbrock;

    impl ObjectiveFunction for Rosenbrock {
        fn eval(&self, p: &[f64]) -> Result<f64> {
            Ok((1.0 - p[0]).powi(2) + 100.0 * (p[1] - p[0] * p[0]).powi(2))
        }
    }

    struct MissingKey;

    impl ObjectiveFunction for MissingKey {
        fn eval(&self, _params: &[f64]) -> Result<f64> {
            Err(Error::missing("lg_rate"))
        }
    }

    #[derive(Debug)]
    struct AlwaysFails;

    impl MinimizationStrategy for AlwaysFails {
        fn name(&self) -> &str {
            "always-fails"
        }

        fn minimize(
            &self,
            _objective: &dyn ObjectiveFunction,
            _x0: &[f64],
        ) -> Result<OptimizationResult> {
            Err(failed(self.name(), "forced"))
        }
    }

    #[test]
    fn test_numerical_gradient() {
        let g = QuadraticFunction.gradient(&[0.0, 0.0]).unwrap();
        assert_relative_eq!(g[0], -4.0, epsilon = 1e-6);
        assert_relative_eq!(g[1], -6.0, epsilon = 1e-6);
    }

    #[test]
    fn test_lbfgs_quadratic() {
        let result = LbfgsStrategy::default().minimize(&QuadraticFunction, &[0.0, 0.0]).unwrap();
        println!("{}", result);
        assert_eq!(result.strategy, "lbfgs");
        assert_relative_eq!(result.parameters[0], 2.0, epsilon = 1e-4);
        assert_relative_eq!(result.parameters[1], 3.0, epsilon = 1e-4);
        assert_relative_eq!(result.fval, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_nelder_mead_rosenbrock() {
        let result = NelderMeadStrategy::default().minimize(&Rosenbrock, &[-1.2, 1.0]).unwrap();
        println!("{}", result);
        assert_relative_eq!(result.parameters[0], 1.0, epsilon = 1e-2);
        assert_relative_eq!(result.parameters[1], 1.0, epsilon = 1e-2);
    }

    #[test]
    fn test_fallback_after_forced_failure() {
        let optimizer =
            Optimizer::new(vec![Arc::new(AlwaysFails), Arc::new(NelderMeadStrategy::default())]);
        let result = optimizer.minimize(&QuadraticFunction, &[0.0, 0.0]).unwrap();
        assert_eq!(result.strategy, "nelder-mead");
        assert_relative_eq!(result.parameters[0], 2.0, epsilon = 1e-3);
        assert_relative_eq!(result.parameters[1], 3.0, epsilon = 1e-3);
    }

    #[test]
    fn test_all_failing() {
        let optimizer = Optimizer::new(vec![Arc::new(AlwaysFails), Arc::new(AlwaysFails)]);
        match optimizer.minimize(&QuadraticFunction, &[0.0, 0.0]) {
            Err(Error::AllOptimizersFailed(reasons)) => {
                assert_eq!(reasons.matches("always-fails").count(), 2)
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_objective_errors_are_not_swallowed() {
        for optimizer in [Optimizer::default(), Optimizer::from_method(Method::NelderMead)] {
            assert!(matches!(
                optimizer.minimize(&MissingKey, &[1.0]),
                Err(Error::MissingParameter { key }) if key == "lg_rate"
            ));
        }
    }

    #[test]
    fn test_maximize_and_direct_evaluation() {
        struct Peak;
        impl ObjectiveFunction for Peak {
            fn eval(&self, p: &[f64]) -> Result<f64> {
                Ok(5.0 - p.iter().map(|x| (x - 1.0).powi(2)).sum::<f64>())
            }
        }

        let result = Optimizer::default().maximize(&Peak, &[0.0]).unwrap();
        assert_relative_eq!(result.fval, 5.0, epsilon = 1e-8);
        assert_relative_eq!(result.parameters[0], 1.0, epsilon = 1e-4);

        let direct = Optimizer::default().maximize(&Peak, &[]).unwrap();
        assert_eq!(direct.strategy, "direct");
        assert_relative_eq!(direct.fval, 5.0);
    }

    #[test]
    fn test_method_parsing() {
        assert_eq!("Chain".parse::<Method>().unwrap(), Method::Chain);
        assert_eq!("LBFGS".parse::<Method>().unwrap(), Method::Lbfgs);
        assert_eq!("nelder-mead".parse::<Method>().unwrap(), Method::NelderMead);
        assert!("newton".parse::<Method>().is_err());
        assert_eq!(Method::NelderMead.to_string(), "nelder-mead");
        assert_eq!(Optimizer::from_method(Method::Lbfgs).strategies().len(), 1);
    }
}
