//! Combination of independent likelihoods that share parameters.

use crate::bounds::ParamRanges;
use crate::optimizer::Optimizer;
use crate::profiled::{Profiled, ProfiledLikelihood, SharedProfiled};
use pl_core::{Error, Params, Result};
use rand::RngCore;
use std::collections::BTreeSet;
use std::sync::{RwLockReadGuard, RwLockWriteGuard};

fn poisoned() -> Error {
    Error::Computation("combined member lock poisoned".to_string())
}

fn read(member: &SharedProfiled) -> Result<RwLockReadGuard<'_, ProfiledLikelihood>> {
    member.read().map_err(|_| poisoned())
}

fn write(member: &SharedProfiled) -> Result<RwLockWriteGuard<'_, ProfiledLikelihood>> {
    member.write().map_err(|_| poisoned())
}

/// Sum of several [`ProfiledLikelihood`]s evaluated on one parameter point.
///
/// Members are shared handles: a member stays usable on its own and keeps its own
/// data, ranges and cached maximum. The combination's `param_needed` (union) and
/// `param_range` (per-key intersection) are derived when it is built; call
/// [`CombinedProfiledLikelihood::refresh`] after changing a member's terms or ranges.
///
/// The cached maximum remembers each member's generation when it was stored. Data
/// bound to a member directly makes it stale.
#[derive(Debug, Clone)]
pub struct CombinedProfiledLikelihood {
    members: Vec<SharedProfiled>,
    param_needed: BTreeSet<String>,
    param_range: ParamRanges,
    max_loglikelihood: Option<f64>,
    max_generations: Vec<u64>,
    optimizer: Optimizer,
}

impl CombinedProfiledLikelihood {
    /// Combine `members` (evaluated in the given order).
    pub fn new(members: Vec<SharedProfiled>) -> Result<Self> {
        let mut combined = Self {
            members,
            param_needed: BTreeSet::new(),
            param_range: ParamRanges::new(),
            max_loglikelihood: None,
            max_generations: Vec::new(),
            optimizer: Optimizer::default(),
        };
        combined.refresh()?;
        Ok(combined)
    }

    /// Use `optimizer` for profiling.
    pub fn with_optimizer(mut self, optimizer: Optimizer) -> Self {
        self.optimizer = optimizer;
        self
    }

    /// Member handles.
    pub fn members(&self) -> &[SharedProfiled] {
        &self.members
    }

    fn generations(&self) -> Result<Vec<u64>> {
        self.members.iter().map(|m| Ok(read(m)?.generation())).collect()
    }

    /// Re-derive the parameter union and range intersection from the members.
    ///
    /// Disjoint ranges are kept (`low > high`) and logged.
    pub fn refresh(&mut self) -> Result<()> {
        let mut needed = BTreeSet::new();
        let mut range = ParamRanges::new();
        for member in &self.members {
            let member = read(member)?;
            needed.extend(member.param_needed().iter().cloned());
            range = range.intersect(member.param_range());
        }
        for key in range.degenerate_keys() {
            log::warn!("combined likelihood: empty range for '{key}' after intersection");
        }
        self.param_needed = needed;
        self.param_range = range;
        self.max_loglikelihood = None;
        Ok(())
    }
}

impl Profiled for CombinedProfiledLikelihood {
    fn loglikelihood(&self, params: &Params) -> Result<f64> {
        let mut total = self.param_range.penalty(params)?;
        for member in &self.members {
            total += read(member)?.loglikelihood(params)?;
        }
        Ok(total)
    }

    fn param_needed(&self) -> &BTreeSet<String> {
        &self.param_needed
    }

    fn param_range(&self) -> &ParamRanges {
        &self.param_range
    }

    fn optimizer(&self) -> &Optimizer {
        &self.optimizer
    }

    fn max_loglikelihood(&self) -> Option<f64> {
        let max = self.max_loglikelihood?;
        match self.generations() {
            Ok(current) if current == self.max_generations => Some(max),
            Ok(_) => {
                log::debug!("combined likelihood: a member changed since the maximum was stored");
                None
            }
            Err(_) => None,
        }
    }

    fn store_max_loglikelihood(&mut self, value: f64) {
        match self.generations() {
            Ok(current) => {
                self.max_generations = current;
                self.max_loglikelihood = Some(value);
            }
            Err(e) => {
                log::warn!("combined likelihood: maximum not stored: {e}");
                self.max_loglikelihood = None;
            }
        }
    }

    /// Bind the same data to every member.
    ///
    /// Fails without touching any member when one of them is poisoned.
    fn set_data(&mut self, data: Params) -> Result<()> {
        self.max_loglikelihood = None;
        if self.members.iter().any(|m| m.is_poisoned()) {
            return Err(poisoned());
        }
        for member in &self.members {
            write(member)?.set_data(data.clone())?;
        }
        Ok(())
    }

    /// Deep copy: every member is cloned into a fresh handle.
    fn detached(&self) -> Result<Self> {
        let members = self
            .members
            .iter()
            .map(|m| Ok(read(m)?.detached()?.into_shared()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { members, ..self.clone() })
    }

    /// Merge member toys in member order. Later members overwrite shared keys.
    fn simulate(&self, params: &Params, rng: &mut dyn RngCore) -> Result<Params> {
        let mut out = Params::new();
        for member in &self.members {
            let toy = read(member)?.simulate(params, rng)?;
            for (key, value) in toy {
                if out.insert(key.clone(), value).is_some() {
                    log::debug!("combined toy: '{key}' overwritten by a later member");
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alias::Alias;
    use crate::likelihood::Likelihood;
    use crate::registry::ModelRegistry;
    use crate::term::TermSpec;
    use approx::assert_relative_eq;
    use pl_core::{SimulateOptions, scalars};
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn counting(tag: &str, n_key: &str, range: (f64, f64)) -> ProfiledLikelihood {
        let n_key = n_key.to_string();
        let mut lk = Likelihood::new();
        lk.define(
            &ModelRegistry::with_builtins(),
            [TermSpec::new(tag, "poisson")
                .arg("lam", Alias::derived_scalar(["lg_rate"], |v| 10f64.powf(v[0])))
                .obs("n", n_key.as_str())],
        )
        .unwrap();
        lk.set_param_range([("lg_rate", range)]).unwrap();
        let tag = tag.to_string();
        let lk = lk.with_simulator(move |lk, params, rng| {
            let n = lk.term(&tag)?.simulate_from_param(params, SimulateOptions::default(), rng)?;
            Ok([(n_key.clone(), n)].into_iter().collect())
        });
        ProfiledLikelihood::new(lk)
    }

    #[test]
    fn test_union_and_intersection() {
        let a = counting("a", "n_a", (0.0, 10.0)).into_shared();
        let b = counting("b", "n_b", (5.0, 20.0)).into_shared();
        let combined = CombinedProfiledLikelihood::new(vec![a, b]).unwrap();
        assert_eq!(combined.param_range().get("lg_rate"), Some((5.0, 10.0)));
        assert_eq!(
            combined.param_needed().iter().collect::<Vec<_>>(),
            vec!["lg_rate", "n_a", "n_b"]
        );
    }

    #[test]
    fn test_disjoint_ranges_are_not_an_error() {
        let a = counting("a", "n_a", (0.0, 1.0)).into_shared();
        let b = counting("b", "n_b", (2.0, 3.0)).into_shared();
        let combined = CombinedProfiledLikelihood::new(vec![a, b]).unwrap();
        assert_eq!(combined.param_range().degenerate_keys(), vec!["lg_rate"]);
    }

    #[test]
    fn test_loglikelihood_is_sum_of_members() {
        let a = counting("a", "n_a", (-5.0, 5.0)).into_shared();
        let b = counting("b", "n_b", (-5.0, 5.0)).into_shared();
        let combined = CombinedProfiledLikelihood::new(vec![a.clone(), b.clone()]).unwrap();
        let params = scalars([("lg_rate", 1.0), ("n_a", 8.0), ("n_b", 13.0)]);
        let sum = a.read().unwrap().loglikelihood(&params).unwrap()
            + b.read().unwrap().loglikelihood(&params).unwrap();
        assert_relative_eq!(combined.loglikelihood(&params).unwrap(), sum, epsilon = 1e-12);
    }

    #[test]
    fn test_toy_data_is_shared_by_all_members() {
        let a = counting("a", "n_a", (-5.0, 5.0)).into_shared();
        let b = counting("b", "n_b", (-5.0, 5.0)).into_shared();
        let mut combined = CombinedProfiledLikelihood::new(vec![a.clone(), b.clone()]).unwrap();

        let mut rng = StdRng::seed_from_u64(17);
        combined.set_data_from_toymc(&scalars([("lg_rate", 2.0)]), &mut rng).unwrap();

        let data_a = a.read().unwrap().data().cloned().unwrap();
        let data_b = b.read().unwrap().data().cloned().unwrap();
        assert_eq!(data_a, data_b);
        assert!(data_a.contains_key("n_a") && data_a.contains_key("n_b"));

        let guess: BTreeMap<String, f64> = [("lg_rate".to_string(), 1.5)].into_iter().collect();
        let bestfit = combined.set_max_loglikelihood(&guess).unwrap();
        let n_a = data_a["n_a"].as_scalar().unwrap();
        let n_b = data_a["n_b"].as_scalar().unwrap();
        // Two Poisson counts sharing one rate: the MLE is their mean.
        assert_relative_eq!(
            10f64.powf(bestfit["lg_rate"]),
            0.5 * (n_a + n_b),
            max_relative = 1e-4
        );

        // Members keep their own state.
        assert!(a.read().unwrap().max_loglikelihood().is_none());
    }

    #[test]
    fn test_simulate_collisions_overwrite() {
        let a = counting("a", "n", (-5.0, 5.0)).into_shared();
        let b = counting("b", "n", (-5.0, 5.0)).into_shared();
        let combined = CombinedProfiledLikelihood::new(vec![a, b]).unwrap();
        let mut rng = StdRng::seed_from_u64(2);
        let toy = combined.simulate(&scalars([("lg_rate", 1.0)]), &mut rng).unwrap();
        assert_eq!(toy.len(), 1);
    }

    #[test]
    fn test_member_rebinding_invalidates_combined_maximum() {
        let a = counting("a", "n", (-5.0, 5.0)).into_shared();
        let mut combined = CombinedProfiledLikelihood::new(vec![a.clone()]).unwrap();
        combined.set_data(scalars([("n", 5.0)])).unwrap();

        let guess: BTreeMap<String, f64> = [("lg_rate".to_string(), 0.5)].into_iter().collect();
        combined.set_max_loglikelihood(&guess).unwrap();
        let test_point = scalars([("lg_rate", 5f64.log10())]);
        assert!(combined.chi2(&test_point, &BTreeMap::new()).unwrap().abs() < 1e-6);

        a.write().unwrap().set_data(scalars([("n", 50.0)])).unwrap();
        assert!(combined.max_loglikelihood().is_none());
        assert!(matches!(
            combined.chi2(&test_point, &BTreeMap::new()),
            Err(Error::StaleMaximumUsed)
        ));

        let _ = a.write().unwrap().likelihood_mut();
        combined.set_max_loglikelihood(&guess).unwrap();
        assert!(combined.max_loglikelihood().is_some());
    }

    #[test]
    fn test_poisoned_member_fails_set_data() {
        let a = counting("a", "n_a", (-5.0, 5.0)).into_shared();
        let b = counting("b", "n_b", (-5.0, 5.0)).into_shared();
        let mut combined = CombinedProfiledLikelihood::new(vec![a.clone(), b.clone()]).unwrap();

        let held = Arc::clone(&b);
        let joined = std::thread::spawn(move || {
            let _guard = held.write().unwrap();
            panic!("poison member b");
        })
        .join();
        assert!(joined.is_err());

        let data = scalars([("n_a", 3.0), ("n_b", 4.0)]);
        assert!(matches!(combined.set_data(data), Err(Error::Computation(_))));
        assert!(a.read().unwrap().data().is_none());
    }

    #[test]
    fn test_detached_copy_owns_its_members() {
        let a = counting("a", "n_a", (-5.0, 5.0)).into_shared();
        let combined = CombinedProfiledLikelihood::new(vec![a.clone()]).unwrap();

        let mut copy = combined.detached().unwrap();
        copy.set_data(scalars([("n_a", 7.0)])).unwrap();

        assert!(a.read().unwrap().data().is_none());
        assert!(!Arc::ptr_eq(&copy.members()[0], &a));
        assert_eq!(copy.param_range().get("lg_rate"), Some((-5.0, 5.0)));
    }
}
