//! Soft parameter ranges.
//!
//! Ranges never clip parameters. A value outside its range adds an exponential
//! penalty to the log-likelihood so optimizers are pushed back inside.

use pl_core::{Error, Params, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Penalty for one value against `[low, high]`.
///
/// `-exp(low - x)` below the range, `-exp(x - high)` above it, `0` inside (bounds
/// included).
pub fn boundary_penalty(x: f64, low: f64, high: f64) -> f64 {
    if x < low {
        -(low - x).exp()
    } else if x > high {
        -(x - high).exp()
    } else {
        0.0
    }
}

/// `key -> (low, high)` allowed ranges.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParamRanges(BTreeMap<String, (f64, f64)>);

impl ParamRanges {
    /// No ranges.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set (or overwrite) the range of `key`.
    pub fn set(&mut self, key: impl Into<String>, low: f64, high: f64) -> Result<()> {
        let key = key.into();
        if low.is_nan() || high.is_nan() || low > high {
            return Err(Error::Validation(format!(
                "invalid range for '{key}': ({low}, {high})"
            )));
        }
        self.0.insert(key, (low, high));
        Ok(())
    }

    /// Merge `entries`; later entries overwrite earlier ones for the same key.
    pub fn extend<K, I>(&mut self, entries: I) -> Result<()>
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, (f64, f64))>,
    {
        for (key, (low, high)) in entries {
            self.set(key, low, high)?;
        }
        Ok(())
    }

    /// Range of `key`.
    pub fn get(&self, key: &str) -> Option<(f64, f64)> {
        self.0.get(key).copied()
    }

    /// Ranges in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, (f64, f64))> {
        self.0.iter().map(|(k, &r)| (k.as_str(), r))
    }

    /// Number of ranged keys.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// `true` if no key is ranged.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Per-key intersection: keys from either side, `low = max`, `high = min` on shared
    /// keys. Disjoint ranges yield `low > high`.
    pub fn intersect(&self, other: &ParamRanges) -> ParamRanges {
        let mut out = self.0.clone();
        for (key, &(lo, hi)) in &other.0 {
            out.entry(key.clone())
                .and_modify(|r| *r = (r.0.max(lo), r.1.min(hi)))
                .or_insert((lo, hi));
        }
        ParamRanges(out)
    }

    /// Keys whose range is empty (`low > high`).
    pub fn degenerate_keys(&self) -> Vec<&str> {
        self.0.iter().filter(|(_, (lo, hi))| lo > hi).map(|(k, _)| k.as_str()).collect()
    }

    /// Summed penalty of the ranged keys present in `params`.
    pub fn penalty(&self, params: &Params) -> Result<f64> {
        let mut total = 0.0;
        for (key, &(lo, hi)) in &self.0 {
            if let Some(value) = params.get(key) {
                total += boundary_penalty(value.as_scalar()?, lo, hi);
            }
        }
        Ok(total)
    }
}

impl<K: Into<String>> FromIterator<(K, (f64, f64))> for ParamRanges {
    /// Collect without validation; used for derived (possibly degenerate) ranges.
    fn from_iter<I: IntoIterator<Item = (K, (f64, f64))>>(iter: I) -> Self {
        ParamRanges(iter.into_iter().map(|(k, r)| (k.into(), r)).collect())
    }
}
