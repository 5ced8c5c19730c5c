//! Unbinned PDF models: per-event log-density sums over template mixtures.

use pl_core::types::lookup;
use pl_core::{Error, Model, Params, Result, SimulateOptions, Template, Value};
use rand::RngCore;
use rand_distr::{Binomial, Distribution};
use std::borrow::Cow;
use std::sync::Arc;

/// Event list of an `events` observable. A scalar counts as a single event.
fn events_of(value: &Value) -> Result<Cow<'_, [f64]>> {
    let events = match value {
        Value::Array(xs) => Cow::Borrowed(&xs[..]),
        Value::Scalar(x) => Cow::Owned(vec![*x]),
        other => return Err(Error::TypeMismatch { expected: "array", found: other.kind() }),
    };
    if let Some(x) = events.iter().find(|x| !x.is_finite()) {
        return Err(Error::InvalidModelInput(format!("events must be finite, got {x}")));
    }
    Ok(events)
}

/// Templates of a `templates` argument: a tuple of templates or a single template.
fn templates_of(value: &Value) -> Result<Vec<Arc<dyn Template>>> {
    match value {
        Value::Template(t) => Ok(vec![Arc::clone(t)]),
        Value::Tuple(items) => items.iter().map(|v| v.as_template().map(Arc::clone)).collect(),
        other => Err(Error::TypeMismatch { expected: "tuple of templates", found: other.kind() }),
    }
}

/// Mixture fractions from raw source weights.
fn mixture_fractions(weights: &[f64], n_sources: usize) -> Result<Vec<f64>> {
    if weights.len() != n_sources {
        return Err(Error::InvalidModelInput(format!(
            "got {} weights for {n_sources} templates",
            weights.len()
        )));
    }
    if let Some(w) = weights.iter().find(|w| !w.is_finite() || **w < 0.0) {
        return Err(Error::InvalidModelInput(format!("weights must be finite and >=0, got {w}")));
    }
    let total: f64 = weights.iter().sum();
    if !(total > 0.0) {
        return Err(Error::InvalidModelInput(format!("weights must sum to >0, got {total}")));
    }
    Ok(weights.iter().map(|w| w / total).collect())
}

/// Event count requested by `opts`: unbinned models draw a single event by default.
fn draw_count(opts: SimulateOptions) -> usize {
    opts.size.unwrap_or(1)
}

/// Events drawn from a single template.
///
/// `ln L = Σ_e ln pdf(x_e)`
#[derive(Debug, Default, Clone, Copy)]
pub struct SingleSourceUnbinnedPdf;

impl SingleSourceUnbinnedPdf {
    /// Registry key.
    pub const KIND: &'static str = "single_source_unbinned_pdf";
}

impl Model for SingleSourceUnbinnedPdf {
    fn kind(&self) -> &str {
        Self::KIND
    }

    fn arg_names(&self) -> &[&'static str] {
        &["template"]
    }

    fn obs_names(&self) -> &[&'static str] {
        &["events"]
    }

    fn loglikelihood(&self, arg: &Params, obs: &Params) -> Result<f64> {
        let template = lookup(arg, "template")?.as_template()?;
        let events = events_of(lookup(obs, "events")?)?;
        Ok(events.iter().map(|&x| template.pdf(x).ln()).sum())
    }

    fn simulate(
        &self,
        arg: &Params,
        opts: SimulateOptions,
        rng: &mut dyn RngCore,
    ) -> Result<Value> {
        let template = lookup(arg, "template")?.as_template()?;
        Ok(Value::from(template.draw(draw_count(opts), rng)))
    }
}

/// Events drawn from a weighted mixture of templates.
///
/// `ln L = Σ_e ln Σ_i f_i pdf_i(x_e)` with `f_i = w_i / Σ_j w_j`.
#[derive(Debug, Default, Clone, Copy)]
pub struct MultiSourceUnbinnedPdf;

impl MultiSourceUnbinnedPdf {
    /// Registry key.
    pub const KIND: &'static str = "multi_source_unbinned_pdf";
}

impl Model for MultiSourceUnbinnedPdf {
    fn kind(&self) -> &str {
        Self::KIND
    }

    fn arg_names(&self) -> &[&'static str] {
        &["templates", "weights"]
    }

    fn obs_names(&self) -> &[&'static str] {
        &["events"]
    }

    fn loglikelihood(&self, arg: &Params, obs: &Params) -> Result<f64> {
        let templates = templates_of(lookup(arg, "templates")?)?;
        let weights = lookup(arg, "weights")?.to_f64_vec()?;
        let fractions = mixture_fractions(&weights, templates.len())?;
        let events = events_of(lookup(obs, "events")?)?;

        Ok(events
            .iter()
            .map(|&x| {
                let p: f64 = templates.iter().zip(&fractions).map(|(t, f)| f * t.pdf(x)).sum();
                p.ln()
            })
            .sum())
    }

    fn simulate(
        &self,
        arg: &Params,
        opts: SimulateOptions,
        rng: &mut dyn RngCore,
    ) -> Result<Value> {
        let templates = templates_of(lookup(arg, "templates")?)?;
        let weights = lookup(arg, "weights")?.to_f64_vec()?;
        let fractions = mixture_fractions(&weights, templates.len())?;

        // Multinomial split as a chain of conditional binomials.
        let mut remaining = draw_count(opts) as u64;
        let mut mass_left = 1.0;
        let mut events = Vec::with_capacity(remaining as usize);
        for (i, (template, f)) in templates.iter().zip(&fractions).enumerate() {
            let n = if i + 1 == templates.len() {
                remaining
            } else if remaining == 0 || mass_left <= 0.0 {
                0
            } else {
                let p = (f / mass_left).clamp(0.0, 1.0);
                Binomial::new(remaining, p)
                    .map_err(|e| Error::Computation(format!("multinomial split failed: {e}")))?
                    .sample(&mut *rng)
            };
            remaining -= n;
            mass_left -= f;
            events.extend(template.draw(n as usize, rng));
        }
        Ok(Value::from(events))
    }
}
