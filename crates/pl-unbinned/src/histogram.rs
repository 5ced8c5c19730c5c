//! Histogram templates: piecewise-constant densities built from binned MC.

use pl_core::{ConfigStore, Error, Result, Template, Value};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// Smallest density a template reports. Keeps `ln(pdf)` finite outside the support.
pub const PDF_FLOOR: f64 = 1e-99;

/// On-disk histogram template.
///
/// ```json
/// { "observable": "cs1", "bin_edges": [0, 1, 2], "bin_content": [10, 30], "pseudo_count": 0 }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateFile {
    /// Observable the histogram is binned in (informational).
    #[serde(default)]
    pub observable: Option<String>,
    /// Strictly increasing bin edges.
    pub bin_edges: Vec<f64>,
    /// Non-negative per-bin content (e.g. MC event counts).
    pub bin_content: Vec<f64>,
    /// Added to every bin before normalizing the shape.
    #[serde(default)]
    pub pseudo_count: f64,
}

/// One-dimensional piecewise-constant density built from a histogram.
///
/// The shape is normalized on the bin edges:
///
/// `p(x) = m_i / (x_{i+1} - x_i)` for `x ∈ [x_i, x_{i+1})`
///
/// where `m_i` is the probability mass of bin `i`. The normalization is the total bin
/// content, i.e. the number of events the template stands for; [`HistogramTemplate::scaled`]
/// rescales it without touching the shape.
#[derive(Debug, Clone)]
pub struct HistogramTemplate {
    name: String,
    bin_edges: Vec<f64>,
    density: Vec<f64>,
    cdf: Vec<f64>,
    norm: f64,
}

impl HistogramTemplate {
    /// Construct a template from edges and non-negative bin contents.
    pub fn from_edges_and_contents(
        name: impl Into<String>,
        bin_edges: Vec<f64>,
        bin_content: Vec<f64>,
        pseudo_count: f64,
    ) -> Result<Self> {
        let name = name.into();
        if bin_edges.len() < 2 {
            return Err(Error::Validation(format!(
                "template '{name}' requires at least 2 bin edges, got {}",
                bin_edges.len()
            )));
        }
        if bin_content.len() + 1 != bin_edges.len() {
            return Err(Error::Validation(format!(
                "template '{name}' bin_content length mismatch: expected {}, got {}",
                bin_edges.len() - 1,
                bin_content.len()
            )));
        }
        if !pseudo_count.is_finite() || pseudo_count < 0.0 {
            return Err(Error::Validation(format!(
                "template '{name}' pseudo_count must be finite and >=0, got {pseudo_count}"
            )));
        }
        for (i, w) in bin_content.iter().enumerate() {
            if !w.is_finite() || *w < 0.0 {
                return Err(Error::Validation(format!(
                    "template '{name}' bin_content[{i}] must be finite and >=0, got {w}"
                )));
            }
        }
        for (i, e) in bin_edges.iter().enumerate() {
            if !e.is_finite() {
                return Err(Error::Validation(format!(
                    "template '{name}' bin_edges[{i}] must be finite, got {e}"
                )));
            }
            if i > 0 && bin_edges[i - 1] >= *e {
                return Err(Error::Validation(format!(
                    "template '{name}' bin edges must be strictly increasing, got edges[{}]={} and edges[{i}]={e}",
                    i - 1,
                    bin_edges[i - 1],
                )));
            }
        }

        let total: f64 = bin_content.iter().map(|w| w + pseudo_count).sum();
        if !(total.is_finite() && total > 0.0) {
            return Err(Error::Validation(format!(
                "template '{name}' total content must be finite and >0 after pseudo_count, got {total}"
            )));
        }

        let mut density = Vec::with_capacity(bin_content.len());
        let mut cdf = Vec::with_capacity(bin_edges.len());
        cdf.push(0.0);
        let mut acc = 0.0;
        for (i, w) in bin_content.iter().enumerate() {
            let mass = (w + pseudo_count) / total;
            let width = bin_edges[i + 1] - bin_edges[i];
            density.push(mass / width);
            acc += mass;
            cdf.push(acc);
        }
        // Pin the last entry so inverse-CDF lookups never run off the end.
        if let Some(last) = cdf.last_mut() {
            *last = 1.0;
        }

        let norm: f64 = bin_content.iter().sum();
        Ok(Self { name, bin_edges, density, cdf, norm })
    }

    /// Build from a parsed template file.
    pub fn from_file_spec(name: impl Into<String>, spec: TemplateFile) -> Result<Self> {
        Self::from_edges_and_contents(name, spec.bin_edges, spec.bin_content, spec.pseudo_count)
    }

    /// Parse a JSON template document.
    pub fn from_json_str(name: impl Into<String>, json: &str) -> Result<Self> {
        let spec: TemplateFile = serde_json::from_str(json)?;
        Self::from_file_spec(name, spec)
    }

    /// Read a JSON template file.
    pub fn from_json_file(name: impl Into<String>, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Validation(format!("failed to read template file {}: {e}", path.display()))
        })?;
        Self::from_json_str(name, &text)
    }

    /// Copy with the normalization multiplied by `factor`.
    pub fn scaled(&self, factor: f64) -> Result<Self> {
        if !factor.is_finite() || factor < 0.0 {
            return Err(Error::Validation(format!(
                "template '{}' scale factor must be finite and >=0, got {factor}",
                self.name
            )));
        }
        let mut out = self.clone();
        out.norm *= factor;
        Ok(out)
    }

    /// Bin edges.
    pub fn bin_edges(&self) -> &[f64] {
        &self.bin_edges
    }

    /// Support `[low, high]`.
    pub fn support(&self) -> (f64, f64) {
        let lo = self.bin_edges[0];
        (lo, *self.bin_edges.last().unwrap_or(&lo))
    }

    /// Bin containing `x`, `None` outside the support. The upper edge belongs to the
    /// last bin.
    fn bin_index(&self, x: f64) -> Option<usize> {
        let (lo, hi) = self.support();
        if !(lo..=hi).contains(&x) {
            return None;
        }
        let n_bins = self.density.len();
        if x >= hi {
            return Some(n_bins - 1);
        }
        // `k` is the number of edges <= x, so bin index is k-1.
        let k = self.bin_edges.partition_point(|e| *e <= x);
        Some(k.saturating_sub(1).min(n_bins - 1))
    }

    /// Inverse CDF of the piecewise-constant density.
    fn quantile(&self, u: f64) -> f64 {
        let idx = self.cdf.partition_point(|&c| c < u);
        if idx == 0 {
            return self.bin_edges[0];
        }
        if idx >= self.cdf.len() {
            return self.support().1;
        }
        let (c0, c1) = (self.cdf[idx - 1], self.cdf[idx]);
        let (x0, x1) = (self.bin_edges[idx - 1], self.bin_edges[idx]);
        if c1 > c0 { x0 + (u - c0) * (x1 - x0) / (c1 - c0) } else { x0 }
    }
}

impl Template for HistogramTemplate {
    fn name(&self) -> &str {
        &self.name
    }

    fn pdf(&self, x: f64) -> f64 {
        if x.is_nan() {
            return f64::NAN;
        }
        match self.bin_index(x) {
            Some(i) => self.density[i].max(PDF_FLOOR),
            None => PDF_FLOOR,
        }
    }

    fn normalization(&self) -> f64 {
        self.norm
    }

    fn draw(&self, count: usize, rng: &mut dyn RngCore) -> Vec<f64> {
        // Uniform(0,1) from RngCore (open interval).
        #[inline]
        fn u01(rng: &mut dyn RngCore) -> f64 {
            (rng.next_u64() as f64 + 0.5) * (1.0 / 18446744073709551616.0_f64)
        }

        let (lo, hi) = self.support();
        (0..count).map(|_| self.quantile(u01(rng)).clamp(lo, hi)).collect()
    }
}

/// Template registered under `name` in `store`, loading it from its configured file
/// (or `default_path`) on first access.
pub fn load_template(
    store: &ConfigStore,
    name: &str,
    default_path: impl AsRef<Path>,
) -> Result<Arc<dyn Template>> {
    let value = store.get_or_build(name, || {
        let path = store.template_path(name, default_path);
        log::debug!("loading template '{name}' from {}", path.display());
        let template = HistogramTemplate::from_json_file(name, &path)?;
        Ok(Value::template(Arc::new(template)))
    })?;
    Ok(Arc::clone(value.as_template()?))
}
