//! # pl-unbinned
//!
//! Event-level (unbinned) likelihood pieces for proflik:
//! - [`HistogramTemplate`]: a 1-D piecewise-constant density built from MC histograms,
//!   with a normalization, an inverse-CDF sampler and a JSON file format.
//! - [`load_template`]: template resolution through a session [`pl_core::ConfigStore`].
//! - [`SingleSourceUnbinnedPdf`] and [`MultiSourceUnbinnedPdf`] models.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod histogram;
pub mod model;

pub use histogram::{HistogramTemplate, PDF_FLOOR, TemplateFile, load_template};
pub use model::{MultiSourceUnbinnedPdf, SingleSourceUnbinnedPdf};
