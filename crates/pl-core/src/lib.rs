//! # pl-core
//!
//! Core types, traits and errors for proflik.
//!
//! Everything the likelihood engine passes around lives here: the [`Value`] domain of
//! the flat parameter dictionary, the [`Model`] and [`Template`] seams, the
//! session-owned [`ConfigStore`], and the crate-wide [`Error`].

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::{ConfigDocument, ConfigStore};
pub use error::{Error, Result};
pub use traits::{Model, SimulateOptions, Template};
pub use types::{Params, Value, lookup, merge_params, scalars};
