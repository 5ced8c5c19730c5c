//! Model registry: maps a model kind to its constructor.

use crate::models::{GaussianModel, PoissonModel};
use pl_core::{Error, Model, Result};
use pl_unbinned::{MultiSourceUnbinnedPdf, SingleSourceUnbinnedPdf};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Constructor of a registered model kind.
pub type ModelCtor = Arc<dyn Fn() -> Box<dyn Model> + Send + Sync>;

fn default_ctor<M: Model + Default + 'static>() -> ModelCtor {
    Arc::new(|| -> Box<dyn Model> { Box::new(M::default()) })
}

/// Explicit `kind -> constructor` table used when defining likelihood terms.
#[derive(Clone, Default)]
pub struct ModelRegistry {
    ctors: BTreeMap<String, ModelCtor>,
}

impl ModelRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in kinds: `poisson`, `gaussian`,
    /// `single_source_unbinned_pdf` and `multi_source_unbinned_pdf`.
    pub fn with_builtins() -> Self {
        let mut ctors: BTreeMap<String, ModelCtor> = BTreeMap::new();
        ctors.insert(PoissonModel::KIND.into(), default_ctor::<PoissonModel>());
        ctors.insert(GaussianModel::KIND.into(), default_ctor::<GaussianModel>());
        ctors.insert(SingleSourceUnbinnedPdf::KIND.into(), default_ctor::<SingleSourceUnbinnedPdf>());
        ctors.insert(MultiSourceUnbinnedPdf::KIND.into(), default_ctor::<MultiSourceUnbinnedPdf>());
        Self { ctors }
    }

    /// Register `kind`. Fails if the kind is already taken.
    pub fn register<F>(&mut self, kind: impl Into<String>, ctor: F) -> Result<()>
    where
        F: Fn() -> Box<dyn Model> + Send + Sync + 'static,
    {
        let kind = kind.into();
        if self.ctors.contains_key(&kind) {
            return Err(Error::Validation(format!("model kind '{kind}' is already registered")));
        }
        self.ctors.insert(kind, Arc::new(ctor));
        Ok(())
    }

    /// Register `kind`, overwriting any previous constructor.
    pub fn replace<F>(&mut self, kind: impl Into<String>, ctor: F)
    where
        F: Fn() -> Box<dyn Model> + Send + Sync + 'static,
    {
        let kind = kind.into();
        if self.ctors.insert(kind.clone(), Arc::new(ctor)).is_some() {
            log::debug!("model kind '{kind}' re-registered");
        }
    }

    /// `true` if `kind` is registered.
    pub fn contains(&self, kind: &str) -> bool {
        self.ctors.contains_key(kind)
    }

    /// Registered kinds, sorted.
    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.ctors.keys().map(String::as_str)
    }

    /// Construct a model of `kind`.
    pub fn build(&self, kind: &str) -> Result<Box<dyn Model>> {
        let ctor = self.ctors.get(kind).ok_or_else(|| Error::UnknownModel(kind.to_string()))?;
        Ok(ctor())
    }
}

impl fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelRegistry").field("kinds", &self.ctors.keys()).finish()
    }
}
