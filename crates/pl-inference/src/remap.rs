//! Per-term mapping from model inputs to aliases.

use crate::alias::Alias;
use pl_core::{Error, Model, Result};
use std::collections::{BTreeMap, BTreeSet};

/// `arg_name -> Alias` and `obs_name -> Alias` for one model.
#[derive(Debug, Clone, Default)]
pub struct RemapSpec {
    /// Argument aliases.
    pub arg: BTreeMap<String, Alias>,
    /// Observable aliases.
    pub obs: BTreeMap<String, Alias>,
}

impl RemapSpec {
    /// Empty remap.
    pub fn new() -> Self {
        Self::default()
    }

    /// Alias argument `name`.
    pub fn arg(mut self, name: impl Into<String>, alias: impl Into<Alias>) -> Self {
        self.arg.insert(name.into(), alias.into());
        self
    }

    /// Alias observable `name`.
    pub fn obs(mut self, name: impl Into<String>, alias: impl Into<Alias>) -> Self {
        self.obs.insert(name.into(), alias.into());
        self
    }

    /// Check the remap against the inputs `model` declares.
    pub fn validate(&self, model: &dyn Model) -> Result<()> {
        let kind = model.kind();
        for name in self.arg.keys() {
            if !model.arg_names().iter().any(|n| *n == name.as_str()) {
                return Err(Error::UnknownArgument { model: kind.to_string(), name: name.clone() });
            }
        }
        for name in self.obs.keys() {
            if !model.obs_names().iter().any(|n| *n == name.as_str()) {
                return Err(Error::UnknownObservable { model: kind.to_string(), name: name.clone() });
            }
        }
        let declared = model.arg_names().iter().map(|n| (n, &self.arg));
        let declared = declared.chain(model.obs_names().iter().map(|n| (n, &self.obs)));
        for (name, aliases) in declared {
            if !aliases.contains_key(*name) {
                return Err(Error::MissingAlias { model: kind.to_string(), name: name.to_string() });
            }
        }
        self.arg.values().chain(self.obs.values()).try_for_each(Alias::validate)
    }

    /// Keys read by the argument aliases.
    pub fn arg_dependencies(&self) -> BTreeSet<String> {
        self.arg.values().flat_map(Alias::dependencies).collect()
    }

    /// Keys read by the observable aliases.
    pub fn obs_dependencies(&self) -> BTreeSet<String> {
        self.obs.values().flat_map(Alias::dependencies).collect()
    }
}
