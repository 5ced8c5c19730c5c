//! Named configuration cache.
//!
//! A [`ConfigStore`] is owned by one analysis session and holds values resolved by name:
//! numeric constants, template resources, file locations. Each key is written once; the
//! first resolution wins and later builders for the same key are never run.

use crate::{Error, Result, Value};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// JSON document used to seed a [`ConfigStore`].
///
/// ```json
/// {
///   "base_dir": "/data/templates",
///   "constants": { "exposure": 2.5 },
///   "templates": { "signal_template": "signal.json" }
/// }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConfigDocument {
    /// Directory relative template paths are resolved against.
    pub base_dir: Option<PathBuf>,
    /// Named numeric constants.
    pub constants: HashMap<String, f64>,
    /// Template name → file path.
    pub templates: HashMap<String, PathBuf>,
}

/// Write-once, name-keyed cache of configuration values.
#[derive(Debug, Default)]
pub struct ConfigStore {
    values: RwLock<HashMap<String, Value>>,
    base_dir: Option<PathBuf>,
    template_paths: HashMap<String, PathBuf>,
}

impl ConfigStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from an already parsed document.
    pub fn from_document(doc: ConfigDocument) -> Self {
        let values = doc.constants.into_iter().map(|(k, v)| (k, Value::Scalar(v))).collect();
        Self {
            values: RwLock::new(values),
            base_dir: doc.base_dir,
            template_paths: doc.templates,
        }
    }

    /// Seed from a JSON string.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let doc: ConfigDocument = serde_json::from_str(json)?;
        Ok(Self::from_document(doc))
    }

    /// Seed from a JSON file. A missing `base_dir` defaults to the file's directory.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let mut doc: ConfigDocument = serde_json::from_str(&text)?;
        if doc.base_dir.is_none() {
            doc.base_dir = path.parent().map(Path::to_path_buf);
        }
        Ok(Self::from_document(doc))
    }

    /// Set the directory relative template paths are resolved against.
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    /// `true` once `name` has been resolved or seeded.
    pub fn has(&self, name: &str) -> Result<bool> {
        Ok(self.read()?.contains_key(name))
    }

    /// Cached value for `name`, failing with [`Error::MissingConfig`].
    pub fn resolve(&self, name: &str) -> Result<Value> {
        self.read()?.get(name).cloned().ok_or_else(|| Error::MissingConfig(name.to_string()))
    }

    /// Seed `name` unless it is already present. Returns the cached value.
    pub fn insert(&self, name: &str, value: Value) -> Result<Value> {
        self.get_or_build(name, || Ok(value))
    }

    /// Cached value for `name`, running `build` on first access.
    ///
    /// A failing builder leaves the key unset.
    pub fn get_or_build<F>(&self, name: &str, build: F) -> Result<Value>
    where
        F: FnOnce() -> Result<Value>,
    {
        if let Some(v) = self.read()?.get(name) {
            return Ok(v.clone());
        }
        let built = build()?;
        let mut values = self.values.write().map_err(|_| poisoned())?;
        // Another caller may have resolved the key while we were building.
        let entry = values.entry(name.to_string()).or_insert_with(|| {
            log::debug!("config: resolved '{name}'");
            built
        });
        Ok(entry.clone())
    }

    /// Numeric constant `name`, seeding `default` on first access.
    pub fn constant(&self, name: &str, default: f64) -> Result<f64> {
        self.get_or_build(name, || Ok(Value::Scalar(default)))?.as_scalar()
    }

    /// File path registered for template `name`, or `default`, joined onto the base
    /// directory when relative.
    pub fn template_path(&self, name: &str, default: impl AsRef<Path>) -> PathBuf {
        let raw = self.template_paths.get(name).map(PathBuf::as_path).unwrap_or(default.as_ref());
        match &self.base_dir {
            Some(base) if raw.is_relative() => base.join(raw),
            _ => raw.to_path_buf(),
        }
    }

    /// Names currently cached, sorted.
    pub fn names(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.read()?.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, HashMap<String, Value>>> {
        self.values.read().map_err(|_| poisoned())
    }
}

fn poisoned() -> Error {
    Error::Computation("configuration store lock poisoned".to_string())
}
