//! Alias resolution: how a model input is computed from the flat parameter dictionary.

use pl_core::types::lookup;
use pl_core::{Error, Params, Result, Value};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Function behind a derived alias. Receives the dependency values in declared order.
pub type DerivedFn = Arc<dyn Fn(&[Value]) -> Result<Value> + Send + Sync>;

/// Rule producing one model input.
#[derive(Clone)]
pub enum Alias {
    /// Fixed value.
    Literal(Value),
    /// Value of a key in the flat dictionary.
    Lookup(String),
    /// Function of the listed keys. Empty `deps` denotes a closure over shared
    /// configuration (e.g. a template or a constant).
    Derived {
        /// Keys passed to `func`, in order.
        deps: Vec<String>,
        /// The function.
        func: DerivedFn,
        /// Rendering used by [`fmt::Display`].
        label: Option<String>,
    },
    /// Element-wise group.
    Tuple(Vec<Alias>),
}

impl Alias {
    /// Fixed value.
    pub fn literal(value: impl Into<Value>) -> Self {
        Alias::Literal(value.into())
    }

    /// Value of `key`.
    pub fn lookup(key: impl Into<String>) -> Self {
        Alias::Lookup(key.into())
    }

    /// Function of the values of `deps`.
    pub fn derived<I, S, F>(deps: I, func: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(&[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        Alias::Derived {
            deps: deps.into_iter().map(Into::into).collect(),
            func: Arc::new(func),
            label: None,
        }
    }

    /// Scalar function of scalar parameters, e.g. `10^lg_rate`.
    pub fn derived_scalar<I, S, F>(deps: I, func: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(&[f64]) -> f64 + Send + Sync + 'static,
    {
        Self::derived(deps, move |values: &[Value]| {
            let xs = values.iter().map(Value::as_scalar).collect::<Result<Vec<f64>>>()?;
            Ok(Value::Scalar(func(&xs)))
        })
    }

    /// Value computed without parameters (shared configuration).
    pub fn constant_fn<F>(func: F) -> Self
    where
        F: Fn() -> Result<Value> + Send + Sync + 'static,
    {
        Self::derived(std::iter::empty::<String>(), move |_: &[Value]| func())
    }

    /// Element-wise group.
    pub fn tuple(items: impl IntoIterator<Item = Alias>) -> Self {
        Alias::Tuple(items.into_iter().collect())
    }

    /// Attach a human-readable rendering to a derived alias. Other variants are returned
    /// unchanged.
    pub fn with_label(self, text: impl Into<String>) -> Self {
        match self {
            Alias::Derived { deps, func, .. } => {
                Alias::Derived { deps, func, label: Some(text.into()) }
            }
            other => other,
        }
    }

    /// Keys of the flat dictionary this alias reads.
    pub fn dependencies(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.collect_dependencies(&mut out);
        out
    }

    fn collect_dependencies(&self, out: &mut BTreeSet<String>) {
        match self {
            Alias::Literal(_) => {}
            Alias::Lookup(key) => {
                out.insert(key.clone());
            }
            Alias::Derived { deps, .. } => out.extend(deps.iter().cloned()),
            Alias::Tuple(items) => items.iter().for_each(|a| a.collect_dependencies(out)),
        }
    }

    /// Reject derived aliases that list a dependency twice.
    pub fn validate(&self) -> Result<()> {
        match self {
            Alias::Derived { deps, .. } => {
                let mut seen = BTreeSet::new();
                for dep in deps {
                    if !seen.insert(dep.as_str()) {
                        return Err(Error::Validation(format!(
                            "derived alias lists dependency '{dep}' more than once"
                        )));
                    }
                }
                Ok(())
            }
            Alias::Tuple(items) => items.iter().try_for_each(Alias::validate),
            Alias::Literal(_) | Alias::Lookup(_) => Ok(()),
        }
    }

    /// Compute the input value from `params`.
    pub fn resolve(&self, params: &Params) -> Result<Value> {
        match self {
            Alias::Literal(v) => Ok(v.clone()),
            Alias::Lookup(key) => lookup(params, key).cloned(),
            Alias::Derived { deps, func, .. } => {
                let values =
                    deps.iter().map(|k| lookup(params, k).cloned()).collect::<Result<Vec<_>>>()?;
                func(&values)
            }
            Alias::Tuple(items) => {
                Ok(Value::Tuple(items.iter().map(|a| a.resolve(params)).collect::<Result<_>>()?))
            }
        }
    }
}

impl From<&str> for Alias {
    fn from(key: &str) -> Self {
        Alias::Lookup(key.to_string())
    }
}

impl From<String> for Alias {
    fn from(key: String) -> Self {
        Alias::Lookup(key)
    }
}

impl From<f64> for Alias {
    fn from(v: f64) -> Self {
        Alias::Literal(Value::Scalar(v))
    }
}

impl From<Value> for Alias {
    fn from(v: Value) -> Self {
        Alias::Literal(v)
    }
}

impl fmt::Display for Alias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Alias::Literal(v) => write!(f, "{v}"),
            Alias::Lookup(key) => write!(f, "{key}"),
            Alias::Derived { label: Some(text), .. } => write!(f, "{text}"),
            Alias::Derived { deps, label: None, .. } => write!(f, "f({})", deps.join(", ")),
            Alias::Tuple(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
        }
    }
}

impl fmt::Debug for Alias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Alias::Literal(v) => f.debug_tuple("Literal").field(v).finish(),
            Alias::Lookup(key) => f.debug_tuple("Lookup").field(key).finish(),
            Alias::Derived { deps, label, .. } => {
                f.debug_struct("Derived").field("deps", deps).field("label", label).finish()
            }
            Alias::Tuple(items) => f.debug_tuple("Tuple").field(items).finish(),
        }
    }
}
