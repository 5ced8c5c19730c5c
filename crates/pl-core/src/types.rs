//! Common data types for proflik

use crate::traits::Template;
use crate::{Error, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Flat dictionary of named values.
///
/// Used for free parameters, bound data, and the resolved `arg`/`obs` inputs of a model.
/// Keys iterate in lexicographic order.
pub type Params = BTreeMap<String, Value>;

/// A value living in the flat parameter space or handed to a model.
#[derive(Clone)]
pub enum Value {
    /// Single number (rates, counts, constants).
    Scalar(f64),
    /// Sequence of numbers (event lists, simulated samples).
    Array(Arc<[f64]>),
    /// Shared density resource.
    Template(Arc<dyn Template>),
    /// Ordered group of values.
    Tuple(Vec<Value>),
}

impl Value {
    /// Variant name used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Scalar(_) => "scalar",
            Value::Array(_) => "array",
            Value::Template(_) => "template",
            Value::Tuple(_) => "tuple",
        }
    }

    /// Wrap a template resource.
    pub fn template(t: Arc<dyn Template>) -> Self {
        Value::Template(t)
    }

    /// Scalar payload.
    pub fn as_scalar(&self) -> Result<f64> {
        match self {
            Value::Scalar(v) => Ok(*v),
            other => Err(Error::TypeMismatch { expected: "scalar", found: other.kind() }),
        }
    }

    /// Array payload.
    pub fn as_array(&self) -> Result<&[f64]> {
        match self {
            Value::Array(v) => Ok(&v[..]),
            other => Err(Error::TypeMismatch { expected: "array", found: other.kind() }),
        }
    }

    /// Template payload.
    pub fn as_template(&self) -> Result<&Arc<dyn Template>> {
        match self {
            Value::Template(t) => Ok(t),
            other => Err(Error::TypeMismatch { expected: "template", found: other.kind() }),
        }
    }

    /// Tuple payload.
    pub fn as_tuple(&self) -> Result<&[Value]> {
        match self {
            Value::Tuple(v) => Ok(v.as_slice()),
            other => Err(Error::TypeMismatch { expected: "tuple", found: other.kind() }),
        }
    }

    /// Numbers held by a scalar, an array, or a tuple of scalars.
    pub fn to_f64_vec(&self) -> Result<Vec<f64>> {
        match self {
            Value::Scalar(v) => Ok(vec![*v]),
            Value::Array(v) => Ok(v.to_vec()),
            Value::Tuple(items) => items.iter().map(Value::as_scalar).collect(),
            other => Err(Error::TypeMismatch { expected: "numeric", found: other.kind() }),
        }
    }

    /// Number of elements (1 for scalars and templates).
    pub fn len(&self) -> usize {
        match self {
            Value::Scalar(_) | Value::Template(_) => 1,
            Value::Array(v) => v.len(),
            Value::Tuple(v) => v.len(),
        }
    }

    /// `true` for empty arrays and tuples.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Scalar(v)
    }
}

impl From<Vec<f64>> for Value {
    fn from(v: Vec<f64>) -> Self {
        Value::Array(v.into())
    }
}

impl From<&[f64]> for Value {
    fn from(v: &[f64]) -> Self {
        Value::Array(v.into())
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Tuple(v)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Scalar(a), Value::Scalar(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            // Templates are shared resources: equal when they are the same build.
            (Value::Template(a), Value::Template(b)) => Arc::ptr_eq(a, b),
            (Value::Tuple(a), Value::Tuple(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Scalar(v) => write!(f, "Scalar({v})"),
            Value::Array(v) => write!(f, "Array(len={})", v.len()),
            Value::Template(t) => write!(f, "Template({})", t.name()),
            Value::Tuple(v) => f.debug_tuple("Tuple").field(v).finish(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Scalar(v) => write!(f, "{v}"),
            Value::Array(v) => write!(f, "[{} values]", v.len()),
            Value::Template(t) => write!(f, "{}", t.name()),
            Value::Tuple(items) => {
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

/// Look up `key`, failing with [`Error::MissingParameter`].
pub fn lookup<'a>(params: &'a Params, key: &str) -> Result<&'a Value> {
    params.get(key).ok_or_else(|| Error::missing(key))
}

/// Build [`Params`] from `(name, scalar)` pairs.
pub fn scalars<K: Into<String>>(entries: impl IntoIterator<Item = (K, f64)>) -> Params {
    entries.into_iter().map(|(k, v)| (k.into(), Value::Scalar(v))).collect()
}

/// Overlay dictionaries left to right; later keys win.
pub fn merge_params<'a>(layers: impl IntoIterator<Item = &'a Params>) -> Params {
    let mut out = Params::new();
    for layer in layers {
        for (k, v) in layer {
            out.insert(k.clone(), v.clone());
        }
    }
    out
}
