//! Error types for proflik

use thiserror::Error;

/// proflik error type
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Computation error
    #[error("Computation error: {0}")]
    Computation(String),

    /// Not implemented
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    /// An alias referenced a key absent from the flat parameter dictionary.
    #[error("missing parameter '{key}'")]
    MissingParameter {
        /// The missing key.
        key: String,
    },

    /// Two terms of one likelihood share a tag.
    #[error("duplicate likelihood term tag '{0}'")]
    DuplicateTag(String),

    /// A remap names an argument the model does not declare.
    #[error("model '{model}' does not take argument '{name}'")]
    UnknownArgument {
        /// Model kind.
        model: String,
        /// Offending argument name.
        name: String,
    },

    /// A remap names an observable the model does not declare.
    #[error("model '{model}' does not take observable '{name}'")]
    UnknownObservable {
        /// Model kind.
        model: String,
        /// Offending observable name.
        name: String,
    },

    /// A declared model input has no alias in the remap.
    #[error("model '{model}' requires an alias for '{name}'")]
    MissingAlias {
        /// Model kind.
        model: String,
        /// Input without an alias.
        name: String,
    },

    /// No constructor registered for a model kind.
    #[error("unknown model kind '{0}'")]
    UnknownModel(String),

    /// A named configuration entry was never resolved or seeded.
    #[error("missing configuration '{0}'")]
    MissingConfig(String),

    /// A value had a different variant than the consumer expected.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// Expected value kind.
        expected: &'static str,
        /// Actual value kind.
        found: &'static str,
    },

    /// A model received inputs outside its domain (e.g. a negative rate).
    #[error("invalid model input: {0}")]
    InvalidModelInput(String),

    /// One optimizer strategy did not produce a valid optimum.
    #[error("optimizer '{strategy}' failed: {reason}")]
    OptimizerFailed {
        /// Strategy name.
        strategy: String,
        /// Failure description.
        reason: String,
    },

    /// Every strategy of the optimizer chain failed.
    #[error("all optimizers failed: {0}")]
    AllOptimizersFailed(String),

    /// A likelihood ratio was requested before the global maximum was computed.
    #[error("maximum log-likelihood is not set; call set_max_loglikelihood first")]
    StaleMaximumUsed,
}

impl Error {
    /// `true` for failures the optimizer chain may recover from by trying the next strategy.
    pub fn is_optimizer_failure(&self) -> bool {
        matches!(self, Error::OptimizerFailed { .. })
    }

    /// Shorthand for [`Error::MissingParameter`].
    pub fn missing(key: impl Into<String>) -> Self {
        Error::MissingParameter { key: key.into() }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_strategy_failures_are_recoverable() {
        let failed = Error::OptimizerFailed { strategy: "lbfgs".into(), reason: "max iter".into() };
        assert!(failed.is_optimizer_failure());
        assert!(!Error::missing("x").is_optimizer_failure());
        assert!(!Error::InvalidModelInput("lam < 0".into()).is_optimizer_failure());
        assert!(!Error::AllOptimizersFailed("lbfgs; nelder-mead".into()).is_optimizer_failure());
    }

    #[test]
    fn test_messages_name_the_offender() {
        assert_eq!(Error::missing("lg_rate").to_string(), "missing parameter 'lg_rate'");
        let e = Error::UnknownArgument { model: "poisson".into(), name: "mu".into() };
        assert!(e.to_string().contains("'mu'"));
    }
}
