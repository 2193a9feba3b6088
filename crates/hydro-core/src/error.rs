//! Framework error type.
//!
//! Sub-crates define their own error enums and wrap `CoreError` as one
//! variant where they need to surface configuration problems.

use thiserror::Error;

/// The base error type for `hydro-core`.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CoreError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("field `{0}` is missing")]
    MissingField(String),

    #[error("field `{name}` is not finite ({value})")]
    NonFinite { name: String, value: f64 },
}

/// Shorthand result type for `hydro-core`.
pub type CoreResult<T> = Result<T, CoreError>;
