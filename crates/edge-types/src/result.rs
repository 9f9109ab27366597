//! Result codes and the crate-wide [`EdgeError`] type.

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Outcome code of a core operation, as exposed to collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum ResultCode {
    Ok,
    /// The requesting authority did not match the required one.
    Denied,
    /// No such state, slot or transition exists at all.
    Invalid,
    /// A bounded operation exceeded its budget.
    Timeout,
    /// Version or capability mismatch.
    Unsupported,
    /// Engine-internal failure (e.g. unreachable escalation target).
    Error,
}

impl ResultCode {
    /// Collapse a `Result` into its code.
    pub fn of<T>(result: &Result<T, EdgeError>) -> Self {
        match result {
            Ok(_) => Self::Ok,
            Err(e) => e.code(),
        }
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "OK"),
            Self::Denied => write!(f, "DENIED"),
            Self::Invalid => write!(f, "INVALID"),
            Self::Timeout => write!(f, "TIMEOUT"),
            Self::Unsupported => write!(f, "UNSUPPORTED"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

/// Error returned by every fallible core operation.  Each variant maps to
/// exactly one non-`Ok` [`ResultCode`].
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeError {
    #[error("Denied: {0}")]
    Denied(String),

    #[error("Invalid: {0}")]
    Invalid(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Engine Error: {0}")]
    Error(String),
}

impl EdgeError {
    /// The [`ResultCode`] this error reports.
    pub fn code(&self) -> ResultCode {
        match self {
            Self::Denied(_) => ResultCode::Denied,
            Self::Invalid(_) => ResultCode::Invalid,
            Self::Timeout(_) => ResultCode::Timeout,
            Self::Unsupported(_) => ResultCode::Unsupported,
            Self::Error(_) => ResultCode::Error,
        }
    }
}
