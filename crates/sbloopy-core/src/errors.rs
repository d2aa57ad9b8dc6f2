//! Structured error types shared across sbloopy crates.

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured payload attached to every [`SbError`] variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable machine readable error code.
    pub code: String,
    /// Human readable diagnostic message.
    pub message: String,
    /// Contextual key value pairs (model ids, timepoints, sizes).
    #[serde(default)]
    pub context: BTreeMap<String, String>,
    /// Optional hint that may help the caller resolve the issue.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ErrorInfo {
    /// Creates a new error payload with the provided code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            context: BTreeMap::new(),
            hint: None,
        }
    }

    /// Adds a context entry to the payload.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Sets a human readable hint for remediation.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code: {})", self.message, self.code)?;
        if !self.context.is_empty() {
            write!(f, " | context: [")?;
            for (idx, (key, value)) in self.context.iter().enumerate() {
                if idx > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{key}={value}")?;
            }
            write!(f, "]")?;
        }
        if let Some(hint) = &self.hint {
            write!(f, " | hint: {hint}")?;
        }
        Ok(())
    }
}

/// Error code raised when a dataset is sliced at a timepoint it never recorded.
pub const UNKNOWN_TIMEPOINT: &str = "dataset.unknown_timepoint";
/// Error code raised when more samples are requested than experiments exist.
pub const SAMPLING_UNDERFLOW: &str = "dataset.sampling_underflow";
/// Error code raised when a designed clamping has no row in the candidate pool.
pub const DEDUP_INCONSISTENCY: &str = "store.dedup_inconsistency";

/// Canonical error type for the sbloopy design loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "family", content = "detail")]
pub enum SbError {
    /// External learner, analyzer or designer failures.
    #[error("solver error: {0}")]
    Solver(ErrorInfo),
    /// Dataset access and sampling errors.
    #[error("dataset error: {0}")]
    Dataset(ErrorInfo),
    /// Persistent store and bookkeeping errors.
    #[error("store error: {0}")]
    Store(ErrorInfo),
    /// Invalid workflow or baseline configuration.
    #[error("config error: {0}")]
    Config(ErrorInfo),
    /// Serialization and schema errors.
    #[error("serde error: {0}")]
    Serde(ErrorInfo),
}

impl SbError {
    /// Returns a reference to the payload describing the error.
    pub fn info(&self) -> &ErrorInfo {
        match self {
            SbError::Solver(info)
            | SbError::Dataset(info)
            | SbError::Store(info)
            | SbError::Config(info)
            | SbError::Serde(info) => info,
        }
    }

    /// Returns the stable error code.
    pub fn code(&self) -> &str {
        &self.info().code
    }

    /// True when the error originated in an external solver call.
    pub fn is_solver_failure(&self) -> bool {
        matches!(self, SbError::Solver(_))
    }
}
