use std::io;
use thiserror::Error;

/// Failures that stop a call before a response could be shown.
///
/// A curl run that exits non-zero, or a server answering with 4xx/5xx, is
/// not an error here: both still produce a `CallResult` with `ok = false`.
#[derive(Debug, Error)]
pub enum CallError {
    /// Bad template, missing path parameters or an unparsable URL.
    /// Nothing was dispatched.
    #[error("{0}")]
    Validation(String),

    #[error("{0} was not found on this machine. Install curl and retry.")]
    BinaryNotFound(String),

    #[error("{0} execution is blocked by OS policy or sandbox permissions.")]
    BinaryBlocked(String),

    #[error("Failed to execute {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: io::Error,
    },

    /// curl ran but its output could not be split back into parts.
    #[error("{message}")]
    Parse { message: String, raw_output: String },
}

impl CallError {
    pub fn is_validation(&self) -> bool {
        matches!(self, CallError::Validation(_))
    }

    pub fn is_launch(&self) -> bool {
        matches!(
            self,
            CallError::BinaryNotFound(_) | CallError::BinaryBlocked(_) | CallError::Spawn { .. }
        )
    }

    pub fn raw_output(&self) -> Option<&str> {
        match self {
            CallError::Parse { raw_output, .. } => Some(raw_output),
            _ => None,
        }
    }
}
