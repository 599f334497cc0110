//! Subrequest errors

use thiserror::Error;

/// Errors constructing or running a subrequest
#[derive(Debug, Error)]
pub enum SubrequestError {
    #[error("Invalid subrequest method: {0}")]
    InvalidMethod(String),

    #[error("Invalid subrequest path {path}: {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("Failed to build subrequest: {0}")]
    Build(String),

    #[error("Subrequest handler exited before committing a response")]
    Aborted,
}
