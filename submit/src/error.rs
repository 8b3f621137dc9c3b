//! Error taxonomy for job expansion, rendering and dispatch.
//!
//! Request-scoped errors (`UnknownScript`, `UnknownMode`, `InvalidConfig`,
//! `InvalidSchedulerOption`, `TooManyJobs`) abort the whole request before any instance is
//! built. Everything else is scoped to a single job instance and ends up as a
//! `Failed` dispatch result.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("unknown script `{name}` (configured: {available})")]
    UnknownScript { name: String, available: String },

    #[error("unknown mode `{name}`: {reason}")]
    UnknownMode { name: String, reason: String },

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("invalid scheduler option: {0}")]
    InvalidSchedulerOption(String),

    #[error("grid expands to {requested} job(s), above the limit of {limit}")]
    TooManyJobs { requested: String, limit: usize },

    #[error("invalid value `{value}` for argument `{name}`: expected {expected}")]
    InvalidArgumentValue {
        name: String,
        value: String,
        expected: String,
    },

    #[error("template not found: {}", path.display())]
    TemplateNotFound { path: PathBuf },

    #[error("failed to render template {}: {reason}", path.display())]
    TemplateRenderError { path: PathBuf, reason: String },

    #[error("dispatch failed: {0}")]
    DispatchFailure(String),
}

impl SubmitError {
    /// True for errors that abort the whole request instead of one instance.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SubmitError::UnknownScript { .. }
                | SubmitError::UnknownMode { .. }
                | SubmitError::InvalidConfig(_)
                | SubmitError::InvalidSchedulerOption(_)
                | SubmitError::TooManyJobs { .. }
        )
    }
}

pub type SubmitResult<T> = std::result::Result<T, SubmitError>;
