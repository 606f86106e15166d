//! Error types for casegen.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::validate::quality::QualityViolation;

#[derive(Debug, Error)]
pub enum Error {
    #[error("no crime template matches {0}")]
    TemplateMismatch(String),

    #[error("no suspect had any opportunity during the crime window ({0})")]
    ImpossibleCulprit(String),

    #[error("completion provider {provider} failed: {message}")]
    Provider { provider: String, message: String },

    #[error("duplicate case: {0}")]
    DuplicateCase(String),

    #[error("quality check failed: {}", format_violations(.0))]
    QualityViolation(Vec<QualityViolation>),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("no curriculum topics for {0}")]
    NoCurriculumTopics(String),

    #[error("phase {phase}: {message}")]
    Phase { phase: String, message: String },

    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("config error: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;

fn format_violations(violations: &[QualityViolation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Coarse error classification stored on failed jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    TemplateMismatch,
    ImpossibleCulprit,
    Provider,
    DuplicateCase,
    QualityViolation,
    InvalidRequest,
    Timeout,
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::TemplateMismatch => "template_mismatch",
            ErrorKind::ImpossibleCulprit => "impossible_culprit",
            ErrorKind::Provider => "provider",
            ErrorKind::DuplicateCase => "duplicate_case",
            ErrorKind::QualityViolation => "quality_violation",
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Internal => "internal",
        };
        write!(f, "{s}")
    }
}

impl Error {
    /// Whether a job hitting this error should be attempted again.
    ///
    /// Template mismatches, builder defects, duplicates and quality failures
    /// are structural: another attempt with the same seed reproduces them.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Provider { .. }
                | Error::Timeout(_)
                | Error::Storage(_)
                | Error::Io(_)
                | Error::Other(_)
        )
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::TemplateMismatch(_) | Error::NoCurriculumTopics(_) => {
                ErrorKind::TemplateMismatch
            }
            Error::ImpossibleCulprit(_) => ErrorKind::ImpossibleCulprit,
            Error::Provider { .. } => ErrorKind::Provider,
            Error::DuplicateCase(_) => ErrorKind::DuplicateCase,
            Error::QualityViolation(_) => ErrorKind::QualityViolation,
            Error::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Error::Timeout(_) => ErrorKind::Timeout,
            _ => ErrorKind::Internal,
        }
    }
}
