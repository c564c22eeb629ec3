use azacc_config::ConfigError;
use azacc_domain::DomainError;
use azacc_driver::ApplyError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a test case stopped. Messages are reported verbatim.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("precheck failed: {0}")]
    Precheck(#[from] ConfigError),

    #[error("{0}")]
    Resolve(#[from] DomainError),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    UnexpectedResource(String),

    #[error("{0}")]
    LookupFailure(String),

    #[error("{0}")]
    UnexpectedApplyError(ApplyError),

    #[error("Expected an error but got none (pattern {pattern})")]
    ExpectedErrorMissing { pattern: String },

    #[error("Expected an error with pattern ({pattern}), no match on: {message}")]
    ExpectedErrorMismatch { pattern: String, message: String },

    #[error("invalid error pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("no value captured under {0:?}")]
    MissingCapture(String),

    #[error("Step {step} error: {source}")]
    Step {
        step: usize,
        #[source]
        source: Box<HarnessError>,
    },

    #[error("Error destroying resources: {0}")]
    Teardown(ApplyError),

    #[error("Check failed: {0}")]
    CheckDestroy(Box<HarnessError>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Precheck,
    ConfigurationConflict,
    NotFound,
    LookupFailure,
    UnexpectedResource,
    UnexpectedApplyError,
    ExpectedErrorMissing,
    ExpectedErrorMismatch,
    Teardown,
    Internal,
}

impl HarnessError {
    pub fn kind(&self) -> FailureKind {
        match self {
            HarnessError::Precheck(_) => FailureKind::Precheck,
            HarnessError::Resolve(DomainError::DiskNotFound { .. }) => FailureKind::NotFound,
            HarnessError::Resolve(_) => FailureKind::LookupFailure,
            HarnessError::NotFound(_) => FailureKind::NotFound,
            HarnessError::UnexpectedResource(_) => FailureKind::UnexpectedResource,
            HarnessError::LookupFailure(_) => FailureKind::LookupFailure,
            HarnessError::UnexpectedApplyError(e) if is_conflict(&e.to_string()) => {
                FailureKind::ConfigurationConflict
            }
            HarnessError::UnexpectedApplyError(_) => FailureKind::UnexpectedApplyError,
            HarnessError::ExpectedErrorMissing { .. } => FailureKind::ExpectedErrorMissing,
            HarnessError::ExpectedErrorMismatch { .. } => FailureKind::ExpectedErrorMismatch,
            HarnessError::Pattern(_) | HarnessError::MissingCapture(_) => FailureKind::Internal,
            HarnessError::Step { source, .. } => source.kind(),
            HarnessError::Teardown(_) => FailureKind::Teardown,
            HarnessError::CheckDestroy(inner) => inner.kind(),
        }
    }
}

/// Provider text for mutually exclusive disk fields.
fn is_conflict(message: &str) -> bool {
    message.contains("Conflict between `vhd_uri`")
}
