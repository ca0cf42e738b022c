//! Claims domain errors

use core_kernel::{CoreError, MoneyError};
use thiserror::Error;

/// Errors that can occur in the claims domain
///
/// Every variant is raised before any state is touched, so an aggregate
/// that returned an error is exactly as it was before the call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClaimError {
    /// Malformed input to a constructor or mutator
    #[error("Validation error: {0}")]
    Validation(String),

    /// Operation not allowed in the aggregate's current state
    #[error("Illegal state: {0}")]
    IllegalState(String),

    #[error("Invalid status transition from {from} to {to}")]
    InvalidStatusTransition { from: String, to: String },
}

/// The two kinds of failure callers need to distinguish
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    IllegalState,
}

impl ClaimError {
    /// Creates a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        ClaimError::Validation(message.into())
    }

    /// Creates an illegal state error
    pub fn illegal_state(message: impl Into<String>) -> Self {
        ClaimError::IllegalState(message.into())
    }

    pub fn transition(from: impl std::fmt::Debug, to: impl std::fmt::Debug) -> Self {
        ClaimError::InvalidStatusTransition {
            from: format!("{:?}", from),
            to: format!("{:?}", to),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ClaimError::Validation(_) => ErrorKind::Validation,
            ClaimError::IllegalState(_) | ClaimError::InvalidStatusTransition { .. } => {
                ErrorKind::IllegalState
            }
        }
    }

    pub fn is_validation(&self) -> bool {
        self.kind() == ErrorKind::Validation
    }

    pub fn is_illegal_state(&self) -> bool {
        self.kind() == ErrorKind::IllegalState
    }
}

impl From<MoneyError> for ClaimError {
    fn from(err: MoneyError) -> Self {
        ClaimError::Validation(err.to_string())
    }
}

impl From<CoreError> for ClaimError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Money(money) => money.into(),
            other => ClaimError::Validation(other.to_string()),
        }
    }
}
