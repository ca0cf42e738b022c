//! Errors shared by every crate

use thiserror::Error;
use crate::money::MoneyError;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Money(#[from] MoneyError),

    /// Input that no aggregate would accept
    #[error("invalid input: {0}")]
    Validation(String),

    /// A required text field was empty or whitespace
    #[error("{field} must not be blank")]
    Blank { field: String },
}

impl CoreError {
    pub fn validation(message: impl Into<String>) -> Self {
        CoreError::Validation(message.into())
    }
}

/// Rejects blank (empty or whitespace-only) required text
///
/// Returns the trimmed value on success.
pub fn require_text(field: &str, value: &str) -> Result<String, CoreError> {
    match value.trim() {
        "" => Err(CoreError::Blank {
            field: field.to_string(),
        }),
        trimmed => Ok(trimmed.to_string()),
    }
}
