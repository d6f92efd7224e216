//! Error types for fixture helpers

use thiserror::Error;

use crate::selectors::Role;

/// Result type alias using the fixtures error
pub type Result<T> = std::result::Result<T, FixtureError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FixtureError {
    #[error("Invalid amount '{input}': {reason}")]
    InvalidAmount { input: String, reason: String },

    #[error("Selector table has no entry for role '{0}'")]
    MissingRole(Role),

    #[error("Selector for role '{0}' has no match strategies")]
    EmptySelector(Role),
}

impl FixtureError {
    pub(crate) fn amount(input: &str, reason: impl Into<String>) -> Self {
        FixtureError::InvalidAmount {
            input: input.to_string(),
            reason: reason.into(),
        }
    }
}
