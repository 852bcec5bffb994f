//! Error types for the model crate.

use thiserror::Error;

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors that can occur when constructing or mutating model types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    /// A stat name was empty.
    #[error("stat name must not be empty")]
    EmptyStatName,

    /// A leaderboard query failed validation.
    #[error("invalid leaderboard query: {message}")]
    InvalidQuery {
        /// Description of the validation failure.
        message: String,
    },
}

impl ModelError {
    /// Creates an invalid query error.
    pub fn invalid_query(message: impl Into<String>) -> Self {
        Self::InvalidQuery {
            message: message.into(),
        }
    }
}
