//! Error types for the engine.

use crate::store::StoreError;
use statsync_model::ModelError;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur in engine operations.
///
/// Validation errors (`UnknownUser`, `DuplicateUser`, `InvalidArgument`)
/// fail the initiating call synchronously. Remote failures never cross the
/// async boundary as errors; they surface on the `error` field of the
/// completion event for the operation that triggered them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// The operation referenced a user that is not registered.
    #[error("unknown user: {user_id}")]
    UnknownUser {
        /// The unregistered user id.
        user_id: String,
    },

    /// Add was called twice for the same user.
    #[error("user already added: {user_id}")]
    DuplicateUser {
        /// The already-registered user id.
        user_id: String,
    },

    /// A stat name or query argument failed validation.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the failure.
        message: String,
    },

    /// A remote store call failed.
    #[error("remote store error: {0}")]
    Remote(#[from] StoreError),
}

impl EngineError {
    /// Creates an unknown-user error.
    pub fn unknown_user(user_id: impl Into<String>) -> Self {
        Self::UnknownUser {
            user_id: user_id.into(),
        }
    }

    /// Creates a duplicate-user error.
    pub fn duplicate_user(user_id: impl Into<String>) -> Self {
        Self::DuplicateUser {
            user_id: user_id.into(),
        }
    }

    /// Creates an invalid-argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }
}

impl From<ModelError> for EngineError {
    fn from(err: ModelError) -> Self {
        Self::InvalidArgument {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        assert_eq!(
            EngineError::unknown_user("u1").to_string(),
            "unknown user: u1"
        );
        assert_eq!(
            EngineError::duplicate_user("u1").to_string(),
            "user already added: u1"
        );
    }

    #[test]
    fn model_errors_map_to_invalid_argument() {
        let err: EngineError = ModelError::EmptyStatName.into();
        assert!(matches!(err, EngineError::InvalidArgument { .. }));
    }

    #[test]
    fn store_errors_wrap() {
        let err: EngineError = StoreError::unavailable("connection refused").into();
        assert!(matches!(err, EngineError::Remote(_)));
        assert!(err.to_string().contains("connection refused"));
    }
}
