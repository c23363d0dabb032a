//! Error types for vocab-core.

use thiserror::Error;

/// Result type alias using CoreError.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised by the pure domain layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("invalid transition: cannot {action} while {state}")]
    InvalidTransition { action: String, state: String },

    #[error("invalid entity: {0}")]
    InvalidEntity(String),
}

impl CoreError {
    pub(crate) fn transition(action: impl Into<String>, state: impl std::fmt::Display) -> Self {
        Self::InvalidTransition {
            action: action.into(),
            state: state.to_string(),
        }
    }
}
