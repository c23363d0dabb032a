//! Client error types.

use crate::db::DbError;
use thiserror::Error;
use vocab_core::CoreError;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict on {id}: expected revision {expected:?}, current is {current:?}")]
    Conflict {
        id: String,
        expected: Option<String>,
        current: Option<String>,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("invalid transition: cannot {action} while {state}")]
    InvalidTransition { action: String, state: String },

    #[error("invalid entity: {0}")]
    InvalidEntity(String),

    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("no candidates left to review")]
    NoCandidates,

    #[error("database error: {0}")]
    Db(#[from] DbError),

    #[error("http error: {0}")]
    Http(String),
}

impl From<CoreError> for StoreError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidConfiguration(message) => Self::InvalidConfiguration(message),
            CoreError::InvalidTransition { action, state } => {
                Self::InvalidTransition { action, state }
            }
            CoreError::InvalidEntity(message) => Self::InvalidEntity(message),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Db(DbError::Json(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_errors_keep_their_kind() {
        let err: StoreError = CoreError::InvalidConfiguration("en/en".into()).into();
        assert!(matches!(err, StoreError::InvalidConfiguration(_)));

        let err: StoreError = CoreError::InvalidTransition {
            action: "pause".into(),
            state: "paused".into(),
        }
        .into();
        assert_eq!(err.to_string(), "invalid transition: cannot pause while paused");
    }
}
