//! Database error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("revision mismatch on {id}: current is {current:?}")]
    RevisionMismatch { id: String, current: Option<String> },

    #[error("invalid data: {0}")]
    InvalidData(String),
}
