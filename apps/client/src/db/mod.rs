//! Local SQLite database operations.

pub mod error;
pub mod repository;
pub mod schema;

pub use error::DbError;
pub use repository::{
    AppliedChange, ConflictRepository, DocumentRepository, KeyBound, ListOptions,
    LocalDeviceInfo, LocalSyncState, PendingTombstone, SqliteRepository, StoredDocument,
    SyncRepository, ViewRecord, ViewRepository, ViewRowRecord,
};
