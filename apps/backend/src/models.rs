//! Database rows and API types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

// Wire types shared with the client
pub use vocab_core::replication::{
    FulltextHit, FulltextIndexDefinition, FulltextResponse, PullRequest, PullResponse, PushDoc,
    PushRequest, PushResponse, RegisterRequest, RegisterResponse, RemoteChange, RemoteRevision,
};

/// Registered device
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Device {
    pub id: Uuid,
    pub account_id: Uuid,
    pub token: String,
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

/// Leaf revision of a document
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct LeafRow {
    pub doc_id: String,
    pub rev: String,
    pub deleted: bool,
    pub body: Value,
}

impl LeafRow {
    pub fn to_remote(&self) -> RemoteRevision {
        RemoteRevision {
            rev: self.rev.clone(),
            deleted: self.deleted,
            body: self.body.clone(),
        }
    }
}

/// Document touched after a sequence number
#[derive(Debug, Clone, FromRow)]
pub struct ChangedDoc {
    pub doc_id: String,
    pub seq: i64,
}

/// Outcome of storing one pushed revision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoredRevision {
    /// False when the revision was already present.
    pub inserted: bool,
    /// Live leaves of the document after the write.
    pub live_leaves: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeviceStatusResponse {
    pub device_id: Uuid,
    pub account_id: Uuid,
    pub name: Option<String>,
    pub last_seen_at: DateTime<Utc>,
}

/// Query string of a full-text request
#[derive(Debug, Deserialize)]
pub struct FulltextQueryParams {
    pub q: String,
    #[serde(default = "default_fulltext_limit")]
    pub limit: usize,
}

fn default_fulltext_limit() -> usize {
    25
}
