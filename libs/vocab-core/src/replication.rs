//! Wire types shared by the replication client and peer.

use crate::document::Document;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegisterRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Join an existing account instead of creating one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub device_id: String,
    pub account_id: String,
    pub token: String,
}

/// A local revision sent to the peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushDoc {
    pub id: String,
    pub rev: String,
    /// Last revision of this document the peer is known to have.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_rev: Option<String>,
    #[serde(default)]
    pub deleted: bool,
    pub body: Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PushRequest {
    pub docs: Vec<PushDoc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PushResponse {
    /// Revisions stored (or already present).
    pub accepted: Vec<String>,
    /// Ids that now have more than one leaf.
    pub conflicted: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PullRequest {
    pub since: i64,
    #[serde(default = "default_pull_limit")]
    pub limit: i64,
}

pub fn default_pull_limit() -> i64 {
    500
}

/// One leaf revision as seen by the peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRevision {
    pub rev: String,
    #[serde(default)]
    pub deleted: bool,
    pub body: Value,
}

impl RemoteRevision {
    pub fn into_document(self, id: &str) -> Document {
        Document {
            id: id.to_string(),
            rev: self.rev,
            deleted: self.deleted,
            body: self.body,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteChange {
    pub id: String,
    pub seq: i64,
    pub winner: RemoteRevision,
    #[serde(default)]
    pub conflicts: Vec<RemoteRevision>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PullResponse {
    pub last_seq: i64,
    pub changes: Vec<RemoteChange>,
}

/// Full-text index definition: field name to JSON path.
///
/// Paths are dot separated; `*` matches every array element or object value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FulltextIndexDefinition {
    pub fields: BTreeMap<String, String>,
}

impl FulltextIndexDefinition {
    /// The `words` index over every translation value.
    pub fn words() -> Self {
        let mut fields = BTreeMap::new();
        fields.insert("value".to_string(), "texts.*.words.*.value".to_string());
        Self { fields }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FulltextHit {
    pub id: String,
    pub score: f32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FulltextResponse {
    pub total: usize,
    pub hits: Vec<FulltextHit>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn pull_request_defaults_limit() {
        let request: PullRequest = serde_json::from_value(json!({"since": 7})).unwrap();
        assert_eq!(request.since, 7);
        assert_eq!(request.limit, 500);
    }

    #[test]
    fn remote_revision_becomes_document() {
        let change: RemoteChange = serde_json::from_value(json!({
            "id": "word_1",
            "seq": 3,
            "winner": {"rev": "2-b", "body": {"type": "noun"}},
            "conflicts": [{"rev": "2-a", "deleted": false, "body": {"type": "verb"}}]
        }))
        .unwrap();
        let doc = change.winner.into_document(&change.id);
        assert_eq!(doc.id, "word_1");
        assert!(!doc.deleted);
        assert_eq!(change.conflicts.len(), 1);
    }
}
