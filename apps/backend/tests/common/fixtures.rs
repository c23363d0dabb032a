//! Test fixtures and factory functions for creating test data.

use serde_json::{json, Value};

use vocab_backend::models::{PullRequest, PushDoc, PushRequest, RegisterRequest};
use vocab_core::next_revision;

pub fn register_request(name: Option<&str>, account_id: Option<&str>) -> RegisterRequest {
    RegisterRequest {
        name: name.map(str::to_string),
        account_id: account_id.map(str::to_string),
    }
}

/// Body of a word with one English/German text.
pub fn word_body(en: &str, de: &str) -> Value {
    json!({
        "type": "noun",
        "updated_at": "2024-01-01T00:00:00Z",
        "texts": [{
            "tags": ["text"],
            "words": {
                "en": {"value": en, "games": {}},
                "de": {"value": de, "games": {}}
            }
        }]
    })
}

/// A revision of `id` following `parent`.
pub fn push_doc(id: &str, parent: Option<&str>, body: Value) -> PushDoc {
    PushDoc {
        id: id.to_string(),
        rev: next_revision(parent, false, &body),
        parent_rev: parent.map(str::to_string),
        deleted: false,
        body,
    }
}

/// A tombstone replacing `parent`.
pub fn tombstone(id: &str, parent: &str) -> PushDoc {
    let body = json!({});
    PushDoc {
        id: id.to_string(),
        rev: next_revision(Some(parent), true, &body),
        parent_rev: Some(parent.to_string()),
        deleted: true,
        body,
    }
}

pub fn push_request(docs: Vec<PushDoc>) -> PushRequest {
    PushRequest { docs }
}

pub fn pull_request(since: i64) -> PullRequest {
    PullRequest { since, limit: 500 }
}
