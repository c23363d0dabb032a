//! Document envelope and revision handling.
//!
//! Every entity is stored as a JSON document carrying `_id` and `_rev`.
//! Revisions have the form `<generation>-<digest>` where the digest covers
//! the parent revision, the deleted flag and the body, so two replicas that
//! make the same edit produce the same revision.

use crate::error::{CoreError, Result};
use crate::types::Entity;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::cmp::Ordering;

const ID_FIELD: &str = "_id";
const REV_FIELD: &str = "_rev";

/// A stored document revision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub rev: String,
    #[serde(default)]
    pub deleted: bool,
    /// Entity fields without `_id` / `_rev`.
    pub body: Value,
}

impl Document {
    /// Split an entity into id and body.
    pub fn body_of<E: Entity>(entity: &E) -> Result<Value> {
        let mut value =
            serde_json::to_value(entity).map_err(|e| CoreError::InvalidEntity(e.to_string()))?;
        if let Value::Object(map) = &mut value {
            map.remove(ID_FIELD);
            map.remove(REV_FIELD);
        }
        Ok(value)
    }

    /// Rebuild an entity from this revision.
    pub fn to_entity<E: Entity>(&self) -> Result<E> {
        let mut map = match &self.body {
            Value::Object(map) => map.clone(),
            Value::Null => Map::new(),
            other => {
                return Err(CoreError::InvalidEntity(format!(
                    "document {} has a non-object body: {}",
                    self.id, other
                )))
            }
        };
        map.insert(ID_FIELD.to_string(), Value::String(self.id.clone()));
        map.insert(REV_FIELD.to_string(), Value::String(self.rev.clone()));
        let mut entity: E = serde_json::from_value(Value::Object(map))
            .map_err(|e| CoreError::InvalidEntity(format!("document {}: {}", self.id, e)))?;
        entity.after_load();
        Ok(entity)
    }
}

/// Generation number of a revision (`3-abc` → 3).
pub fn generation(rev: &str) -> Option<u64> {
    rev.split_once('-')?.0.parse().ok()
}

/// Compute the revision that follows `parent` for the given content.
pub fn next_revision(parent: Option<&str>, deleted: bool, body: &Value) -> String {
    let generation = parent.and_then(generation).unwrap_or(0) + 1;
    let mut hasher = Sha256::new();
    hasher.update(parent.unwrap_or("").as_bytes());
    hasher.update([u8::from(deleted)]);
    hasher.update(body.to_string().as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    format!("{}-{}", generation, &digest[..32])
}

/// Order two leaf revisions; the greater one wins.
///
/// Live revisions beat deleted ones, then higher generations win, then the
/// lexicographically greater revision string.
pub fn compare_leaves(a: (&str, bool), b: (&str, bool)) -> Ordering {
    let (a_rev, a_deleted) = a;
    let (b_rev, b_deleted) = b;
    b_deleted
        .cmp(&a_deleted)
        .then_with(|| generation(a_rev).unwrap_or(0).cmp(&generation(b_rev).unwrap_or(0)))
        .then_with(|| a_rev.cmp(b_rev))
}

/// Index of the winning leaf, if any.
pub fn winning_index<'a, I>(leaves: I) -> Option<usize>
where
    I: IntoIterator<Item = (&'a str, bool)>,
{
    leaves
        .into_iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| compare_leaves(*a, *b))
        .map(|(index, _)| index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Text, WordEntity};
    use serde_json::json;

    #[test]
    fn revision_generation_increments() {
        let first = next_revision(None, false, &json!({"a": 1}));
        assert!(first.starts_with("1-"));
        let second = next_revision(Some(&first), false, &json!({"a": 2}));
        assert!(second.starts_with("2-"));
        assert_eq!(generation(&second), Some(2));
    }

    #[test]
    fn identical_edits_produce_identical_revisions() {
        let body = json!({"title": "noun"});
        assert_eq!(
            next_revision(Some("1-aa"), false, &body),
            next_revision(Some("1-aa"), false, &body)
        );
        assert_ne!(
            next_revision(Some("1-aa"), false, &body),
            next_revision(Some("1-aa"), true, &body)
        );
    }

    #[test]
    fn live_leaf_beats_deleted_leaf() {
        let leaves = [("5-zz", true), ("2-aa", false)];
        assert_eq!(winning_index(leaves), Some(1));
    }

    #[test]
    fn higher_generation_then_greater_rev_wins() {
        let leaves = [("2-bb", false), ("3-aa", false), ("3-ab", false)];
        assert_eq!(winning_index(leaves), Some(2));
    }

    #[test]
    fn entity_round_trip_through_document() {
        let mut word = WordEntity::new("noun", vec![Text::from_pairs([("en", "dog")])]);
        word.id = "word_1".into();
        let body = Document::body_of(&word).unwrap();
        assert!(body.get("_id").is_none());

        let doc = Document {
            id: word.id.clone(),
            rev: "1-abc".into(),
            deleted: false,
            body,
        };
        let loaded: WordEntity = doc.to_entity().unwrap();
        assert_eq!(loaded.texts, word.texts);
        assert_eq!(loaded.rev.as_deref(), Some("1-abc"));
    }

    #[test]
    fn non_object_body_is_rejected() {
        let doc = Document {
            id: "word_1".into(),
            rev: "1-abc".into(),
            deleted: false,
            body: json!([1, 2]),
        };
        assert!(doc.to_entity::<WordEntity>().is_err());
    }
}
