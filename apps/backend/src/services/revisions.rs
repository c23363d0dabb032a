//! Revision tree helpers for push validation and change feeds.

use std::collections::BTreeMap;

use vocab_core::document::generation;
use vocab_core::winning_index;

use crate::error::ApiError;
use crate::models::{ChangedDoc, LeafRow, PushDoc, RemoteChange};

/// Largest page a client may pull at once.
pub const MAX_PULL_LIMIT: i64 = 1000;

/// Reject revisions that cannot belong to a revision tree.
pub fn validate_push(doc: &PushDoc) -> Result<(), ApiError> {
    if doc.id.trim().is_empty() {
        return Err(ApiError::BadRequest("document id must not be empty".to_string()));
    }
    let rev_generation = generation(&doc.rev).ok_or_else(|| {
        ApiError::BadRequest(format!("invalid revision '{}' for {}", doc.rev, doc.id))
    })?;
    if let Some(parent) = &doc.parent_rev {
        let parent_generation = generation(parent).ok_or_else(|| {
            ApiError::BadRequest(format!("invalid parent revision '{}' for {}", parent, doc.id))
        })?;
        if parent_generation >= rev_generation {
            return Err(ApiError::BadRequest(format!(
                "revision {} of {} does not descend from {}",
                doc.rev, doc.id, parent
            )));
        }
    }
    if !doc.deleted && !doc.body.is_object() {
        return Err(ApiError::BadRequest(format!("body of {} must be an object", doc.id)));
    }
    Ok(())
}

/// Clamp a requested pull limit.
pub fn pull_limit(requested: i64) -> i64 {
    requested.clamp(1, MAX_PULL_LIMIT)
}

/// Winner and live conflicts of one document.
///
/// Returns `None` when the document has no leaves.
pub fn build_change(doc_id: &str, seq: i64, leaves: &[LeafRow]) -> Option<RemoteChange> {
    let winner = winning_index(leaves.iter().map(|leaf| (leaf.rev.as_str(), leaf.deleted)))?;
    let conflicts = leaves
        .iter()
        .enumerate()
        .filter(|(index, leaf)| *index != winner && !leaf.deleted)
        .map(|(_, leaf)| leaf.to_remote())
        .collect();

    Some(RemoteChange {
        id: doc_id.to_string(),
        seq,
        winner: leaves[winner].to_remote(),
        conflicts,
    })
}

/// Assemble the change feed page in sequence order.
pub fn build_changes(changed: &[ChangedDoc], leaves: Vec<LeafRow>) -> Vec<RemoteChange> {
    let grouped = group_leaves(leaves);
    changed
        .iter()
        .filter_map(|doc| {
            let leaves = grouped.get(&doc.doc_id)?;
            build_change(&doc.doc_id, doc.seq, leaves)
        })
        .collect()
}

/// Leaves keyed by document id.
pub fn group_leaves(leaves: Vec<LeafRow>) -> BTreeMap<String, Vec<LeafRow>> {
    let mut grouped: BTreeMap<String, Vec<LeafRow>> = BTreeMap::new();
    for leaf in leaves {
        grouped.entry(leaf.doc_id.clone()).or_default().push(leaf);
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn leaf(doc_id: &str, rev: &str, deleted: bool) -> LeafRow {
        LeafRow {
            doc_id: doc_id.to_string(),
            rev: rev.to_string(),
            deleted,
            body: json!({"rev": rev}),
        }
    }

    fn push(rev: &str, parent: Option<&str>) -> PushDoc {
        PushDoc {
            id: "word_1".to_string(),
            rev: rev.to_string(),
            parent_rev: parent.map(str::to_string),
            deleted: false,
            body: json!({"type": "noun"}),
        }
    }

    #[test]
    fn test_validate_accepts_descendants() {
        assert!(validate_push(&push("1-aa", None)).is_ok());
        assert!(validate_push(&push("3-aa", Some("1-bb"))).is_ok());
    }

    #[test]
    fn test_validate_rejects_malformed_revisions() {
        assert!(matches!(
            validate_push(&push("abc", None)),
            Err(ApiError::BadRequest(_))
        ));
        assert!(matches!(
            validate_push(&push("2-aa", Some("2-bb"))),
            Err(ApiError::BadRequest(_))
        ));

        let mut empty_id = push("1-aa", None);
        empty_id.id = " ".to_string();
        assert!(validate_push(&empty_id).is_err());
    }

    #[test]
    fn test_tombstones_may_have_any_body() {
        let mut tombstone = push("2-aa", Some("1-aa"));
        tombstone.deleted = true;
        tombstone.body = json!(null);
        assert!(validate_push(&tombstone).is_ok());

        tombstone.deleted = false;
        assert!(validate_push(&tombstone).is_err());
    }

    #[test]
    fn test_pull_limit_is_clamped() {
        assert_eq!(pull_limit(0), 1);
        assert_eq!(pull_limit(500), 500);
        assert_eq!(pull_limit(10_000), MAX_PULL_LIMIT);
    }

    #[test]
    fn test_change_reports_winner_and_live_conflicts() {
        let leaves = vec![
            leaf("word_1", "2-aa", false),
            leaf("word_1", "3-bb", false),
            leaf("word_1", "4-cc", true),
        ];
        let change = build_change("word_1", 9, &leaves).unwrap();
        assert_eq!(change.seq, 9);
        assert_eq!(change.winner.rev, "3-bb");
        assert_eq!(change.conflicts.len(), 1);
        assert_eq!(change.conflicts[0].rev, "2-aa");
    }

    #[test]
    fn test_deleted_document_has_deleted_winner() {
        let change = build_change("word_1", 1, &[leaf("word_1", "2-aa", true)]).unwrap();
        assert!(change.winner.deleted);
        assert!(change.conflicts.is_empty());
        assert!(build_change("word_1", 1, &[]).is_none());
    }

    #[test]
    fn test_changes_follow_sequence_order() {
        let changed = vec![
            ChangedDoc {
                doc_id: "word_2".to_string(),
                seq: 4,
            },
            ChangedDoc {
                doc_id: "word_1".to_string(),
                seq: 7,
            },
        ];
        let leaves = vec![leaf("word_1", "1-aa", false), leaf("word_2", "1-bb", false)];
        let changes = build_changes(&changed, leaves);
        let ids: Vec<_> = changes.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["word_2", "word_1"]);
    }
}
