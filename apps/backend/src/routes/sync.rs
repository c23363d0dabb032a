//! Replication endpoints

use axum::{extract::State, Extension, Json};

use crate::error::Result;
use crate::models::*;
use crate::routes::auth::AuthenticatedDevice;
use crate::services::revisions::{build_changes, pull_limit, validate_push};
use crate::AppState;

/// POST /api/sync/push
/// Store client revisions and report documents left in conflict
pub async fn push(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedDevice>,
    Json(payload): Json<PushRequest>,
) -> Result<Json<PushResponse>> {
    for doc in &payload.docs {
        validate_push(doc)?;
    }

    let mut response = PushResponse::default();
    let mut inserted = 0;
    for doc in &payload.docs {
        let stored = state.db.store_revision(auth.account_id, doc).await?;
        if stored.inserted {
            inserted += 1;
        }
        if stored.live_leaves > 1 && !response.conflicted.contains(&doc.id) {
            response.conflicted.push(doc.id.clone());
        }
        response.accepted.push(doc.rev.clone());
    }

    tracing::debug!(
        device = %auth.device_id,
        received = payload.docs.len(),
        inserted,
        conflicted = response.conflicted.len(),
        "push"
    );

    Ok(Json(response))
}

/// POST /api/sync/pull
/// Changes after `since`: the winning revision and live conflicts per document
pub async fn pull(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedDevice>,
    Json(payload): Json<PullRequest>,
) -> Result<Json<PullResponse>> {
    let changed = state
        .db
        .changed_since(auth.account_id, payload.since, pull_limit(payload.limit))
        .await?;

    let last_seq = changed
        .iter()
        .map(|doc| doc.seq)
        .max()
        .unwrap_or(payload.since);

    let doc_ids: Vec<String> = changed.iter().map(|doc| doc.doc_id.clone()).collect();
    let leaves = if doc_ids.is_empty() {
        Vec::new()
    } else {
        state.db.leaves_of(auth.account_id, &doc_ids).await?
    };

    Ok(Json(PullResponse {
        last_seq,
        changes: build_changes(&changed, leaves),
    }))
}
