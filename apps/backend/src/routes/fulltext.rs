//! Full-text index endpoints

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use vocab_core::winning_index;

use crate::error::{ApiError, Result};
use crate::models::{FulltextIndexDefinition, FulltextQueryParams, FulltextResponse};
use crate::routes::auth::AuthenticatedDevice;
use crate::services::fulltext::{parse_query, search};
use crate::services::revisions::group_leaves;
use crate::AppState;

/// PUT /api/fulltext/:index
/// Create or replace an index definition
pub async fn put_index(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedDevice>,
    Path(index): Path<String>,
    Json(definition): Json<FulltextIndexDefinition>,
) -> Result<Json<FulltextIndexDefinition>> {
    if definition.fields.is_empty() {
        return Err(ApiError::BadRequest(format!("index {} has no fields", index)));
    }
    state
        .db
        .upsert_fulltext_index(auth.account_id, &index, &definition)
        .await?;

    tracing::debug!(account = %auth.account_id, index = %index, "full-text index defined");
    Ok(Json(definition))
}

/// GET /api/fulltext/:index?q=&limit=
pub async fn query(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedDevice>,
    Path(index): Path<String>,
    Query(params): Query<FulltextQueryParams>,
) -> Result<Json<FulltextResponse>> {
    let definition = state
        .db
        .get_fulltext_index(auth.account_id, &index)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("full-text index {}", index)))?;

    let query = parse_query(&params.q)?;
    query.check_fields(&definition)?;

    let grouped = group_leaves(state.db.all_leaves(auth.account_id).await?);
    let winners = grouped.iter().filter_map(|(id, leaves)| {
        let winner = &leaves[winning_index(leaves.iter().map(|l| (l.rev.as_str(), l.deleted)))?];
        (!winner.deleted).then_some((id.as_str(), &winner.body))
    });

    Ok(Json(search(&definition, &query, winners, params.limit)))
}
