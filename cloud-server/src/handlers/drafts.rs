//! Draft handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use validator::Validate;

use crate::models::{DraftEntry, DraftListResponse, SaveDraftRequest, SaveDraftResponse};
use crate::{AppResult, AppState};

fn store_draft(state: &AppState, token: &str, req: SaveDraftRequest) -> AppResult<DraftEntry> {
    req.validate()?;

    state.store.with_session(token, |record| {
        let now = Utc::now();
        record.ensure_accepts_drafts(now, state.config.draft_grace_seconds)?;

        let entry = DraftEntry::apply(record.drafts.get(&req.field_id), req, now);
        record.drafts.insert(entry.field_id.clone(), entry.clone());
        Ok(entry)
    })
}

pub async fn save(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(req): Json<SaveDraftRequest>,
) -> AppResult<Json<SaveDraftResponse>> {
    let entry = store_draft(&state, &token, req)?;
    tracing::debug!("Draft {} v{} saved for {}", entry.field_id, entry.version, token);

    Ok(Json(SaveDraftResponse {
        success: true,
        field_id: entry.field_id,
        saved_at: entry.updated_at,
        version: entry.version,
    }))
}

/// Unload-time save; the sender never reads the body
pub async fn beacon(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(req): Json<SaveDraftRequest>,
) -> AppResult<StatusCode> {
    let entry = store_draft(&state, &token, req)?;
    tracing::debug!("Beacon draft {} v{} for {}", entry.field_id, entry.version, token);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> AppResult<Json<DraftListResponse>> {
    let drafts: Vec<DraftEntry> = state
        .store
        .with_session(&token, |record| Ok(record.drafts.values().cloned().collect()))?;
    Ok(Json(DraftListResponse { drafts }))
}
