//! Session lifecycle handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::Serialize;
use validator::Validate;

use crate::models::{
    CreateSessionRequest, FinalAnswer, IntegrityRecord, SessionRecord, SessionStatus,
    SessionView, SubmitRequest, SubmitResponse,
};
use crate::{AppError, AppResult, AppState};

#[derive(Serialize)]
pub struct CreateSessionResponse {
    pub token: String,
    pub duration_seconds: i64,
}

#[derive(Serialize)]
pub struct SessionReview {
    pub token: String,
    pub status: SessionStatus,
    pub integrity: IntegrityRecord,
    pub answers: Vec<FinalAnswer>,
}

/// Create a pending session (admin)
pub async fn create(
    State(state): State<AppState>,
    Json(req): Json<CreateSessionRequest>,
) -> AppResult<(StatusCode, Json<CreateSessionResponse>)> {
    req.validate()?;

    let record = SessionRecord::new(req.duration_seconds, Utc::now());
    let response = CreateSessionResponse {
        token: record.token.clone(),
        duration_seconds: record.duration_seconds,
    };
    state.store.insert(record);

    tracing::info!("Session created: {} ({}s)", response.token, response.duration_seconds);
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn get(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> AppResult<Json<SessionView>> {
    let view = state
        .store
        .with_session(&token, |record| Ok(record.view(Utc::now())))?;
    Ok(Json(view))
}

/// Start the clock
pub async fn start(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> AppResult<Json<SessionView>> {
    let view = state.store.with_session(&token, |record| {
        let now = Utc::now();
        record.start(now)?;
        Ok(record.view(now))
    })?;

    tracing::info!("Session started: {}", token);
    Ok(Json(view))
}

/// Accept the final answers, once
pub async fn submit(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(req): Json<SubmitRequest>,
) -> AppResult<Json<SubmitResponse>> {
    for answer in &req.answers {
        answer.validate()?;
    }

    let response = state.store.with_session(&token, |record| {
        match record.status {
            SessionStatus::InProgress | SessionStatus::Expired => {}
            SessionStatus::Completed => {
                return Err(AppError::Conflict("Session already submitted".to_string()))
            }
            SessionStatus::Pending => return Err(AppError::SessionNotActive),
        }

        let now = Utc::now();
        let accepted = req.answers.len();
        record.answers = req.answers;
        record.status = SessionStatus::Completed;
        record.submitted_at = Some(now);

        Ok(SubmitResponse {
            accepted,
            submitted_at: now,
        })
    })?;

    tracing::info!("Session submitted: {} ({} answers)", token, response.accepted);
    Ok(Json(response))
}

/// Integrity record and submitted answers (admin)
pub async fn review(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> AppResult<Json<SessionReview>> {
    let review = state.store.with_session(&token, |record| {
        Ok(SessionReview {
            token: record.token.clone(),
            status: record.status,
            integrity: record.integrity.clone(),
            answers: record.answers.clone(),
        })
    })?;
    Ok(Json(review))
}

/// Clear the integrity record (admin)
pub async fn reinstate(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> AppResult<Json<SessionView>> {
    let view = state.store.with_session(&token, |record| {
        if record.integrity.is_disqualified {
            tracing::warn!(
                "Reinstating {}: {}",
                record.token,
                record.integrity.disqualification_reason.as_deref().unwrap_or("no reason")
            );
        }
        record.integrity = IntegrityRecord::default();
        Ok(record.view(Utc::now()))
    })?;
    Ok(Json(view))
}
