//! Violation handlers

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use validator::Validate;

use crate::models::{IntegrityConfigResponse, ViolationReport, ViolationVerdict};
use crate::{scoring, AppResult, AppState};

/// Record one violation and return the updated verdict
pub async fn report(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(report): Json<ViolationReport>,
) -> AppResult<Json<ViolationVerdict>> {
    report.validate()?;

    let verdict = state.store.with_session(&token, |record| {
        record.ensure_in_progress()?;
        let was_disqualified = record.integrity.is_disqualified;
        let verdict = scoring::apply(&mut record.integrity, &report, &state.config.scoring, Utc::now());

        if verdict.is_disqualified && !was_disqualified {
            tracing::warn!(
                "Session {} disqualified at score {:.1}",
                record.token,
                verdict.violation_score
            );
        }
        Ok(verdict)
    })?;

    tracing::debug!(
        "Violation {} on {}: score {:.1}",
        report.event_type.as_str(),
        token,
        verdict.violation_score
    );
    Ok(Json(verdict))
}

pub async fn config(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> AppResult<Json<IntegrityConfigResponse>> {
    // Unknown sessions get a 404 rather than the policy
    state.store.with_session(&token, |_| Ok(()))?;

    let scoring = &state.config.scoring;
    Ok(Json(IntegrityConfigResponse {
        warning_threshold: scoring.warning_threshold,
        disqualification_threshold: scoring.disqualification_threshold,
        violation_weights: scoring.weights.clone(),
    }))
}
