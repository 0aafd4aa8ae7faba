//! Session model

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;
use validator::Validate;

use super::draft::{DraftEntry, FinalAnswer};
use super::violation::IntegrityRecord;
use crate::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    InProgress,
    Completed,
    Expired,
}

#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub token: String,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub start_time: Option<DateTime<Utc>>,
    pub duration_seconds: i64,
    pub integrity: IntegrityRecord,
    pub drafts: BTreeMap<String, DraftEntry>,
    pub answers: Vec<FinalAnswer>,
    pub submitted_at: Option<DateTime<Utc>>,
}

impl SessionRecord {
    pub fn new(duration_seconds: i64, now: DateTime<Utc>) -> Self {
        Self {
            token: Uuid::new_v4().simple().to_string(),
            status: SessionStatus::Pending,
            created_at: now,
            start_time: None,
            duration_seconds,
            integrity: IntegrityRecord::default(),
            drafts: BTreeMap::new(),
            answers: Vec::new(),
            submitted_at: None,
        }
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.start_time
            .map(|start| start + Duration::seconds(self.duration_seconds))
    }

    pub fn remaining_seconds(&self, now: DateTime<Utc>) -> Option<i64> {
        match self.status {
            SessionStatus::Pending => Some(self.duration_seconds),
            SessionStatus::InProgress => self.end_time().map(|end| (end - now).num_seconds().max(0)),
            SessionStatus::Completed | SessionStatus::Expired => Some(0),
        }
    }

    /// Lazily move an in-progress session past its end time to `Expired`
    pub fn refresh(&mut self, now: DateTime<Utc>) {
        if self.status == SessionStatus::InProgress {
            if let Some(end) = self.end_time() {
                if now >= end {
                    tracing::info!("Session {} expired", self.token);
                    self.status = SessionStatus::Expired;
                }
            }
        }
    }

    pub fn start(&mut self, now: DateTime<Utc>) -> AppResult<()> {
        if self.status != SessionStatus::Pending {
            return Err(AppError::Conflict("Session already started or completed".to_string()));
        }
        self.status = SessionStatus::InProgress;
        self.start_time = Some(now);
        Ok(())
    }

    pub fn ensure_in_progress(&self) -> AppResult<()> {
        if self.status == SessionStatus::InProgress {
            Ok(())
        } else {
            Err(AppError::SessionNotActive)
        }
    }

    /// In progress, or expired less than `grace_seconds` ago
    pub fn ensure_accepts_drafts(&self, now: DateTime<Utc>, grace_seconds: i64) -> AppResult<()> {
        let within_grace = self.status == SessionStatus::Expired
            && self
                .end_time()
                .map(|end| now < end + Duration::seconds(grace_seconds))
                .unwrap_or(false);

        if self.status == SessionStatus::InProgress || within_grace {
            Ok(())
        } else {
            Err(AppError::SessionNotActive)
        }
    }

    pub fn view(&self, now: DateTime<Utc>) -> SessionView {
        SessionView {
            token: self.token.clone(),
            status: self.status,
            created_at: self.created_at,
            start_time: self.start_time,
            duration_seconds: self.duration_seconds,
            remaining_seconds: self.remaining_seconds(now),
            is_disqualified: self.integrity.is_disqualified,
            submitted_at: self.submitted_at,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateSessionRequest {
    #[validate(range(min = 60, max = 86400))]
    pub duration_seconds: i64,
}

#[derive(Debug, Serialize)]
pub struct SessionView {
    pub token: String,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub start_time: Option<DateTime<Utc>>,
    pub duration_seconds: i64,
    pub remaining_seconds: Option<i64>,
    pub is_disqualified: bool,
    pub submitted_at: Option<DateTime<Utc>>,
}
