//! Draft and submission models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct SaveDraftRequest {
    #[validate(length(min = 1, max = 128))]
    pub field_id: String,
    #[validate(length(max = 200000))]
    pub text_a: Option<String>,
    #[validate(length(max = 200000))]
    pub text_b: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DraftEntry {
    pub field_id: String,
    pub text_a: String,
    pub text_b: String,
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

impl DraftEntry {
    /// Apply a save; absent halves keep their stored value
    pub fn apply(existing: Option<&DraftEntry>, req: SaveDraftRequest, now: DateTime<Utc>) -> Self {
        let (text_a, text_b, version) = match existing {
            Some(entry) => (
                req.text_a.unwrap_or_else(|| entry.text_a.clone()),
                req.text_b.unwrap_or_else(|| entry.text_b.clone()),
                entry.version + 1,
            ),
            None => (
                req.text_a.unwrap_or_default(),
                req.text_b.unwrap_or_default(),
                1,
            ),
        };

        Self {
            field_id: req.field_id,
            text_a,
            text_b,
            version,
            updated_at: now,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SaveDraftResponse {
    pub success: bool,
    pub field_id: String,
    pub saved_at: DateTime<Utc>,
    pub version: u64,
}

#[derive(Debug, Serialize)]
pub struct DraftListResponse {
    pub drafts: Vec<DraftEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct FinalAnswer {
    #[validate(length(min = 1, max = 128))]
    pub field_id: String,
    #[serde(default)]
    #[validate(length(max = 200000))]
    pub text_a: String,
    #[serde(default)]
    #[validate(length(max = 200000))]
    pub text_b: String,
}

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub answers: Vec<FinalAnswer>,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub accepted: usize,
    pub submitted_at: DateTime<Utc>,
}
