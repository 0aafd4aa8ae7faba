//! Draft Types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::logic::cloud_sync::SyncError;

/// The two editable texts of one field (prose answer + code answer, or response text + code)
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DraftContent {
    pub text_a: String,
    pub text_b: String,
}

impl DraftContent {
    pub fn new(text_a: impl Into<String>, text_b: impl Into<String>) -> Self {
        Self {
            text_a: text_a.into(),
            text_b: text_b.into(),
        }
    }

    /// Both texts empty or whitespace only
    pub fn is_blank(&self) -> bool {
        self.text_a.trim().is_empty() && self.text_b.trim().is_empty()
    }
}

/// Snapshot of one field's draft
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftRecord {
    pub field_id: String,
    pub text_a: String,
    pub text_b: String,
    pub last_modified: DateTime<Utc>,
    pub version: u64,
    pub synced: bool,
}

impl DraftRecord {
    pub fn content(&self) -> DraftContent {
        DraftContent::new(self.text_a.clone(), self.text_b.clone())
    }
}

/// Visible save indicator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveStatus {
    #[default]
    Idle,
    Saving,
    Saved,
    Retrying,
    Error,
}

/// Result of one call into the save routine
#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    /// Nothing changed since the last confirmed save, or the field is blank
    Skipped,
    /// A save was already in flight; a follow-up will run when it completes
    Deferred,
    Saved { version: u64 },
    /// Transient failure, retry scheduled
    Retrying { attempt: u32 },
    /// Session no longer accepts drafts; dropped silently
    Ignored,
    /// Retries exhausted or permanent rejection
    Failed(SyncError),
}

// ============================================================================
// WIRE TYPES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftSaveRequest {
    pub field_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_a: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_b: Option<String>,
}

impl DraftSaveRequest {
    pub fn new(field_id: &str, content: &DraftContent) -> Self {
        Self {
            field_id: field_id.to_string(),
            text_a: Some(content.text_a.clone()),
            text_b: Some(content.text_b.clone()),
        }
    }

    pub fn content(&self) -> DraftContent {
        DraftContent::new(
            self.text_a.clone().unwrap_or_default(),
            self.text_b.clone().unwrap_or_default(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftSaveResponse {
    #[serde(default = "default_success")]
    pub success: bool,
    pub field_id: String,
    pub saved_at: DateTime<Utc>,
    pub version: u64,
}

fn default_success() -> bool {
    true
}

/// Server copy of a draft used for hydration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerDraft {
    pub field_id: String,
    #[serde(default)]
    pub text_a: String,
    #[serde(default)]
    pub text_b: String,
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

impl ServerDraft {
    pub fn content(&self) -> DraftContent {
        DraftContent::new(self.text_a.clone(), self.text_b.clone())
    }
}

/// One finalized answer in the batch submit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalAnswer {
    pub field_id: String,
    pub text_a: String,
    pub text_b: String,
}

impl FinalAnswer {
    pub fn from_record(record: &DraftRecord) -> Self {
        Self {
            field_id: record.field_id.clone(),
            text_a: record.text_a.clone(),
            text_b: record.text_b.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub accepted: usize,
    pub submitted_at: DateTime<Utc>,
}

// ============================================================================
// CALLBACKS
// ============================================================================

/// Failure notifications; the host decides whether to alert the user
pub trait DraftListener: Send + Sync {
    /// Single-field engine gave up (retries exhausted or permanent rejection)
    fn on_save_failed(&self, _field_id: &str, _error: &SyncError) {}

    /// Queue evicted an item; its content is still in the local cache
    fn on_evicted(&self, _field_id: &str, _error: &SyncError) {}
}

/// Listener that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopDraftListener;

impl DraftListener for NoopDraftListener {}
