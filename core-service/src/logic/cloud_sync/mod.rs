//! Cloud Sync Module - Session to Backend Communication
//!
//! This module defines the three seams the session talks through:
//! - `ScoringAuthority` - violation reports and integrity config
//! - `DraftTransport` - draft saves and unload beacons
//! - `SubmissionTransport` - one-shot batch submit
//!
//! `HttpBackend` implements all three over reqwest.

pub mod client;

pub use client::{BackendConfig, HttpBackend};

use async_trait::async_trait;

use crate::logic::drafts::types::{
    DraftSaveRequest, DraftSaveResponse, FinalAnswer, ServerDraft, SubmitResponse,
};
use crate::logic::integrity::types::{IntegrityConfig, ViolationEvent, ViolationVerdict};

// ============================================================================
// ERRORS
// ============================================================================

/// Backend call errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Request timed out")]
    Timeout,
    #[error("Server error: {0}")]
    Server(u16),
    #[error("Session is not active")]
    SessionInactive,
    #[error("Rejected: {0}")]
    Rejected(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Answers already submitted")]
    AlreadySubmitted,
}

/// How a failure is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Retry with backoff up to the cap
    Transient,
    /// Session already ended; expected, ignore silently
    SessionConflict,
    /// Surface immediately, never retry
    Permanent,
}

impl SyncError {
    pub fn class(&self) -> FailureClass {
        match self {
            Self::Network(_) | Self::Timeout | Self::Server(_) => FailureClass::Transient,
            Self::SessionInactive => FailureClass::SessionConflict,
            Self::Rejected(_) | Self::Parse(_) | Self::AlreadySubmitted => FailureClass::Permanent,
        }
    }

    /// Map a non-success HTTP status
    pub fn from_status(status: u16, body: &str) -> Self {
        match status {
            409 | 410 => Self::SessionInactive,
            408 | 429 => Self::Server(status),
            s if s >= 500 => Self::Server(s),
            _ => Self::Rejected(if body.is_empty() {
                format!("HTTP {}", status)
            } else {
                body.to_string()
            }),
        }
    }
}

// ============================================================================
// SEAMS
// ============================================================================

#[async_trait]
pub trait ScoringAuthority: Send + Sync {
    /// Report one event; the reply is the new authoritative state
    async fn report_violation(&self, event: &ViolationEvent) -> Result<ViolationVerdict, SyncError>;

    async fn fetch_config(&self) -> Result<IntegrityConfig, SyncError>;
}

#[async_trait]
pub trait DraftTransport: Send + Sync {
    async fn save_draft(&self, request: &DraftSaveRequest) -> Result<DraftSaveResponse, SyncError>;

    /// Server copies of every draft in the session
    async fn load_drafts(&self) -> Result<Vec<ServerDraft>, SyncError>;

    /// Fire-and-forget delivery that must survive page teardown.
    /// Returns whether the send was handed off; the response is never observed.
    fn send_beacon(&self, request: &DraftSaveRequest) -> bool;
}

#[async_trait]
pub trait SubmissionTransport: Send + Sync {
    async fn submit_answers(&self, answers: &[FinalAnswer]) -> Result<SubmitResponse, SyncError>;
}
