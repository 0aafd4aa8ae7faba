//! Integrity Types
//!
//! Violation events produced by detectors and the authoritative state folded from
//! scoring responses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// VIOLATION KIND
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// Tab hidden (switched to another tab)
    TabSwitch,
    /// Paste into an answer surface
    PasteAttempt,
    /// Copy or cut outside an allow-listed region
    CopyAttempt,
    /// Context menu outside an allow-listed region
    RightClick,
    /// Dev-tools heuristic or dev-tools shortcut
    DevToolsOpen,
    /// Window lost OS focus (switched application)
    FocusLoss,
}

impl ViolationKind {
    pub const ALL: [ViolationKind; 6] = [
        ViolationKind::TabSwitch,
        ViolationKind::PasteAttempt,
        ViolationKind::CopyAttempt,
        ViolationKind::RightClick,
        ViolationKind::DevToolsOpen,
        ViolationKind::FocusLoss,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationKind::TabSwitch => "tab_switch",
            ViolationKind::PasteAttempt => "paste_attempt",
            ViolationKind::CopyAttempt => "copy_attempt",
            ViolationKind::RightClick => "right_click",
            ViolationKind::DevToolsOpen => "dev_tools_open",
            ViolationKind::FocusLoss => "focus_loss",
        }
    }
}

impl std::fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// VIOLATION EVENT
// ============================================================================

/// One detected signal. Created by a detector, consumed once by the reporter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolationEvent {
    #[serde(rename = "event_type")]
    pub kind: ViolationKind,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ViolationEvent {
    pub fn new(kind: ViolationKind, timestamp: DateTime<Utc>) -> Self {
        Self {
            kind,
            timestamp,
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

// ============================================================================
// AUTHORITATIVE RESPONSE
// ============================================================================

/// Scoring authority reply to one reported event
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ViolationVerdict {
    #[serde(default)]
    pub counts: BTreeMap<ViolationKind, u32>,
    pub violation_score: f64,
    pub warning_count: u32,
    pub should_warn: bool,
    pub is_disqualified: bool,
    #[serde(default)]
    pub disqualification_reason: Option<String>,
}

/// Authoritative weights and thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrityConfig {
    pub warning_threshold: f64,
    pub disqualification_threshold: f64,
    pub violation_weights: BTreeMap<ViolationKind, f64>,
}

// ============================================================================
// INTEGRITY STATE
// ============================================================================

/// Escalation stage derived from the state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "stage", content = "warnings", rename_all = "snake_case")]
pub enum IntegrityStatus {
    Clean,
    Warned(u32),
    Disqualified,
}

/// Local mirror of the authoritative integrity record.
///
/// Never incremented locally: every response replaces it wholesale.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntegrityState {
    pub counts_by_kind: BTreeMap<ViolationKind, u32>,
    pub violation_score: f64,
    pub warning_count: u32,
    pub is_disqualified: bool,
    pub disqualification_reason: Option<String>,
}

impl IntegrityState {
    pub fn count(&self, kind: ViolationKind) -> u32 {
        self.counts_by_kind.get(&kind).copied().unwrap_or(0)
    }

    pub fn status(&self) -> IntegrityStatus {
        if self.is_disqualified {
            IntegrityStatus::Disqualified
        } else if self.warning_count > 0 {
            IntegrityStatus::Warned(self.warning_count)
        } else {
            IntegrityStatus::Clean
        }
    }
}

impl From<&ViolationVerdict> for IntegrityState {
    fn from(verdict: &ViolationVerdict) -> Self {
        Self {
            counts_by_kind: verdict.counts.clone(),
            violation_score: verdict.violation_score,
            warning_count: verdict.warning_count,
            is_disqualified: verdict.is_disqualified,
            disqualification_reason: verdict.disqualification_reason.clone(),
        }
    }
}
