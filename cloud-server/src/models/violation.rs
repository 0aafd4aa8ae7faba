//! Violation model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    TabSwitch,
    PasteAttempt,
    CopyAttempt,
    RightClick,
    DevToolsOpen,
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

    pub fn default_weight(&self) -> f64 {
        match self {
            ViolationKind::TabSwitch => 1.0,
            ViolationKind::PasteAttempt => 2.0,
            ViolationKind::CopyAttempt => 1.0,
            ViolationKind::RightClick => 0.5,
            ViolationKind::DevToolsOpen => 3.0,
            ViolationKind::FocusLoss => 0.5,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct ViolationReport {
    pub event_type: ViolationKind,
    pub timestamp: DateTime<Utc>,
    #[validate(length(max = 500))]
    pub details: Option<String>,
}

/// Per-session integrity record
#[derive(Debug, Clone, Default, Serialize)]
pub struct IntegrityRecord {
    pub counts: BTreeMap<ViolationKind, u32>,
    pub violation_score: f64,
    pub warning_count: u32,
    pub is_disqualified: bool,
    pub disqualification_reason: Option<String>,
    /// Kept for review
    pub tab_switch_timestamps: Vec<DateTime<Utc>>,
    pub last_event_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ViolationVerdict {
    pub counts: BTreeMap<ViolationKind, u32>,
    pub violation_score: f64,
    pub warning_count: u32,
    pub should_warn: bool,
    pub is_disqualified: bool,
    pub disqualification_reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct IntegrityConfigResponse {
    pub warning_threshold: f64,
    pub disqualification_threshold: f64,
    pub violation_weights: BTreeMap<ViolationKind, f64>,
}
