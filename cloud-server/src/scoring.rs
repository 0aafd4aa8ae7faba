//! Weighted violation scoring
//!
//! score = sum of weight(kind) * count(kind). Disqualification is inclusive at
//! the threshold and never reverts; only an explicit reinstatement clears it.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::config::ScoringConfig;
use crate::models::{IntegrityRecord, ViolationKind, ViolationReport, ViolationVerdict};

pub fn score(counts: &BTreeMap<ViolationKind, u32>, config: &ScoringConfig) -> f64 {
    counts
        .iter()
        .map(|(kind, count)| config.weight(*kind) * f64::from(*count))
        .sum()
}

/// Fold one report into the record and return the verdict for the client
pub fn apply(
    record: &mut IntegrityRecord,
    report: &ViolationReport,
    config: &ScoringConfig,
    now: DateTime<Utc>,
) -> ViolationVerdict {
    *record.counts.entry(report.event_type).or_insert(0) += 1;
    if report.event_type == ViolationKind::TabSwitch {
        record.tab_switch_timestamps.push(report.timestamp);
    }
    record.last_event_at = Some(now);
    record.violation_score = score(&record.counts, config);

    let was_disqualified = record.is_disqualified;
    if !was_disqualified && record.violation_score >= config.disqualification_threshold {
        record.is_disqualified = true;
        record.disqualification_reason = Some(format!(
            "Violation score {:.1} reached the disqualification threshold {:.1}",
            record.violation_score, config.disqualification_threshold
        ));
    }

    let should_warn =
        !record.is_disqualified && record.violation_score >= config.warning_threshold;
    if should_warn {
        record.warning_count += 1;
    }

    ViolationVerdict {
        counts: record.counts.clone(),
        violation_score: record.violation_score,
        warning_count: record.warning_count,
        should_warn,
        is_disqualified: record.is_disqualified,
        disqualification_reason: record.disqualification_reason.clone(),
    }
}
