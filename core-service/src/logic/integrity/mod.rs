//! Integrity Module - Session violation detection
//!
//! This module handles:
//! - Translating browser signals into typed violation events (detectors)
//! - Heuristic dev-tools polling
//! - Reporting events and folding the authoritative verdict into local state
//!
//! Detectors never read `IntegrityState`; escalation is decided server-side.

pub mod detectors;
pub mod devtools;
pub mod reporter;
pub mod types;


pub use detectors::{
    ClipboardDetector, ContextMenuDetector, Detection, IntegrityMonitor, PasteDetector,
    ShortcutDetector, SignalDetector, VisibilityDetector,
};
pub use devtools::{DevToolsHeuristic, ViewportProbe, ViewportSample};
pub use reporter::{IntegrityListener, NoopIntegrityListener, ViolationReporter, ViolationSink};
pub use types::{
    IntegrityConfig, IntegrityState, IntegrityStatus, ViolationEvent, ViolationKind,
    ViolationVerdict,
};
