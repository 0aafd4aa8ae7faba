//! Assessment Session Core
//!
//! Client-side integrity and draft persistence layer for a timed assessment session.
//!
//! ## Layout
//! - `logic/integrity/` - Violation detectors, reporter, escalation state
//! - `logic/drafts/` - Debounced draft saves, local cache, multi-field sync queue
//! - `logic/timer.rs` - Wall-clock session countdown
//! - `logic/cloud_sync/` - Transport seams and the HTTP backend client
//! - `logic/session.rs` - Session-scoped owner that wires everything together

pub mod constants;
pub mod logic;

pub use logic::clock::{Clock, ManualClock, SystemClock};
pub use logic::cloud_sync::{
    DraftTransport, FailureClass, HttpBackend, ScoringAuthority, SubmissionTransport, SyncError,
};
pub use logic::config::SessionConfig;
pub use logic::drafts::{
    DraftContent, DraftListener, DraftRecord, DraftSyncEngine, KvStore, LocalPersistenceCache,
    MemoryStore, SaveStatus, SqliteStore, SyncQueue,
};
pub use logic::events::{BrowserSignal, Disposition, EventSource, SignalBus};
pub use logic::integrity::{
    IntegrityListener, IntegrityMonitor, IntegrityState, ViolationEvent, ViolationKind,
    ViolationReporter,
};
pub use logic::session::{AssessmentSession, SessionHooks};
pub use logic::timer::{SessionTimer, TimerSeed};
