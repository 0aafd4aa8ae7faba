//! Logic Module - Session engines
//!
//! Integrity detection flows one way (detector -> reporter -> authoritative state).
//! Drafts flow both ways (edits -> queue -> server, server/cache -> hydrate).

pub mod clock;
pub mod cloud_sync;
pub mod config;
pub mod drafts;
pub mod events;
pub mod integrity;
pub mod session;
pub mod timer;
