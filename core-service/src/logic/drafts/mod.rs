//! Drafts Module - Keep every edit safe
//!
//! This module handles:
//! - Debounced single-field saves with in-flight coalescing and retry backoff
//! - A durable local cache mirroring every edit, used for reload recovery
//! - A keyed multi-field queue flushed periodically, on reconnect and on unload

pub mod cache;
pub mod engine;
pub mod queue;
pub mod store;
pub mod types;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use crate::logic::clock::{Clock, SystemClock};
use crate::logic::cloud_sync::DraftTransport;

pub use cache::{CachedDraft, Hydration, HydrationSource, LocalPersistenceCache};
pub use engine::DraftSyncEngine;
pub use queue::{FlushReport, SyncQueue};
pub use store::{get_default_store_path, KvStore, MemoryStore, SqliteStore, StoreError};
pub use types::{
    DraftContent, DraftListener, DraftRecord, DraftSaveRequest, DraftSaveResponse, FinalAnswer,
    NoopDraftListener, SaveOutcome, SaveStatus, ServerDraft, SubmitResponse,
};

/// Everything a draft component needs that is shared across one session
#[derive(Clone)]
pub struct DraftContext {
    pub session_token: String,
    pub transport: Arc<dyn DraftTransport>,
    pub cache: Option<LocalPersistenceCache>,
    pub listener: Arc<dyn DraftListener>,
    pub clock: Arc<dyn Clock>,
}

impl DraftContext {
    pub fn new(session_token: impl Into<String>, transport: Arc<dyn DraftTransport>) -> Self {
        Self {
            session_token: session_token.into(),
            transport,
            cache: None,
            listener: Arc::new(NoopDraftListener),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_cache(mut self, cache: LocalPersistenceCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_listener(mut self, listener: Arc<dyn DraftListener>) -> Self {
        self.listener = listener;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}
