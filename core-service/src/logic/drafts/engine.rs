//! Draft Sync Engine (single field)
//!
//! `latest` is the most recent local edit, `last_saved` the most recent value the
//! backend confirmed. Edits (re)arm a debounced save; the save routine is guarded
//! by `is_saving` so saves of one field never overlap, and a save requested mid
//! flight sets `pending_save` so the in-flight completion runs exactly one
//! follow-up with whatever is latest by then.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;

use super::cache::{Hydration, HydrationSource};
use super::types::{DraftContent, DraftRecord, DraftSaveRequest, SaveOutcome, SaveStatus, ServerDraft};
use super::DraftContext;
use crate::logic::cloud_sync::FailureClass;
use crate::logic::config::DraftSyncConfig;

struct EngineState {
    latest: DraftContent,
    last_saved: DraftContent,
    last_modified: DateTime<Utc>,
    version: u64,
    is_saving: bool,
    pending_save: bool,
    retry_count: u32,
    debounce: Option<JoinHandle<()>>,
    retry: Option<JoinHandle<()>>,
    status_reset: Option<JoinHandle<()>>,
}

impl EngineState {
    fn abort_timers(&mut self) {
        for task in [self.debounce.take(), self.retry.take(), self.status_reset.take()]
            .into_iter()
            .flatten()
        {
            task.abort();
        }
    }
}

struct EngineShared {
    field_id: String,
    ctx: DraftContext,
    config: DraftSyncConfig,
    state: Mutex<EngineState>,
    status_tx: watch::Sender<SaveStatus>,
    idle: Notify,
    closed: AtomicBool,
}

/// Cheap cloneable handle; all clones drive the same field.
/// Must be used inside a tokio runtime.
#[derive(Clone)]
pub struct DraftSyncEngine {
    shared: Arc<EngineShared>,
}

impl DraftSyncEngine {
    pub fn new(field_id: impl Into<String>, ctx: DraftContext, config: DraftSyncConfig) -> Self {
        let (status_tx, _) = watch::channel(SaveStatus::Idle);
        let now = ctx.clock.now();
        Self {
            shared: Arc::new(EngineShared {
                field_id: field_id.into(),
                ctx,
                config,
                state: Mutex::new(EngineState {
                    latest: DraftContent::default(),
                    last_saved: DraftContent::default(),
                    last_modified: now,
                    version: 0,
                    is_saving: false,
                    pending_save: false,
                    retry_count: 0,
                    debounce: None,
                    retry: None,
                    status_reset: None,
                }),
                status_tx,
                idle: Notify::new(),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn field_id(&self) -> &str {
        &self.shared.field_id
    }

    pub fn status(&self) -> SaveStatus {
        *self.shared.status_tx.borrow()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SaveStatus> {
        self.shared.status_tx.subscribe()
    }

    pub fn is_dirty(&self) -> bool {
        let st = self.shared.state.lock();
        st.latest != st.last_saved
    }

    pub fn retry_count(&self) -> u32 {
        self.shared.state.lock().retry_count
    }

    pub fn record(&self) -> DraftRecord {
        let st = self.shared.state.lock();
        DraftRecord {
            field_id: self.shared.field_id.clone(),
            text_a: st.latest.text_a.clone(),
            text_b: st.latest.text_b.clone(),
            last_modified: st.last_modified,
            version: st.version,
            synced: st.latest == st.last_saved,
        }
    }

    /// Record a local edit: mirror it to the cache and (re)arm the debounce
    pub fn edit(&self, text_a: impl Into<String>, text_b: impl Into<String>) {
        let shared = &self.shared;
        let content = DraftContent::new(text_a, text_b);
        let now = shared.ctx.clock.now();

        // While a save is in flight `last_saved` is about to change, so the
        // edit is settled by the follow-up rather than compared against it
        let (dirty, saving, version) = {
            let mut st = shared.state.lock();
            st.latest = content.clone();
            st.last_modified = now;
            if st.is_saving {
                st.pending_save = true;
            }
            (st.latest != st.last_saved, st.is_saving, st.version)
        };

        if let Some(cache) = &shared.ctx.cache {
            let mirrored = cache
                .store_at(&shared.ctx.session_token, &shared.field_id, &content, version, now)
                .and_then(|_| {
                    if dirty || saving {
                        Ok(false)
                    } else {
                        cache.mark_synced(&shared.ctx.session_token, &shared.field_id, &content, version)
                    }
                });
            if let Err(e) = mirrored {
                log::warn!("Local cache write for {} failed: {}", shared.field_id, e);
            }
        }

        if dirty || saving {
            shared.schedule_debounce();
        } else if let Some(task) = shared.state.lock().debounce.take() {
            task.abort();
        }
    }

    /// Seed the field on load from the server copy and the local cache
    pub fn hydrate(&self, server: Option<&ServerDraft>) -> Hydration {
        let shared = &self.shared;
        let server_content = server.map(ServerDraft::content);

        let resolved = match &shared.ctx.cache {
            Some(cache) => cache
                .resolve(&shared.ctx.session_token, &shared.field_id, server_content.as_ref())
                .unwrap_or_else(|e| {
                    log::warn!("Local cache read for {} failed: {}", shared.field_id, e);
                    server_hydration(server_content.clone())
                }),
            None => server_hydration(server_content.clone()),
        };

        let cached_version = resolved.cached.as_ref().map(|c| c.version).unwrap_or(0);
        let server_version = server.map(|d| d.version).unwrap_or(0);

        let dirty = {
            let mut st = shared.state.lock();
            st.latest = resolved.content.clone();
            st.last_saved = server_content.unwrap_or_default();
            st.version = server_version.max(cached_version);
            st.last_modified = shared.ctx.clock.now();
            st.latest != st.last_saved
        };

        if dirty {
            log::info!("Recovered unsynced local draft for {}", shared.field_id);
            shared.schedule_debounce();
        }
        resolved
    }

    /// Run the save routine now
    pub async fn save(&self) -> SaveOutcome {
        self.shared.save().await
    }

    /// Cancel pending timers, wait out any in-flight save, then save.
    /// Nothing edited before the call is lost.
    pub async fn flush(&self) -> SaveOutcome {
        let shared = &self.shared;
        {
            let mut st = shared.state.lock();
            if let Some(task) = st.debounce.take() {
                task.abort();
            }
            if let Some(task) = st.retry.take() {
                task.abort();
            }
        }

        loop {
            shared.wait_idle().await;
            match shared.save().await {
                SaveOutcome::Deferred => continue,
                outcome => return outcome,
            }
        }
    }

    /// Teardown: clear every timer; later edits no longer schedule saves
    pub fn shutdown(&self) {
        self.shared.closed.store(true, Ordering::SeqCst);
        self.shared.state.lock().abort_timers();
    }
}

fn server_hydration(server: Option<DraftContent>) -> Hydration {
    match server {
        Some(content) => Hydration {
            content,
            source: HydrationSource::Server,
            cached: None,
        },
        None => Hydration {
            content: DraftContent::default(),
            source: HydrationSource::Empty,
            cached: None,
        },
    }
}

impl EngineShared {
    fn set_status(&self, status: SaveStatus) {
        self.status_tx.send_replace(status);
    }

    async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            let saving = self.state.lock().is_saving;
            if !saving {
                return;
            }
            notified.await;
        }
    }

    /// Timer that sleeps, then runs the save on a detached task so aborting
    /// the timer can never cancel a save mid flight
    fn spawn_delayed_save(self: &Arc<Self>, delay: Duration) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(engine) = weak.upgrade() {
                tokio::spawn(async move {
                    engine.save().await;
                });
            }
        })
    }

    fn schedule_debounce(self: &Arc<Self>) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        let task = self.spawn_delayed_save(self.config.debounce);
        if let Some(previous) = self.state.lock().debounce.replace(task) {
            previous.abort();
        }
    }

    fn schedule_retry(self: &Arc<Self>, delay: Duration) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        let task = self.spawn_delayed_save(delay);
        if let Some(previous) = self.state.lock().retry.replace(task) {
            previous.abort();
        }
    }

    fn schedule_status_reset(self: &Arc<Self>, delay: Duration, shown: SaveStatus) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        let weak = Arc::downgrade(self);
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(engine) = weak.upgrade() {
                engine.status_tx.send_if_modified(|status| {
                    if *status == shown {
                        *status = SaveStatus::Idle;
                        true
                    } else {
                        false
                    }
                });
            }
        });
        if let Some(previous) = self.state.lock().status_reset.replace(task) {
            previous.abort();
        }
    }

    async fn save(self: &Arc<Self>) -> SaveOutcome {
        let mut snapshot = {
            let mut st = self.state.lock();
            if st.latest == st.last_saved || st.latest.is_blank() {
                if !st.is_saving {
                    drop(st);
                    self.set_status(SaveStatus::Idle);
                }
                return SaveOutcome::Skipped;
            }
            if st.is_saving {
                st.pending_save = true;
                return SaveOutcome::Deferred;
            }
            st.is_saving = true;
            if let Some(task) = st.retry.take() {
                task.abort();
            }
            st.latest.clone()
        };
        self.set_status(SaveStatus::Saving);

        loop {
            let request = DraftSaveRequest::new(&self.field_id, &snapshot);
            let result = self.ctx.transport.save_draft(&request).await;

            let (outcome, follow_up, rearm) = {
                let mut st = self.state.lock();
                match result {
                    Ok(response) => {
                        st.last_saved = snapshot.clone();
                        st.retry_count = 0;
                        st.version = st.version.max(response.version);
                        let changed = st.latest != st.last_saved && !st.latest.is_blank();
                        let follow = st.pending_save && changed;
                        st.pending_save = false;
                        let next = if follow {
                            Some(st.latest.clone())
                        } else {
                            st.is_saving = false;
                            None
                        };
                        // Content moved on without a recorded request
                        let rearm = changed && !follow;
                        (SaveOutcome::Saved { version: st.version }, next, rearm)
                    }
                    Err(error) => {
                        // A scheduled retry saves whatever is latest, so pending is covered
                        st.pending_save = false;
                        st.is_saving = false;
                        let outcome = match error.class() {
                            FailureClass::SessionConflict => SaveOutcome::Ignored,
                            FailureClass::Permanent => {
                                st.retry_count = 0;
                                SaveOutcome::Failed(error)
                            }
                            FailureClass::Transient => {
                                st.retry_count += 1;
                                if st.retry_count <= self.config.max_retries {
                                    SaveOutcome::Retrying {
                                        attempt: st.retry_count,
                                    }
                                } else {
                                    st.retry_count = 0;
                                    SaveOutcome::Failed(error)
                                }
                            }
                        };
                        (outcome, None, false)
                    }
                }
            };

            self.settle(&outcome, &snapshot);
            if rearm {
                self.schedule_debounce();
            }

            match follow_up {
                Some(next) => {
                    snapshot = next;
                    self.set_status(SaveStatus::Saving);
                }
                None => {
                    self.idle.notify_waiters();
                    return outcome;
                }
            }
        }
    }

    fn settle(self: &Arc<Self>, outcome: &SaveOutcome, saved: &DraftContent) {
        match outcome {
            SaveOutcome::Saved { version } => {
                if let Some(cache) = &self.ctx.cache {
                    if let Err(e) =
                        cache.mark_synced(&self.ctx.session_token, &self.field_id, saved, *version)
                    {
                        log::warn!("Local cache update for {} failed: {}", self.field_id, e);
                    }
                }
                log::debug!("Draft {} saved (v{})", self.field_id, version);
                self.set_status(SaveStatus::Saved);
                self.schedule_status_reset(self.config.saved_display, SaveStatus::Saved);
            }
            SaveOutcome::Retrying { attempt } => {
                let delay = self.config.backoff_for(*attempt);
                log::info!(
                    "Draft {} save failed, retry {}/{} in {:?}",
                    self.field_id,
                    attempt,
                    self.config.max_retries,
                    delay
                );
                self.set_status(SaveStatus::Retrying);
                self.schedule_retry(delay);
            }
            SaveOutcome::Ignored => {
                log::debug!("Draft {} not saved: session no longer active", self.field_id);
                self.set_status(SaveStatus::Idle);
            }
            SaveOutcome::Failed(error) => {
                log::warn!("Draft {} save failed: {}", self.field_id, error);
                self.set_status(SaveStatus::Error);
                self.schedule_status_reset(self.config.error_display, SaveStatus::Error);
                self.ctx.listener.on_save_failed(&self.field_id, error);
            }
            SaveOutcome::Skipped | SaveOutcome::Deferred => {}
        }
    }
}

impl Drop for EngineShared {
    fn drop(&mut self) {
        self.state.get_mut().abort_timers();
    }
}
