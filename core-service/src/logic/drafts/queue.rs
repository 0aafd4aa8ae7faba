//! Sync Queue (multi-field)
//!
//! Keyed by field id, so queueing the same field twice keeps only the newest
//! content. Flushes run sequentially and never overlap; each item carries its
//! own retry counter and is evicted (content left in the local cache) once it
//! exceeds the cap.

use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::store::StoreError;
use super::types::{DraftContent, DraftRecord, DraftSaveRequest};
use super::DraftContext;
use crate::logic::cloud_sync::{FailureClass, SyncError};
use crate::logic::config::SyncQueueConfig;
use crate::logic::events::{self, BrowserSignal, Disposition, EventSource, ListenerId, SignalKind};

#[derive(Debug, Clone)]
struct QueueItem {
    record: DraftRecord,
    retry_count: u32,
}

/// Summary of one flush pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// False when the pass was skipped (offline or another flush running)
    pub ran: bool,
    pub attempted: usize,
    pub saved: usize,
    pub retained: usize,
    pub evicted: usize,
    pub dropped: usize,
}

struct QueueShared {
    ctx: DraftContext,
    config: SyncQueueConfig,
    items: Mutex<BTreeMap<String, QueueItem>>,
    last_synced: Mutex<HashMap<String, DraftContent>>,
    online: AtomicBool,
    flushing: AtomicBool,
    ticker: Mutex<Option<JoinHandle<()>>>,
    attached: Mutex<Vec<(Arc<dyn EventSource>, ListenerId)>>,
}

impl QueueShared {
    fn detach_all(&self) {
        for (source, id) in self.attached.lock().drain(..) {
            source.remove_listener(id);
        }
    }
}

impl Drop for QueueShared {
    fn drop(&mut self) {
        if let Some(ticker) = self.ticker.get_mut().take() {
            ticker.abort();
        }
        self.detach_all();
    }
}

/// Resets the flushing flag even if the flush future is dropped mid flight
struct FlushGuard<'a>(&'a AtomicBool);

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[derive(Clone)]
pub struct SyncQueue {
    shared: Arc<QueueShared>,
}

impl SyncQueue {
    pub fn new(ctx: DraftContext, config: SyncQueueConfig) -> Self {
        Self {
            shared: Arc::new(QueueShared {
                ctx,
                config,
                items: Mutex::new(BTreeMap::new()),
                last_synced: Mutex::new(HashMap::new()),
                online: AtomicBool::new(true),
                flushing: AtomicBool::new(false),
                ticker: Mutex::new(None),
                attached: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Remember what the server already holds for a field
    pub fn seed_synced(&self, field_id: &str, content: DraftContent) {
        self.shared.last_synced.lock().insert(field_id.to_string(), content);
    }

    /// Queue a field's latest content. Returns false (and drops any stale item)
    /// when the content equals the field's last synced value.
    pub fn queue_save(&self, field_id: &str, content: DraftContent) -> bool {
        let shared = &self.shared;
        let synced = shared
            .last_synced
            .lock()
            .get(field_id)
            .map(|c| *c == content)
            .unwrap_or_else(|| content == DraftContent::default());

        if synced {
            shared.items.lock().remove(field_id);
            return false;
        }

        let now = shared.ctx.clock.now();
        let version = {
            let mut items = shared.items.lock();
            let version = items.get(field_id).map(|i| i.record.version).unwrap_or(0);
            items.insert(
                field_id.to_string(),
                QueueItem {
                    record: DraftRecord {
                        field_id: field_id.to_string(),
                        text_a: content.text_a.clone(),
                        text_b: content.text_b.clone(),
                        last_modified: now,
                        version,
                        synced: false,
                    },
                    retry_count: 0,
                },
            );
            version
        };

        if let Some(cache) = &shared.ctx.cache {
            if let Err(e) = cache.store_at(&shared.ctx.session_token, field_id, &content, version, now) {
                log::warn!("Local cache write for {} failed: {}", field_id, e);
            }
        }
        true
    }

    /// Bulk recovery: queue every unsynced cache entry of this session
    pub fn requeue_unsynced(&self) -> Result<usize, StoreError> {
        let Some(cache) = &self.shared.ctx.cache else {
            return Ok(0);
        };

        let mut queued = 0;
        for (field_id, entry) in cache.unsynced(&self.shared.ctx.session_token)? {
            let mut items = self.shared.items.lock();
            if items.contains_key(&field_id) {
                continue;
            }
            let version = entry.version;
            let last_modified = entry.written_at().unwrap_or_else(|| self.shared.ctx.clock.now());
            items.insert(
                field_id.clone(),
                QueueItem {
                    record: DraftRecord {
                        field_id,
                        text_a: entry.text_a,
                        text_b: entry.text_b,
                        last_modified,
                        version,
                        synced: false,
                    },
                    retry_count: 0,
                },
            );
            queued += 1;
        }

        if queued > 0 {
            log::info!("Requeued {} unsynced drafts from local cache", queued);
        }
        Ok(queued)
    }

    /// Field ids still waiting to sync
    pub fn pending(&self) -> Vec<String> {
        self.shared.items.lock().keys().cloned().collect()
    }

    pub fn pending_count(&self) -> usize {
        self.shared.items.lock().len()
    }

    pub fn retry_count(&self, field_id: &str) -> Option<u32> {
        self.shared.items.lock().get(field_id).map(|i| i.retry_count)
    }

    pub fn is_online(&self) -> bool {
        self.shared.online.load(Ordering::SeqCst)
    }

    pub fn is_flushing(&self) -> bool {
        self.shared.flushing.load(Ordering::SeqCst)
    }

    /// Sequential pass over every queued item
    pub async fn flush(&self) -> FlushReport {
        let shared = &self.shared;
        if !shared.online.load(Ordering::SeqCst) {
            log::debug!("Offline, flush skipped");
            return FlushReport::default();
        }
        if shared
            .flushing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return FlushReport::default();
        }
        let _guard = FlushGuard(&shared.flushing);

        let batch: Vec<DraftRecord> = shared
            .items
            .lock()
            .values()
            .map(|item| item.record.clone())
            .collect();

        let mut report = FlushReport {
            ran: true,
            ..Default::default()
        };

        for record in batch {
            if !shared.online.load(Ordering::SeqCst) {
                log::debug!("Went offline mid flush, stopping");
                break;
            }
            report.attempted += 1;

            let content = record.content();
            let request = DraftSaveRequest::new(&record.field_id, &content);
            match shared.ctx.transport.save_draft(&request).await {
                Ok(response) => {
                    self.complete(&record.field_id, &content, response.version);
                    report.saved += 1;
                }
                Err(error) => match error.class() {
                    FailureClass::SessionConflict => {
                        log::debug!("Session inactive, {} dropped from queue", record.field_id);
                        self.remove_if_unchanged(&record.field_id, &content);
                        report.dropped += 1;
                    }
                    FailureClass::Permanent => {
                        self.evict(&record.field_id, &error);
                        report.evicted += 1;
                    }
                    FailureClass::Transient => {
                        let exceeded = {
                            let mut items = shared.items.lock();
                            match items.get_mut(&record.field_id) {
                                Some(item) => {
                                    item.retry_count += 1;
                                    item.retry_count > shared.config.max_retries
                                }
                                None => false,
                            }
                        };
                        if exceeded {
                            self.evict(&record.field_id, &error);
                            report.evicted += 1;
                        } else {
                            report.retained += 1;
                        }
                    }
                },
            }
        }

        if report.attempted > 0 {
            log::debug!(
                "Queue flush: {} saved, {} retained, {} evicted",
                report.saved,
                report.retained,
                report.evicted
            );
        }
        report
    }

    fn remove_if_unchanged(&self, field_id: &str, sent: &DraftContent) -> bool {
        let mut items = self.shared.items.lock();
        let unchanged = items
            .get(field_id)
            .map(|item| item.record.content() == *sent)
            .unwrap_or(false);
        if unchanged {
            items.remove(field_id);
        }
        unchanged
    }

    fn complete(&self, field_id: &str, sent: &DraftContent, version: u64) {
        let shared = &self.shared;
        if !self.remove_if_unchanged(field_id, sent) {
            // Edited again mid flight: keep the newer content queued
            if let Some(item) = shared.items.lock().get_mut(field_id) {
                item.record.version = item.record.version.max(version);
                item.retry_count = 0;
            }
        }
        shared.last_synced.lock().insert(field_id.to_string(), sent.clone());

        if let Some(cache) = &shared.ctx.cache {
            if let Err(e) = cache.mark_synced(&shared.ctx.session_token, field_id, sent, version) {
                log::warn!("Local cache update for {} failed: {}", field_id, e);
            }
        }
    }

    fn evict(&self, field_id: &str, error: &SyncError) {
        self.shared.items.lock().remove(field_id);
        log::warn!("Draft {} evicted from sync queue: {}", field_id, error);
        self.shared.ctx.listener.on_evicted(field_id, error);
    }

    /// Spawn a flush without waiting for it; no-op outside a runtime
    pub fn request_flush(&self) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            log::debug!("No runtime, flush request ignored");
            return;
        };
        let queue = self.clone();
        runtime.spawn(async move {
            queue.flush().await;
        });
    }

    pub fn set_online(&self, online: bool) {
        let was_online = self.shared.online.swap(online, Ordering::SeqCst);
        if online && !was_online {
            log::info!("Connection restored, flushing {} drafts", self.pending_count());
            self.request_flush();
        } else if !online && was_online {
            log::info!("Connection lost, drafts held locally");
        }
    }

    pub fn notify_visible(&self) {
        if self.pending_count() > 0 {
            self.request_flush();
        }
    }

    /// One fire-and-forget beacon per queued item; returns how many were handed off
    pub fn flush_on_unload(&self) -> usize {
        let shared = &self.shared;
        let requests: Vec<DraftSaveRequest> = shared
            .items
            .lock()
            .values()
            .map(|item| DraftSaveRequest::new(&item.record.field_id, &item.record.content()))
            .collect();

        let sent = requests
            .iter()
            .filter(|request| shared.ctx.transport.send_beacon(request))
            .count();
        if sent < requests.len() {
            log::debug!("{} of {} unload beacons not sent", requests.len() - sent, requests.len());
        }
        sent
    }

    /// Start the periodic flush. Must run inside a tokio runtime.
    pub fn start(&self) {
        let mut ticker = self.shared.ticker.lock();
        if ticker.is_some() {
            return;
        }

        let weak = Arc::downgrade(&self.shared);
        let period = self.shared.config.flush_interval;
        *ticker = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(shared) = weak.upgrade() else {
                    return;
                };
                SyncQueue { shared }.flush().await;
            }
        }));
    }

    /// Hook visibility return, connectivity and unload on an event source
    pub fn attach(&self, source: Arc<dyn EventSource>) {
        let mut ids = Vec::with_capacity(4);

        let weak = Arc::downgrade(&self.shared);
        ids.push(source.add_listener(
            SignalKind::VisibilityChange,
            events::handler(move |signal| {
                if let (BrowserSignal::VisibilityChange { hidden: false }, Some(queue)) =
                    (signal, upgrade(&weak))
                {
                    queue.notify_visible();
                }
                Disposition::Default
            }),
        ));

        let weak = Arc::downgrade(&self.shared);
        ids.push(source.add_listener(
            SignalKind::Online,
            events::handler(move |_| {
                if let Some(queue) = upgrade(&weak) {
                    queue.set_online(true);
                }
                Disposition::Default
            }),
        ));

        let weak = Arc::downgrade(&self.shared);
        ids.push(source.add_listener(
            SignalKind::Offline,
            events::handler(move |_| {
                if let Some(queue) = upgrade(&weak) {
                    queue.set_online(false);
                }
                Disposition::Default
            }),
        ));

        let weak = Arc::downgrade(&self.shared);
        ids.push(source.add_listener(
            SignalKind::Unload,
            events::handler(move |_| {
                if let Some(queue) = upgrade(&weak) {
                    queue.flush_on_unload();
                }
                Disposition::Default
            }),
        ));

        let mut attached = self.shared.attached.lock();
        attached.extend(ids.into_iter().map(|id| (source.clone(), id)));
    }

    /// Stop the periodic flush and detach from every event source
    pub fn shutdown(&self) {
        if let Some(ticker) = self.shared.ticker.lock().take() {
            ticker.abort();
        }
        self.shared.detach_all();
    }
}

fn upgrade(weak: &Weak<QueueShared>) -> Option<SyncQueue> {
    weak.upgrade().map(|shared| SyncQueue { shared })
}
