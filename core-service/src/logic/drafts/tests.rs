use super::*;
use crate::logic::clock::{Clock, ManualClock};
use crate::logic::cloud_sync::{DraftTransport, SyncError};
use crate::logic::config::{CacheConfig, DraftSyncConfig, SyncQueueConfig};
use crate::logic::events::{BrowserSignal, SignalBus};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::sleep;

// ============================================================================
// FIXTURES
// ============================================================================

#[derive(Default)]
struct MockTransport {
    calls: Mutex<Vec<DraftSaveRequest>>,
    scripted: Mutex<VecDeque<SyncError>>,
    failing_fields: Mutex<HashMap<String, SyncError>>,
    delay: Mutex<Option<Duration>>,
    version: AtomicU64,
    beacons: Mutex<Vec<DraftSaveRequest>>,
}

impl MockTransport {
    fn fail_field(&self, field_id: &str, error: SyncError) {
        self.failing_fields.lock().insert(field_id.to_string(), error);
    }

    fn fail_next(&self, error: SyncError) {
        self.scripted.lock().push_back(error);
    }

    fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    fn sent_texts(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .map(|r| r.text_a.clone().unwrap_or_default())
            .collect()
    }
}

#[async_trait]
impl DraftTransport for MockTransport {
    async fn save_draft(&self, request: &DraftSaveRequest) -> Result<DraftSaveResponse, SyncError> {
        self.calls.lock().push(request.clone());
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            sleep(delay).await;
        }

        let failing = self.failing_fields.lock().get(&request.field_id).cloned();
        if let Some(error) = failing {
            return Err(error);
        }
        let scripted = self.scripted.lock().pop_front();
        if let Some(error) = scripted {
            return Err(error);
        }

        Ok(DraftSaveResponse {
            success: true,
            field_id: request.field_id.clone(),
            saved_at: Utc::now(),
            version: self.version.fetch_add(1, Ordering::SeqCst) + 1,
        })
    }

    async fn load_drafts(&self) -> Result<Vec<ServerDraft>, SyncError> {
        Ok(Vec::new())
    }

    fn send_beacon(&self, request: &DraftSaveRequest) -> bool {
        self.beacons.lock().push(request.clone());
        true
    }
}

#[derive(Default)]
struct RecordingListener {
    failed: Mutex<Vec<String>>,
    evicted: Mutex<Vec<String>>,
}

impl DraftListener for RecordingListener {
    fn on_save_failed(&self, field_id: &str, _error: &SyncError) {
        self.failed.lock().push(field_id.to_string());
    }

    fn on_evicted(&self, field_id: &str, _error: &SyncError) {
        self.evicted.lock().push(field_id.to_string());
    }
}

const SESSION: &str = "sess-1";

fn draft_config() -> DraftSyncConfig {
    DraftSyncConfig {
        debounce: Duration::from_millis(1500),
        max_retries: 3,
        retry_backoff: Duration::from_millis(2000),
        saved_display: Duration::from_millis(2000),
        error_display: Duration::from_millis(5000),
    }
}

fn queue_config() -> SyncQueueConfig {
    SyncQueueConfig {
        flush_interval: Duration::from_secs(30),
        max_retries: 3,
    }
}

fn cache_config() -> CacheConfig {
    CacheConfig {
        key_prefix: "assessment_draft_".to_string(),
        ttl_hours: 24,
        recent_secs: 5,
    }
}

fn new_cache(clock: Arc<ManualClock>) -> LocalPersistenceCache {
    LocalPersistenceCache::new(Arc::new(MemoryStore::new()), clock, &cache_config())
}

struct Fixture {
    transport: Arc<MockTransport>,
    listener: Arc<RecordingListener>,
    clock: Arc<ManualClock>,
    cache: LocalPersistenceCache,
    ctx: DraftContext,
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn fixture() -> Fixture {
    init_logging();
    let transport = Arc::new(MockTransport::default());
    let listener = Arc::new(RecordingListener::default());
    let clock = Arc::new(ManualClock::default());
    let cache = new_cache(clock.clone());
    let ctx = DraftContext::new(SESSION, transport.clone())
        .with_listener(listener.clone())
        .with_clock(clock.clone())
        .with_cache(cache.clone());
    Fixture {
        transport,
        listener,
        clock,
        cache,
        ctx,
    }
}

fn engine(fx: &Fixture) -> DraftSyncEngine {
    DraftSyncEngine::new("q1", fx.ctx.clone(), draft_config())
}

// ============================================================================
// SINGLE-FIELD ENGINE
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_debounce_coalesces_rapid_edits() {
    let fx = fixture();
    let engine = engine(&fx);

    engine.edit("a", "");
    sleep(Duration::from_millis(500)).await;
    engine.edit("ab", "");
    sleep(Duration::from_millis(500)).await;
    engine.edit("abc", "");

    sleep(Duration::from_millis(1400)).await;
    assert_eq!(fx.transport.call_count(), 0);

    sleep(Duration::from_millis(200)).await;
    assert_eq!(fx.transport.sent_texts(), vec!["abc".to_string()]);
    assert_eq!(engine.status(), SaveStatus::Saved);
    assert!(engine.record().synced);

    sleep(Duration::from_millis(2100)).await;
    assert_eq!(engine.status(), SaveStatus::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_save_mid_flight_runs_one_follow_up() {
    let fx = fixture();
    fx.transport.set_delay(Duration::from_secs(1));
    let engine = engine(&fx);

    engine.edit("v1", "");
    let first = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.save().await })
    };
    sleep(Duration::from_millis(10)).await;
    assert_eq!(engine.status(), SaveStatus::Saving);

    engine.edit("v2", "");
    assert_eq!(engine.save().await, SaveOutcome::Deferred);
    assert_eq!(engine.save().await, SaveOutcome::Deferred);

    let outcome = first.await.unwrap();
    assert_eq!(outcome, SaveOutcome::Saved { version: 2 });
    assert_eq!(fx.transport.sent_texts(), vec!["v1".to_string(), "v2".to_string()]);

    // Pending debounce finds nothing left to save
    sleep(Duration::from_secs(5)).await;
    assert_eq!(fx.transport.call_count(), 2);
    assert_eq!(engine.record().version, 2);
}

#[tokio::test(start_paused = true)]
async fn test_revert_during_in_flight_save_converges() {
    let fx = fixture();
    let engine = engine(&fx);
    engine.edit("A", "");
    assert_eq!(engine.flush().await, SaveOutcome::Saved { version: 1 });

    fx.transport.set_delay(Duration::from_secs(1));
    engine.edit("B", "");
    sleep(Duration::from_millis(1600)).await;
    assert_eq!(engine.status(), SaveStatus::Saving);

    // Back to the saved text while "B" is still on the wire
    engine.edit("A", "");
    let cached = fx.cache.load(SESSION, "q1").unwrap().unwrap();
    assert!(!cached.synced);

    sleep(Duration::from_secs(30)).await;
    assert_eq!(
        fx.transport.sent_texts(),
        vec!["A".to_string(), "B".to_string(), "A".to_string()]
    );
    assert!(!engine.is_dirty());
    assert_eq!(engine.record().text_a, "A");
    let cached = fx.cache.load(SESSION, "q1").unwrap().unwrap();
    assert_eq!(cached.text_a, "A");
    assert!(cached.synced);
}

#[tokio::test(start_paused = true)]
async fn test_retries_exhausted_surfaces_error_then_idle() {
    let fx = fixture();
    fx.transport.fail_field("q1", SyncError::Server(503));
    let engine = engine(&fx);

    engine.edit("answer", "");

    // attempts at 1.5s, 3.5s, 7.5s, 13.5s
    sleep(Duration::from_millis(1600)).await;
    assert_eq!(fx.transport.call_count(), 1);
    assert_eq!(engine.status(), SaveStatus::Retrying);
    assert_eq!(engine.retry_count(), 1);

    sleep(Duration::from_secs(2)).await;
    assert_eq!(fx.transport.call_count(), 2);

    sleep(Duration::from_secs(4)).await;
    assert_eq!(fx.transport.call_count(), 3);
    assert!(fx.listener.failed.lock().is_empty());

    sleep(Duration::from_secs(6)).await;
    assert_eq!(fx.transport.call_count(), 4);
    assert_eq!(engine.status(), SaveStatus::Error);
    assert_eq!(*fx.listener.failed.lock(), vec!["q1".to_string()]);
    assert_eq!(engine.retry_count(), 0);

    sleep(Duration::from_millis(5100)).await;
    assert_eq!(engine.status(), SaveStatus::Idle);

    sleep(Duration::from_secs(60)).await;
    assert_eq!(fx.transport.call_count(), 4);
    assert!(engine.is_dirty());
}

#[tokio::test(start_paused = true)]
async fn test_transient_failure_recovers_on_retry() {
    let fx = fixture();
    fx.transport.fail_next(SyncError::Timeout);
    let engine = engine(&fx);

    engine.edit("answer", "fn main() {}");
    sleep(Duration::from_millis(1600)).await;
    assert_eq!(engine.status(), SaveStatus::Retrying);

    sleep(Duration::from_secs(2)).await;
    assert_eq!(fx.transport.call_count(), 2);
    assert_eq!(engine.status(), SaveStatus::Saved);
    assert!(!engine.is_dirty());
}

#[tokio::test(start_paused = true)]
async fn test_permanent_rejection_is_not_retried() {
    let fx = fixture();
    fx.transport.fail_field("q1", SyncError::Rejected("field closed".into()));
    let engine = engine(&fx);

    engine.edit("answer", "");
    sleep(Duration::from_secs(30)).await;

    assert_eq!(fx.transport.call_count(), 1);
    assert_eq!(fx.listener.failed.lock().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_session_conflict_is_ignored() {
    let fx = fixture();
    fx.transport.fail_field("q1", SyncError::SessionInactive);
    let engine = engine(&fx);

    engine.edit("late answer", "");
    sleep(Duration::from_secs(30)).await;

    assert_eq!(fx.transport.call_count(), 1);
    assert_eq!(engine.status(), SaveStatus::Idle);
    assert!(fx.listener.failed.lock().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_blank_content_never_saves() {
    let fx = fixture();
    let engine = engine(&fx);

    engine.edit("   ", "\n");
    sleep(Duration::from_secs(5)).await;

    assert_eq!(fx.transport.call_count(), 0);
    assert_eq!(engine.save().await, SaveOutcome::Skipped);
}

#[tokio::test(start_paused = true)]
async fn test_flush_waits_for_in_flight_save() {
    let fx = fixture();
    fx.transport.set_delay(Duration::from_secs(1));
    let engine = engine(&fx);

    engine.edit("v1", "");
    {
        let engine = engine.clone();
        tokio::spawn(async move { engine.save().await });
    }
    sleep(Duration::from_millis(10)).await;
    engine.edit("v2", "");

    // "v2" rides the in-flight save's follow-up, so flush finds nothing left
    let outcome = engine.flush().await;
    assert_eq!(outcome, SaveOutcome::Skipped);
    assert!(!engine.is_dirty());
    assert_eq!(fx.transport.sent_texts(), vec!["v1".to_string(), "v2".to_string()]);

    sleep(Duration::from_secs(5)).await;
    assert_eq!(fx.transport.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_edit_back_to_saved_value_cancels_debounce() {
    let fx = fixture();
    let engine = engine(&fx);

    engine.edit("saved", "");
    engine.flush().await;
    assert_eq!(fx.transport.call_count(), 1);

    engine.edit("saved!", "");
    engine.edit("saved", "");
    sleep(Duration::from_secs(5)).await;
    assert_eq!(fx.transport.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_scheduled_saves() {
    let fx = fixture();
    let engine = engine(&fx);

    engine.edit("draft", "");
    engine.shutdown();
    engine.edit("draft 2", "");
    sleep(Duration::from_secs(10)).await;

    assert_eq!(fx.transport.call_count(), 0);
    // Still mirrored locally for recovery
    let cached = fx.cache.load(SESSION, "q1").unwrap().unwrap();
    assert_eq!(cached.text_a, "draft 2");
    assert!(!cached.synced);
}

// ============================================================================
// HYDRATION + LOCAL CACHE
// ============================================================================

fn server_draft(text: &str, version: u64) -> ServerDraft {
    ServerDraft {
        field_id: "q1".to_string(),
        text_a: text.to_string(),
        text_b: String::new(),
        version,
        updated_at: Utc::now(),
    }
}

#[tokio::test(start_paused = true)]
async fn test_hydrate_prefers_unsynced_local_edit() {
    let fx = fixture();
    fx.cache
        .store(SESSION, "q1", &DraftContent::new("typed before reload", ""), 3)
        .unwrap();
    fx.clock.advance(chrono::Duration::minutes(10));

    let engine = engine(&fx);
    let hydration = engine.hydrate(Some(&server_draft("older server copy", 3)));
    assert_eq!(hydration.source, HydrationSource::Local);
    assert_eq!(hydration.content.text_a, "typed before reload");
    assert!(engine.is_dirty());

    // Recovered content is pushed without another edit
    sleep(Duration::from_millis(1600)).await;
    assert_eq!(fx.transport.sent_texts(), vec!["typed before reload".to_string()]);
    assert!(fx.cache.load(SESSION, "q1").unwrap().unwrap().synced);
}

#[tokio::test(start_paused = true)]
async fn test_hydrate_uses_server_when_cache_synced_and_stale() {
    let fx = fixture();
    let content = DraftContent::new("confirmed", "");
    fx.cache.store(SESSION, "q1", &content, 1).unwrap();
    fx.cache.mark_synced(SESSION, "q1", &content, 1).unwrap();
    fx.clock.advance(chrono::Duration::seconds(30));

    let engine = engine(&fx);
    let hydration = engine.hydrate(Some(&server_draft("edited elsewhere", 2)));
    assert_eq!(hydration.source, HydrationSource::Server);
    assert!(!engine.is_dirty());
    assert_eq!(engine.record().version, 2);

    sleep(Duration::from_secs(5)).await;
    assert_eq!(fx.transport.call_count(), 0);
}

#[test]
fn test_recent_synced_entry_beats_server() {
    let clock = Arc::new(ManualClock::default());
    let cache = new_cache(clock.clone());
    let local = DraftContent::new("just saved", "");
    cache.store(SESSION, "q1", &local, 1).unwrap();
    cache.mark_synced(SESSION, "q1", &local, 1).unwrap();
    let server = DraftContent::new("lagging replica", "");

    clock.advance(chrono::Duration::seconds(2));
    let recent = cache.resolve(SESSION, "q1", Some(&server)).unwrap();
    assert_eq!(recent.source, HydrationSource::Local);

    clock.advance(chrono::Duration::seconds(10));
    let settled = cache.resolve(SESSION, "q1", Some(&server)).unwrap();
    assert_eq!(settled.source, HydrationSource::Server);
    assert_eq!(settled.content, server);

    let nothing = cache.resolve(SESSION, "missing", None).unwrap();
    assert_eq!(nothing.source, HydrationSource::Empty);
}

#[test]
fn test_cache_entries_expire_after_ttl() {
    let clock = Arc::new(ManualClock::default());
    let store = Arc::new(MemoryStore::new());
    let cache = LocalPersistenceCache::new(store.clone(), clock.clone(), &cache_config());

    cache.store(SESSION, "q1", &DraftContent::new("old", ""), 0).unwrap();
    clock.advance(chrono::Duration::hours(20));
    cache.store(SESSION, "q2", &DraftContent::new("new", ""), 0).unwrap();
    clock.advance(chrono::Duration::hours(5));

    assert_eq!(cache.purge_expired().unwrap(), 1);
    assert_eq!(store.len(), 1);
    assert!(cache.load(SESSION, "q1").unwrap().is_none());
    assert!(cache.load(SESSION, "q2").unwrap().is_some());
}

#[test]
fn test_cache_is_last_writer_wins() {
    let clock = Arc::new(ManualClock::default());
    let cache = new_cache(clock.clone());
    let t0 = clock.now();
    let t1 = t0 + chrono::Duration::seconds(1);

    assert!(cache
        .store_at(SESSION, "q1", &DraftContent::new("newer", ""), 0, t1)
        .unwrap());
    assert!(!cache
        .store_at(SESSION, "q1", &DraftContent::new("older", ""), 0, t0)
        .unwrap());
    assert_eq!(cache.load(SESSION, "q1").unwrap().unwrap().text_a, "newer");
}

#[test]
fn test_mark_synced_requires_matching_content() {
    let clock = Arc::new(ManualClock::default());
    let cache = new_cache(clock);
    cache.store(SESSION, "q1", &DraftContent::new("typed later", ""), 0).unwrap();

    let stale = DraftContent::new("what the server saw", "");
    assert!(!cache.mark_synced(SESSION, "q1", &stale, 4).unwrap());
    assert!(!cache.load(SESSION, "q1").unwrap().unwrap().synced);
}

#[test]
fn test_unsynced_sweep_is_scoped_to_session() {
    let clock = Arc::new(ManualClock::default());
    let cache = new_cache(clock);
    let saved = DraftContent::new("saved", "");
    cache.store(SESSION, "q1", &saved, 1).unwrap();
    cache.mark_synced(SESSION, "q1", &saved, 1).unwrap();
    cache.store(SESSION, "q2", &DraftContent::new("pending", ""), 0).unwrap();
    cache.store("other", "q3", &DraftContent::new("foreign", ""), 0).unwrap();

    let unsynced = cache.unsynced(SESSION).unwrap();
    assert_eq!(unsynced.len(), 1);
    assert_eq!(unsynced[0].0, "q2");

    assert_eq!(cache.mark_all_synced(SESSION).unwrap(), 1);
    assert!(cache.unsynced(SESSION).unwrap().is_empty());
    assert_eq!(cache.unsynced("other").unwrap().len(), 1);
}

#[test]
fn test_underscored_tokens_do_not_share_keys() {
    let clock = Arc::new(ManualClock::default());
    let cache = new_cache(clock);
    cache.store("s1", "x_q", &DraftContent::new("mine", ""), 0).unwrap();
    cache.store("s1_x", "q", &DraftContent::new("theirs", ""), 0).unwrap();

    assert_eq!(cache.key("s1", "q1"), "assessment_draft_s1_q1");
    assert_ne!(cache.key("s1", "x_q"), cache.key("s1_x", "q"));

    let mine = cache.unsynced("s1").unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].0, "x_q");

    assert_eq!(cache.mark_all_synced("s1").unwrap(), 1);
    let theirs = cache.unsynced("s1_x").unwrap();
    assert_eq!(theirs.len(), 1);
    assert_eq!(theirs[0].1.text_a, "theirs");
}

#[test]
fn test_unreadable_entry_is_discarded() {
    let clock = Arc::new(ManualClock::default());
    let store = Arc::new(MemoryStore::new());
    let cache = LocalPersistenceCache::new(store.clone(), clock, &cache_config());
    store.set(&cache.key(SESSION, "q1"), "{not json").unwrap();

    assert!(cache.load(SESSION, "q1").unwrap().is_none());
    assert!(store.is_empty());
}

// ============================================================================
// MULTI-FIELD QUEUE
// ============================================================================

fn queue(fx: &Fixture) -> SyncQueue {
    SyncQueue::new(fx.ctx.clone(), queue_config())
}

#[tokio::test]
async fn test_queue_skips_already_synced_content() {
    let fx = fixture();
    let queue = queue(&fx);
    queue.seed_synced("q1", DraftContent::new("on server", ""));

    assert!(!queue.queue_save("q1", DraftContent::new("on server", "")));
    assert!(!queue.queue_save("q2", DraftContent::default()));
    assert_eq!(queue.pending_count(), 0);

    assert!(queue.queue_save("q1", DraftContent::new("changed", "")));
    assert!(queue.queue_save("q1", DraftContent::new("changed again", "")));
    assert_eq!(queue.pending(), vec!["q1".to_string()]);

    let report = queue.flush().await;
    assert_eq!(report.saved, 1);
    assert_eq!(fx.transport.sent_texts(), vec!["changed again".to_string()]);
    assert!(!queue.queue_save("q1", DraftContent::new("changed again", "")));
}

#[tokio::test]
async fn test_queue_retry_counters_are_per_item() {
    let fx = fixture();
    fx.transport.fail_field("q2", SyncError::Server(500));
    let queue = queue(&fx);

    queue.queue_save("q1", DraftContent::new("fine", ""));
    queue.queue_save("q2", DraftContent::new("unlucky", ""));

    let report = queue.flush().await;
    assert_eq!((report.saved, report.retained), (1, 1));
    assert_eq!(queue.retry_count("q1"), None);
    assert_eq!(queue.retry_count("q2"), Some(1));

    queue.flush().await;
    queue.flush().await;
    assert_eq!(queue.retry_count("q2"), Some(3));
    assert!(fx.listener.evicted.lock().is_empty());

    let report = queue.flush().await;
    assert_eq!(report.evicted, 1);
    assert_eq!(queue.pending_count(), 0);
    assert_eq!(*fx.listener.evicted.lock(), vec!["q2".to_string()]);

    // Evicted content is still recoverable locally
    let cached = fx.cache.load(SESSION, "q2").unwrap().unwrap();
    assert_eq!(cached.text_a, "unlucky");
    assert!(!cached.synced);
    assert!(fx.cache.load(SESSION, "q1").unwrap().unwrap().synced);
}

#[tokio::test]
async fn test_queue_evicts_permanent_rejection_immediately() {
    let fx = fixture();
    fx.transport.fail_field("q1", SyncError::Rejected("too large".into()));
    let queue = queue(&fx);

    queue.queue_save("q1", DraftContent::new("huge", ""));
    let report = queue.flush().await;

    assert_eq!(report.evicted, 1);
    assert_eq!(fx.listener.evicted.lock().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_queue_holds_while_offline_and_flushes_on_reconnect() {
    let fx = fixture();
    let queue = queue(&fx);

    queue.set_online(false);
    queue.queue_save("q1", DraftContent::new("offline edit", ""));
    let report = queue.flush().await;
    assert!(!report.ran);
    assert_eq!(fx.transport.call_count(), 0);

    queue.set_online(true);
    sleep(Duration::from_millis(10)).await;
    assert_eq!(fx.transport.call_count(), 1);
    assert_eq!(queue.pending_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_queue_flushes_periodically() {
    let fx = fixture();
    let queue = queue(&fx);
    queue.start();

    queue.queue_save("q1", DraftContent::new("tick", ""));
    sleep(Duration::from_secs(29)).await;
    assert_eq!(fx.transport.call_count(), 0);

    sleep(Duration::from_secs(2)).await;
    assert_eq!(fx.transport.call_count(), 1);

    queue.queue_save("q1", DraftContent::new("tock", ""));
    queue.shutdown();
    sleep(Duration::from_secs(60)).await;
    assert_eq!(fx.transport.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_flushes_never_overlap() {
    let fx = fixture();
    fx.transport.set_delay(Duration::from_secs(1));
    let queue = queue(&fx);
    queue.queue_save("q1", DraftContent::new("slow", ""));

    let first = {
        let queue = queue.clone();
        tokio::spawn(async move { queue.flush().await })
    };
    sleep(Duration::from_millis(10)).await;
    assert!(queue.is_flushing());

    let second = queue.flush().await;
    assert!(!second.ran);

    assert_eq!(first.await.unwrap().saved, 1);
    assert!(!queue.is_flushing());
    assert_eq!(fx.transport.call_count(), 1);
}

#[tokio::test]
async fn test_new_content_resets_item_retries() {
    let fx = fixture();
    let queue = queue(&fx);
    queue.queue_save("q1", DraftContent::new("first", ""));

    fx.transport.fail_next(SyncError::Timeout);
    queue.flush().await;
    queue.queue_save("q1", DraftContent::new("second", ""));
    assert_eq!(queue.retry_count("q1"), Some(0));

    queue.flush().await;
    assert_eq!(queue.pending_count(), 0);
    assert_eq!(
        fx.transport.sent_texts(),
        vec!["first".to_string(), "second".to_string()]
    );
}

#[tokio::test]
async fn test_unload_sends_one_beacon_per_item() {
    let fx = fixture();
    let queue = queue(&fx);
    let bus = Arc::new(SignalBus::new());
    queue.attach(bus.clone());

    queue.queue_save("q1", DraftContent::new("one", ""));
    queue.queue_save("q2", DraftContent::new("two", ""));
    bus.dispatch(&BrowserSignal::Unload);

    let beacons = fx.transport.beacons.lock().clone();
    assert_eq!(beacons.len(), 2);
    assert_eq!(beacons[0].field_id, "q1");
    assert_eq!(beacons[1].field_id, "q2");
    assert_eq!(fx.transport.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_visibility_return_triggers_flush() {
    let fx = fixture();
    let queue = queue(&fx);
    let bus = Arc::new(SignalBus::new());
    queue.attach(bus.clone());
    queue.queue_save("q1", DraftContent::new("away", ""));

    bus.dispatch(&BrowserSignal::VisibilityChange { hidden: true });
    sleep(Duration::from_millis(10)).await;
    assert_eq!(fx.transport.call_count(), 0);

    bus.dispatch(&BrowserSignal::VisibilityChange { hidden: false });
    sleep(Duration::from_millis(10)).await;
    assert_eq!(fx.transport.call_count(), 1);

    bus.dispatch(&BrowserSignal::Offline);
    assert!(!queue.is_online());

    assert_eq!(bus.listener_count(), 4);
    queue.shutdown();
    assert_eq!(bus.listener_count(), 0);
}

#[tokio::test]
async fn test_requeue_unsynced_from_cache() {
    let fx = fixture();
    let synced = DraftContent::new("safe", "");
    fx.cache.store(SESSION, "q1", &synced, 1).unwrap();
    fx.cache.mark_synced(SESSION, "q1", &synced, 1).unwrap();
    fx.cache
        .store(SESSION, "q2", &DraftContent::new("lost tab", ""), 0)
        .unwrap();

    let queue = queue(&fx);
    assert_eq!(queue.requeue_unsynced().unwrap(), 1);
    assert_eq!(queue.pending(), vec!["q2".to_string()]);

    queue.flush().await;
    assert!(fx.cache.unsynced(SESSION).unwrap().is_empty());
}
