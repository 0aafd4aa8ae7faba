//! Assessment Session
//!
//! Session-scoped owner of every component: the active-phase gate for the
//! detectors, the countdown, one draft engine per field, the sync queue and the
//! one-shot final submit. Expiry deactivates the detectors and flushes every
//! field; teardown releases listeners and timers.

use parking_lot::RwLock;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::watch;

use crate::logic::clock::{Clock, SystemClock};
use crate::logic::cloud_sync::{DraftTransport, ScoringAuthority, SubmissionTransport, SyncError};
use crate::logic::config::SessionConfig;
use crate::logic::drafts::{
    DraftContext, DraftListener, DraftSyncEngine, FinalAnswer, HydrationSource, KvStore,
    LocalPersistenceCache, NoopDraftListener, SubmitResponse, SyncQueue,
};
use crate::logic::events::EventSource;
use crate::logic::integrity::{
    IntegrityListener, IntegrityMonitor, IntegrityState, NoopIntegrityListener, ViewportProbe,
    ViolationReporter,
};
use crate::logic::timer::{SessionTimer, TimerSeed};

/// Host-supplied collaborators; everything optional has a no-op default
#[derive(Clone)]
pub struct SessionHooks {
    pub integrity: Arc<dyn IntegrityListener>,
    pub drafts: Arc<dyn DraftListener>,
    pub clock: Arc<dyn Clock>,
    /// Durable substrate for the local draft cache
    pub store: Option<Arc<dyn KvStore>>,
    /// Enables the dev-tools viewport heuristic
    pub viewport: Option<Arc<dyn ViewportProbe>>,
    /// Called once when the countdown reaches zero
    pub on_expire: Option<Arc<dyn Fn() + Send + Sync>>,
}

impl Default for SessionHooks {
    fn default() -> Self {
        Self {
            integrity: Arc::new(NoopIntegrityListener),
            drafts: Arc::new(NoopDraftListener),
            clock: Arc::new(SystemClock),
            store: None,
            viewport: None,
            on_expire: None,
        }
    }
}

struct SessionInner {
    token: String,
    config: SessionConfig,
    source: Arc<dyn EventSource>,
    submitter: Arc<dyn SubmissionTransport>,
    draft_ctx: DraftContext,
    reporter: ViolationReporter,
    monitor: IntegrityMonitor,
    timer: SessionTimer,
    engines: RwLock<BTreeMap<String, DraftSyncEngine>>,
    queue: SyncQueue,
    on_expire: Option<Arc<dyn Fn() + Send + Sync>>,
    started: AtomicBool,
    submitted: AtomicBool,
    closed: AtomicBool,
}

/// One timed assessment attempt. Must be created inside a tokio runtime.
#[derive(Clone)]
pub struct AssessmentSession {
    inner: Arc<SessionInner>,
}

impl AssessmentSession {
    pub fn new<B>(
        token: impl Into<String>,
        backend: Arc<B>,
        source: Arc<dyn EventSource>,
        config: SessionConfig,
        hooks: SessionHooks,
    ) -> Self
    where
        B: ScoringAuthority + DraftTransport + SubmissionTransport + 'static,
    {
        let token = token.into();
        let clock = hooks.clock.clone();

        let cache = hooks
            .store
            .clone()
            .map(|store| LocalPersistenceCache::new(store, clock.clone(), &config.cache));
        let mut draft_ctx = DraftContext::new(token.clone(), backend.clone())
            .with_listener(hooks.drafts.clone())
            .with_clock(clock.clone());
        if let Some(cache) = cache {
            draft_ctx = draft_ctx.with_cache(cache);
        }

        let reporter = ViolationReporter::spawn(backend.clone(), hooks.integrity.clone());
        let mut monitor = IntegrityMonitor::new(
            source.clone(),
            reporter.sink(),
            clock.clone(),
            config.detectors.clone(),
        );
        if let Some(probe) = hooks.viewport.clone() {
            monitor = monitor.with_viewport_probe(probe);
        }
        let queue = SyncQueue::new(draft_ctx.clone(), config.queue.clone());

        let inner = Arc::new_cyclic(|weak: &Weak<SessionInner>| {
            let weak = weak.clone();
            let timer = SessionTimer::new(
                clock.clone(),
                Arc::new(move || {
                    if let Some(inner) = weak.upgrade() {
                        AssessmentSession { inner }.handle_expiry();
                    }
                }),
            );

            SessionInner {
                token,
                config,
                source,
                submitter: backend,
                draft_ctx,
                reporter,
                monitor,
                timer,
                engines: RwLock::new(BTreeMap::new()),
                queue,
                on_expire: hooks.on_expire,
                started: AtomicBool::new(false),
                submitted: AtomicBool::new(false),
                closed: AtomicBool::new(false),
            }
        });

        Self { inner }
    }

    pub fn token(&self) -> &str {
        &self.inner.token
    }

    /// Enter the active phase: arm the countdown, register detectors, start the queue.
    /// Calling it again only re-arms the countdown.
    pub fn start(&self, seed: TimerSeed) {
        let inner = &self.inner;
        inner.timer.arm(seed);
        if inner.started.swap(true, Ordering::SeqCst) {
            return;
        }

        inner.monitor.set_active(true);
        inner.queue.attach(inner.source.clone());
        inner.queue.start();

        if let Some(cache) = &inner.draft_ctx.cache {
            if let Err(e) = cache.purge_expired() {
                log::warn!("Draft cache purge failed: {}", e);
            }
        }
        log::info!("Session {} started", inner.token);
    }

    pub fn is_active(&self) -> bool {
        self.inner.monitor.is_active()
    }

    /// Engine for a field, created on first use
    pub fn field(&self, field_id: &str) -> DraftSyncEngine {
        if let Some(engine) = self.inner.engines.read().get(field_id) {
            return engine.clone();
        }
        self.inner
            .engines
            .write()
            .entry(field_id.to_string())
            .or_insert_with(|| {
                DraftSyncEngine::new(
                    field_id,
                    self.inner.draft_ctx.clone(),
                    self.inner.config.drafts.clone(),
                )
            })
            .clone()
    }

    pub fn queue(&self) -> &SyncQueue {
        &self.inner.queue
    }

    pub fn reporter(&self) -> &ViolationReporter {
        &self.inner.reporter
    }

    pub fn integrity(&self) -> IntegrityState {
        self.inner.reporter.state()
    }

    pub fn remaining(&self) -> u64 {
        self.inner.timer.remaining()
    }

    pub fn subscribe_remaining(&self) -> watch::Receiver<u64> {
        self.inner.timer.subscribe()
    }

    pub fn is_expired(&self) -> bool {
        self.inner.timer.is_expired()
    }

    /// Seed every field from the server and the local cache.
    /// Returns how many fields were recovered from unsynced local content.
    pub async fn hydrate_all(&self) -> Result<usize, SyncError> {
        let server_drafts = self.inner.draft_ctx.transport.load_drafts().await?;
        let mut seen = HashSet::new();
        let mut recovered = 0;

        for draft in &server_drafts {
            self.inner.queue.seed_synced(&draft.field_id, draft.content());
            let hydration = self.field(&draft.field_id).hydrate(Some(draft));
            if hydration.source == HydrationSource::Local && hydration.content != draft.content() {
                recovered += 1;
            }
            seen.insert(draft.field_id.clone());
        }

        // Fields the server never saw but the cache still holds
        if let Some(cache) = &self.inner.draft_ctx.cache {
            let unsynced = cache.unsynced(&self.inner.token).unwrap_or_else(|e| {
                log::warn!("Draft cache sweep failed: {}", e);
                Vec::new()
            });
            for (field_id, _) in unsynced {
                if seen.insert(field_id.clone()) {
                    self.field(&field_id).hydrate(None);
                    recovered += 1;
                }
            }
        }

        if recovered > 0 {
            log::info!("Recovered {} unsynced drafts for session {}", recovered, self.inner.token);
        }
        Ok(recovered)
    }

    /// Load authoritative integrity weights and thresholds for display
    pub async fn load_integrity_config(&self) -> bool {
        self.inner.reporter.load_config().await.is_some()
    }

    /// Flush every field engine, then the queue.
    /// Returns the field ids still unsynced afterwards.
    pub async fn flush_all(&self) -> Vec<String> {
        let engines: Vec<DraftSyncEngine> = self.inner.engines.read().values().cloned().collect();
        for engine in &engines {
            engine.flush().await;
        }
        self.inner.queue.flush().await;

        let mut unsynced: Vec<String> = engines
            .iter()
            .filter(|e| e.is_dirty())
            .map(|e| e.field_id().to_string())
            .collect();
        unsynced.extend(self.inner.queue.pending());
        unsynced.sort();
        unsynced.dedup();
        unsynced
    }

    /// Current content of every known field
    pub fn final_answers(&self) -> Vec<FinalAnswer> {
        self.inner
            .engines
            .read()
            .values()
            .map(|engine| FinalAnswer::from_record(&engine.record()))
            .collect()
    }

    /// One-shot batch submit. A second call returns `AlreadySubmitted`; a failed
    /// call releases the guard so the caller may retry explicitly.
    pub async fn submit(&self, answers: Vec<FinalAnswer>) -> Result<SubmitResponse, SyncError> {
        let inner = &self.inner;
        if inner.submitted.swap(true, Ordering::SeqCst) {
            log::warn!("Duplicate submit for session {} ignored", inner.token);
            return Err(SyncError::AlreadySubmitted);
        }

        let unsynced = self.flush_all().await;
        if !unsynced.is_empty() {
            log::debug!("Submitting with {} unsynced drafts", unsynced.len());
        }

        match inner.submitter.submit_answers(&answers).await {
            Ok(response) => {
                log::info!(
                    "Session {} submitted ({} answers accepted)",
                    inner.token,
                    response.accepted
                );
                if let Some(cache) = &inner.draft_ctx.cache {
                    if let Err(e) = cache.mark_all_synced(&inner.token) {
                        log::warn!("Draft cache update after submit failed: {}", e);
                    }
                }
                self.teardown();
                Ok(response)
            }
            Err(e) => {
                log::warn!("Submit for session {} failed: {}", inner.token, e);
                inner.submitted.store(false, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    pub fn is_submitted(&self) -> bool {
        self.inner.submitted.load(Ordering::SeqCst)
    }

    fn handle_expiry(&self) {
        log::info!("Session {} time is up", self.inner.token);
        self.inner.monitor.set_active(false);
        if let Some(callback) = &self.inner.on_expire {
            callback();
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            log::warn!("No runtime, final flush skipped");
            return;
        };
        let session = self.clone();
        runtime.spawn(async move {
            let unsynced = session.flush_all().await;
            if !unsynced.is_empty() {
                log::warn!("{} drafts unsynced at expiry", unsynced.len());
            }
        });
    }

    /// Release every listener and timer. Idempotent.
    pub fn teardown(&self) {
        let inner = &self.inner;
        if inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        inner.monitor.set_active(false);
        inner.timer.disarm();
        inner.queue.shutdown();
        for engine in inner.engines.read().values() {
            engine.shutdown();
        }
        inner.reporter.shutdown();
        log::info!("Session {} torn down", inner.token);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::clock::ManualClock;
    use crate::logic::drafts::{
        DraftContent, DraftSaveRequest, DraftSaveResponse, MemoryStore, ServerDraft,
    };
    use crate::logic::events::{BrowserSignal, SignalBus};
    use crate::logic::integrity::{IntegrityConfig, ViolationEvent, ViolationKind, ViolationVerdict};
    use async_trait::async_trait;
    use chrono::Utc;
    use parking_lot::Mutex;
    use std::collections::BTreeMap;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::time::sleep;

    #[derive(Default)]
    struct MockBackend {
        violations: Mutex<Vec<ViolationEvent>>,
        saves: Mutex<Vec<DraftSaveRequest>>,
        server_drafts: Mutex<Vec<ServerDraft>>,
        submits: AtomicUsize,
        fail_submit: AtomicBool,
    }

    #[async_trait]
    impl ScoringAuthority for MockBackend {
        async fn report_violation(&self, event: &ViolationEvent) -> Result<ViolationVerdict, SyncError> {
            let mut violations = self.violations.lock();
            violations.push(event.clone());
            let mut counts = BTreeMap::new();
            for v in violations.iter() {
                *counts.entry(v.kind).or_insert(0) += 1;
            }
            Ok(ViolationVerdict {
                counts,
                violation_score: violations.len() as f64,
                ..Default::default()
            })
        }

        async fn fetch_config(&self) -> Result<IntegrityConfig, SyncError> {
            Ok(IntegrityConfig {
                warning_threshold: 2.0,
                disqualification_threshold: 5.0,
                violation_weights: BTreeMap::new(),
            })
        }
    }

    #[async_trait]
    impl DraftTransport for MockBackend {
        async fn save_draft(&self, request: &DraftSaveRequest) -> Result<DraftSaveResponse, SyncError> {
            let mut saves = self.saves.lock();
            saves.push(request.clone());
            Ok(DraftSaveResponse {
                success: true,
                field_id: request.field_id.clone(),
                saved_at: Utc::now(),
                version: saves.len() as u64,
            })
        }

        async fn load_drafts(&self) -> Result<Vec<ServerDraft>, SyncError> {
            Ok(self.server_drafts.lock().clone())
        }

        fn send_beacon(&self, _request: &DraftSaveRequest) -> bool {
            true
        }
    }

    #[async_trait]
    impl SubmissionTransport for MockBackend {
        async fn submit_answers(&self, answers: &[FinalAnswer]) -> Result<SubmitResponse, SyncError> {
            tokio::task::yield_now().await;
            if self.fail_submit.load(Ordering::SeqCst) {
                return Err(SyncError::Server(502));
            }
            self.submits.fetch_add(1, Ordering::SeqCst);
            Ok(SubmitResponse {
                accepted: answers.len(),
                submitted_at: Utc::now(),
            })
        }
    }

    fn config() -> SessionConfig {
        let mut config = SessionConfig::default();
        config.drafts.debounce = Duration::from_secs(60);
        config.queue.flush_interval = Duration::from_secs(30);
        config
    }

    fn session(backend: Arc<MockBackend>, hooks: SessionHooks) -> (Arc<SignalBus>, AssessmentSession) {
        let bus = Arc::new(SignalBus::new());
        let session = AssessmentSession::new("sess-1", backend, bus.clone(), config(), hooks);
        (bus, session)
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_and_teardown_manage_listeners() {
        let (bus, session) = session(Arc::new(MockBackend::default()), SessionHooks::default());
        assert_eq!(bus.listener_count(), 0);

        session.start(TimerSeed::Remaining(600));
        let registered = bus.listener_count();
        assert!(session.is_active());
        assert!(registered > 0);

        session.start(TimerSeed::Remaining(300));
        assert_eq!(bus.listener_count(), registered);

        session.teardown();
        session.teardown();
        assert_eq!(bus.listener_count(), 0);
        assert!(!session.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_detected_violation_reaches_backend() {
        let backend = Arc::new(MockBackend::default());
        let (bus, session) = session(backend.clone(), SessionHooks::default());
        session.start(TimerSeed::Remaining(600));

        bus.dispatch(&BrowserSignal::VisibilityChange { hidden: true });
        sleep(Duration::from_millis(10)).await;

        assert_eq!(backend.violations.lock().len(), 1);
        assert_eq!(session.integrity().count(ViolationKind::TabSwitch), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_deactivates_and_flushes() {
        let backend = Arc::new(MockBackend::default());
        let expired = Arc::new(AtomicUsize::new(0));
        let counter = expired.clone();
        let hooks = SessionHooks {
            on_expire: Some(Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })),
            ..Default::default()
        };
        let (bus, session) = session(backend.clone(), hooks);
        session.start(TimerSeed::Remaining(3));

        session.field("q1").edit("last second answer", "");
        sleep(Duration::from_millis(3500)).await;

        assert!(session.is_expired());
        assert!(!session.is_active());
        assert_eq!(expired.load(Ordering::SeqCst), 1);
        assert_eq!(backend.saves.lock().len(), 1);

        // Detectors are gone after expiry
        bus.dispatch(&BrowserSignal::WindowBlur);
        sleep(Duration::from_millis(10)).await;
        assert!(backend.violations.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_exactly_once() {
        let backend = Arc::new(MockBackend::default());
        let (bus, session) = session(backend.clone(), SessionHooks::default());
        session.start(TimerSeed::Remaining(600));
        session.field("q1").edit("final", "");

        let answers = session.final_answers();
        let (first, second) = tokio::join!(session.submit(answers.clone()), session.submit(answers));

        assert!(first.is_ok() ^ second.is_ok());
        let rejected = if first.is_err() { first } else { second };
        assert_eq!(rejected.unwrap_err(), SyncError::AlreadySubmitted);
        assert_eq!(backend.submits.load(Ordering::SeqCst), 1);
        assert_eq!(backend.saves.lock().len(), 1);

        assert!(session.is_submitted());
        assert_eq!(bus.listener_count(), 0);
        assert_eq!(
            session.submit(Vec::new()).await.unwrap_err(),
            SyncError::AlreadySubmitted
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_submit_can_be_retried() {
        let backend = Arc::new(MockBackend::default());
        let (_bus, session) = session(backend.clone(), SessionHooks::default());
        session.start(TimerSeed::Remaining(600));

        backend.fail_submit.store(true, Ordering::SeqCst);
        assert_eq!(session.submit(Vec::new()).await.unwrap_err(), SyncError::Server(502));
        assert!(!session.is_submitted());

        backend.fail_submit.store(false, Ordering::SeqCst);
        assert!(session.submit(Vec::new()).await.is_ok());
        assert_eq!(backend.submits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hydrate_all_recovers_cached_fields() {
        let backend = Arc::new(MockBackend::default());
        backend.server_drafts.lock().push(ServerDraft {
            field_id: "q1".to_string(),
            text_a: "on server".to_string(),
            text_b: String::new(),
            version: 4,
            updated_at: Utc::now(),
        });

        let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::default());
        let cache = LocalPersistenceCache::new(store.clone(), clock.clone(), &config().cache);
        cache
            .store("sess-1", "q2", &DraftContent::new("never reached server", ""), 0)
            .unwrap();
        clock.advance(chrono::Duration::minutes(1));

        let hooks = SessionHooks {
            store: Some(store),
            clock: clock.clone(),
            ..Default::default()
        };
        let (_bus, session) = session(backend.clone(), hooks);

        assert_eq!(session.hydrate_all().await.unwrap(), 1);
        assert_eq!(session.field("q1").record().text_a, "on server");
        assert!(!session.field("q1").is_dirty());
        assert!(session.field("q2").is_dirty());

        assert!(session.flush_all().await.is_empty());
        let saves = backend.saves.lock();
        assert_eq!(saves.len(), 1);
        assert_eq!(saves[0].field_id, "q2");
    }
}
