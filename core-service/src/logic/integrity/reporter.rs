//! Violation Reporter
//!
//! Sends each event to the scoring authority and replaces the local integrity
//! state with the reply. No local threshold arithmetic: `clean -> warned(n) ->
//! disqualified` is whatever the authority says.
//!
//! Report failures are logged and dropped, never retried. The authoritative
//! counts live server-side.

use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;

use super::types::{IntegrityConfig, IntegrityState, ViolationEvent};
use crate::logic::cloud_sync::ScoringAuthority;

const DEFAULT_DISQUALIFICATION_REASON: &str = "Integrity violation threshold exceeded";

/// UI hooks for escalation
pub trait IntegrityListener: Send + Sync {
    /// Authority asked for a warning modal
    fn on_warning(&self, _warning_count: u32, _score: f64) {}

    /// Terminal; nothing after this changes visible state
    fn on_disqualified(&self, _reason: &str) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopIntegrityListener;

impl IntegrityListener for NoopIntegrityListener {}

/// Where detectors hand their events
#[derive(Debug, Clone)]
pub struct ViolationSink {
    tx: mpsc::UnboundedSender<ViolationEvent>,
}

impl ViolationSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ViolationEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn emit(&self, event: ViolationEvent) {
        if let Err(e) = self.tx.send(event) {
            log::debug!("Reporter stopped, {} dropped", e.0.kind);
        }
    }
}

struct ReporterShared {
    authority: Arc<dyn ScoringAuthority>,
    listener: Arc<dyn IntegrityListener>,
    state: RwLock<IntegrityState>,
    state_tx: watch::Sender<IntegrityState>,
    config: RwLock<Option<IntegrityConfig>>,
    /// Held for a whole round trip; worker and direct reports take turns
    in_flight: AsyncMutex<()>,
}

impl ReporterShared {
    async fn process(&self, event: ViolationEvent) {
        let _turn = self.in_flight.lock().await;
        if self.state.read().is_disqualified {
            log::debug!("Session disqualified, {} not reported", event.kind);
            return;
        }

        let verdict = match self.authority.report_violation(&event).await {
            Ok(verdict) => verdict,
            Err(e) => {
                log::warn!("Violation report {} dropped: {}", event.kind, e);
                return;
            }
        };

        let next = IntegrityState::from(&verdict);
        {
            let mut state = self.state.write();
            // Frozen once disqualified, even if an older reply lands late
            if state.is_disqualified {
                return;
            }
            *state = next.clone();
        }
        self.state_tx.send_replace(next.clone());

        if next.is_disqualified {
            let reason = next
                .disqualification_reason
                .as_deref()
                .unwrap_or(DEFAULT_DISQUALIFICATION_REASON);
            log::warn!("Session disqualified: {} (score {:.1})", reason, next.violation_score);
            self.listener.on_disqualified(reason);
        } else if verdict.should_warn {
            log::info!(
                "Integrity warning #{} (score {:.1})",
                next.warning_count,
                next.violation_score
            );
            self.listener.on_warning(next.warning_count, next.violation_score);
        }
    }
}

pub struct ViolationReporter {
    shared: Arc<ReporterShared>,
    sink: ViolationSink,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ViolationReporter {
    /// Start the reporter worker. Must run inside a tokio runtime.
    pub fn spawn(authority: Arc<dyn ScoringAuthority>, listener: Arc<dyn IntegrityListener>) -> Self {
        let (sink, rx) = ViolationSink::channel();
        let (state_tx, _) = watch::channel(IntegrityState::default());
        let shared = Arc::new(ReporterShared {
            authority,
            listener,
            state: RwLock::new(IntegrityState::default()),
            state_tx,
            config: RwLock::new(None),
            in_flight: AsyncMutex::new(()),
        });

        let worker = tokio::spawn(Self::run(shared.clone(), rx));

        Self {
            shared,
            sink,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Events are reported one at a time, in arrival order
    async fn run(shared: Arc<ReporterShared>, mut rx: mpsc::UnboundedReceiver<ViolationEvent>) {
        while let Some(event) = rx.recv().await {
            shared.process(event).await;
        }
    }

    pub fn sink(&self) -> ViolationSink {
        self.sink.clone()
    }

    /// Report directly and return the resulting state. Waits its turn behind
    /// any sink event already being reported.
    pub async fn report(&self, event: ViolationEvent) -> IntegrityState {
        self.shared.process(event).await;
        self.state()
    }

    pub fn state(&self) -> IntegrityState {
        self.shared.state.read().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<IntegrityState> {
        self.shared.state_tx.subscribe()
    }

    pub fn is_disqualified(&self) -> bool {
        self.shared.state.read().is_disqualified
    }

    /// Fetch weights and thresholds for display. Failures are logged.
    pub async fn load_config(&self) -> Option<IntegrityConfig> {
        match self.shared.authority.fetch_config().await {
            Ok(config) => {
                *self.shared.config.write() = Some(config.clone());
                Some(config)
            }
            Err(e) => {
                log::warn!("Integrity config fetch failed: {}", e);
                None
            }
        }
    }

    pub fn config(&self) -> Option<IntegrityConfig> {
        self.shared.config.read().clone()
    }

    /// Mirror an administrative reinstatement: back to the all-zero state
    pub fn reinstate(&self) {
        *self.shared.state.write() = IntegrityState::default();
        self.shared.state_tx.send_replace(IntegrityState::default());
        log::info!("Integrity state reset by reinstatement");
    }

    pub fn shutdown(&self) {
        if let Some(worker) = self.worker.lock().take() {
            worker.abort();
        }
    }
}

impl Drop for ViolationReporter {
    fn drop(&mut self) {
        self.shutdown();
    }
}
