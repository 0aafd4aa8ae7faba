//! Browser Signal Detectors
//!
//! Each detector maps a raw signal to at most one violation event and tells the
//! host whether to cancel the browser default. `IntegrityMonitor` registers them
//! on the event source while the session is active.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinHandle;

use super::devtools::{self, DevToolsHeuristic, ViewportProbe};
use super::reporter::ViolationSink;
use super::types::{ViolationEvent, ViolationKind};
use crate::logic::clock::Clock;
use crate::logic::config::DetectorConfig;
use crate::logic::events::{
    handler, BrowserSignal, Disposition, EventSource, KeyChord, ListenerId, SignalKind,
    SurfaceKind,
};

// ============================================================================
// DETECTION
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub disposition: Disposition,
    pub event: Option<ViolationEvent>,
}

impl Detection {
    /// Not a violation, let the browser proceed
    pub fn ignore() -> Self {
        Self {
            disposition: Disposition::Default,
            event: None,
        }
    }

    /// Report but let the browser proceed
    pub fn observe(event: ViolationEvent) -> Self {
        Self {
            disposition: Disposition::Default,
            event: Some(event),
        }
    }

    /// Report and cancel the browser default
    pub fn block(event: ViolationEvent) -> Self {
        Self {
            disposition: Disposition::Prevented,
            event: Some(event),
        }
    }
}

pub trait SignalDetector: Send + Sync {
    fn name(&self) -> &'static str;

    /// Signal kinds this detector listens to
    fn signals(&self) -> &'static [SignalKind];

    fn inspect(&self, signal: &BrowserSignal, now: DateTime<Utc>) -> Detection;
}

// ============================================================================
// DETECTORS
// ============================================================================

/// Tab hidden -> `tab_switch`, window blur -> `focus_loss`
#[derive(Debug, Default)]
pub struct VisibilityDetector;

impl SignalDetector for VisibilityDetector {
    fn name(&self) -> &'static str {
        "visibility"
    }

    fn signals(&self) -> &'static [SignalKind] {
        &[SignalKind::VisibilityChange, SignalKind::WindowBlur]
    }

    fn inspect(&self, signal: &BrowserSignal, now: DateTime<Utc>) -> Detection {
        match signal {
            BrowserSignal::VisibilityChange { hidden: true } => {
                Detection::observe(ViolationEvent::new(ViolationKind::TabSwitch, now))
            }
            BrowserSignal::WindowBlur => {
                Detection::observe(ViolationEvent::new(ViolationKind::FocusLoss, now))
            }
            _ => Detection::ignore(),
        }
    }
}

/// Copy/cut outside allow-listed regions
#[derive(Debug, Default)]
pub struct ClipboardDetector {
    allow_regions: Vec<String>,
}

impl ClipboardDetector {
    pub fn new(allow_regions: Vec<String>) -> Self {
        Self { allow_regions }
    }
}

impl SignalDetector for ClipboardDetector {
    fn name(&self) -> &'static str {
        "clipboard"
    }

    fn signals(&self) -> &'static [SignalKind] {
        &[SignalKind::Copy, SignalKind::Cut]
    }

    fn inspect(&self, signal: &BrowserSignal, now: DateTime<Utc>) -> Detection {
        let (target, action) = match signal {
            BrowserSignal::Copy { target } => (target, "copy"),
            BrowserSignal::Cut { target } => (target, "cut"),
            _ => return Detection::ignore(),
        };

        if target.is_inside_any(&self.allow_regions) {
            return Detection::ignore();
        }

        Detection::block(ViolationEvent::new(ViolationKind::CopyAttempt, now).with_details(action))
    }
}

/// Right-click outside allow-listed regions
#[derive(Debug, Default)]
pub struct ContextMenuDetector {
    allow_regions: Vec<String>,
}

impl ContextMenuDetector {
    pub fn new(allow_regions: Vec<String>) -> Self {
        Self { allow_regions }
    }
}

impl SignalDetector for ContextMenuDetector {
    fn name(&self) -> &'static str {
        "context_menu"
    }

    fn signals(&self) -> &'static [SignalKind] {
        &[SignalKind::ContextMenu]
    }

    fn inspect(&self, signal: &BrowserSignal, now: DateTime<Utc>) -> Detection {
        match signal {
            BrowserSignal::ContextMenu { target } if !target.is_inside_any(&self.allow_regions) => {
                Detection::block(ViolationEvent::new(ViolationKind::RightClick, now))
            }
            _ => Detection::ignore(),
        }
    }
}

/// Observes pastes into answer surfaces. Never cancels: editors need paste.
#[derive(Debug, Default)]
pub struct PasteDetector;

impl SignalDetector for PasteDetector {
    fn name(&self) -> &'static str {
        "paste"
    }

    fn signals(&self) -> &'static [SignalKind] {
        &[SignalKind::Paste]
    }

    fn inspect(&self, signal: &BrowserSignal, now: DateTime<Utc>) -> Detection {
        let BrowserSignal::Paste { target } = signal else {
            return Detection::ignore();
        };

        match target.surface {
            SurfaceKind::RichText => Detection::observe(
                ViolationEvent::new(ViolationKind::PasteAttempt, now).with_details("rich_text"),
            ),
            SurfaceKind::CodeEditor => Detection::observe(
                ViolationEvent::new(ViolationKind::PasteAttempt, now).with_details("code_editor"),
            ),
            SurfaceKind::PlainInput | SurfaceKind::Other => Detection::ignore(),
        }
    }
}

/// Cancels dev-tools opening chords
#[derive(Debug, Default)]
pub struct ShortcutDetector;

impl ShortcutDetector {
    /// F12; Ctrl/Cmd+Shift+I/J/C/K; Ctrl/Cmd+U
    pub fn is_devtools_chord(chord: &KeyChord) -> bool {
        let key = chord.key.to_ascii_uppercase();
        if key == "F12" {
            return true;
        }
        let command = chord.ctrl || chord.meta;
        if !command {
            return false;
        }
        if chord.shift {
            matches!(key.as_str(), "I" | "J" | "C" | "K")
        } else {
            key == "U"
        }
    }
}

impl SignalDetector for ShortcutDetector {
    fn name(&self) -> &'static str {
        "shortcut"
    }

    fn signals(&self) -> &'static [SignalKind] {
        &[SignalKind::KeyDown]
    }

    fn inspect(&self, signal: &BrowserSignal, now: DateTime<Utc>) -> Detection {
        match signal {
            BrowserSignal::KeyDown(chord) if Self::is_devtools_chord(chord) => Detection::block(
                ViolationEvent::new(ViolationKind::DevToolsOpen, now).with_details(chord.describe()),
            ),
            _ => Detection::ignore(),
        }
    }
}

// ============================================================================
// MONITOR
// ============================================================================

struct ActiveSet {
    listeners: Vec<ListenerId>,
    devtools: Option<JoinHandle<()>>,
}

/// Registers every detector while the session is active
pub struct IntegrityMonitor {
    source: Arc<dyn EventSource>,
    sink: ViolationSink,
    clock: Arc<dyn Clock>,
    config: DetectorConfig,
    detectors: Vec<Arc<dyn SignalDetector>>,
    probe: Option<Arc<dyn ViewportProbe>>,
    active: Mutex<Option<ActiveSet>>,
}

impl IntegrityMonitor {
    pub fn new(
        source: Arc<dyn EventSource>,
        sink: ViolationSink,
        clock: Arc<dyn Clock>,
        config: DetectorConfig,
    ) -> Self {
        let detectors: Vec<Arc<dyn SignalDetector>> = vec![
            Arc::new(VisibilityDetector),
            Arc::new(ClipboardDetector::new(config.allow_regions.clone())),
            Arc::new(ContextMenuDetector::new(config.allow_regions.clone())),
            Arc::new(PasteDetector),
            Arc::new(ShortcutDetector),
        ];

        Self {
            source,
            sink,
            clock,
            config,
            detectors,
            probe: None,
            active: Mutex::new(None),
        }
    }

    /// Enable the dev-tools heuristic
    pub fn with_viewport_probe(mut self, probe: Arc<dyn ViewportProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn is_active(&self) -> bool {
        self.active.lock().is_some()
    }

    /// Gate listeners on the session phase. Idempotent in both directions.
    pub fn set_active(&self, active: bool) {
        let mut current = self.active.lock();
        match (active, current.is_some()) {
            (true, false) => {
                *current = Some(self.register());
                log::info!("Integrity detectors registered");
            }
            (false, true) => {
                if let Some(set) = current.take() {
                    self.deregister(set);
                }
                log::info!("Integrity detectors deregistered");
            }
            _ => {}
        }
    }

    fn register(&self) -> ActiveSet {
        let mut listeners = Vec::new();

        for detector in &self.detectors {
            for kind in detector.signals() {
                let detector = detector.clone();
                let sink = self.sink.clone();
                let clock = self.clock.clone();
                let id = self.source.add_listener(
                    *kind,
                    handler(move |signal| {
                        let detection = detector.inspect(signal, clock.now());
                        if let Some(event) = detection.event {
                            log::debug!("{} detector: {}", detector.name(), event.kind);
                            sink.emit(event);
                        }
                        detection.disposition
                    }),
                );
                listeners.push(id);
            }
        }

        let devtools = self.probe.as_ref().and_then(|probe| {
            let Ok(runtime) = tokio::runtime::Handle::try_current() else {
                log::warn!("No runtime, dev-tools heuristic disabled");
                return None;
            };
            let poll = self.config.effective_poll();
            let heuristic = DevToolsHeuristic::new(self.config.devtools_threshold_px, poll);
            Some(runtime.spawn(devtools::watch(
                probe.clone(),
                heuristic,
                self.sink.clone(),
                self.clock.clone(),
                poll,
            )))
        });

        ActiveSet {
            listeners,
            devtools,
        }
    }

    fn deregister(&self, set: ActiveSet) {
        for id in set.listeners {
            self.source.remove_listener(id);
        }
        if let Some(task) = set.devtools {
            task.abort();
        }
    }
}

impl Drop for IntegrityMonitor {
    fn drop(&mut self) {
        if let Some(set) = self.active.get_mut().take() {
            self.deregister(set);
        }
    }
}
