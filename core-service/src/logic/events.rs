//! Browser Signal Bus
//!
//! Injectable stand-in for browser-global listeners (visibility, blur, clipboard,
//! context menu, keyboard, connectivity, unload). The host feeds raw signals
//! through `SignalBus::dispatch` and cancels the browser default when the result
//! is `Disposition::Prevented`.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Listener categories, one per browser event family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    VisibilityChange,
    WindowBlur,
    Copy,
    Cut,
    ContextMenu,
    Paste,
    KeyDown,
    Online,
    Offline,
    Unload,
}

/// What kind of element the event landed on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SurfaceKind {
    RichText,
    CodeEditor,
    PlainInput,
    #[default]
    Other,
}

/// Event target: surface kind plus the region ids of every ancestor
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventTarget {
    pub surface: SurfaceKind,
    pub regions: Vec<String>,
}

impl EventTarget {
    pub fn new(surface: SurfaceKind) -> Self {
        Self {
            surface,
            regions: Vec::new(),
        }
    }

    pub fn in_region(mut self, region: impl Into<String>) -> Self {
        self.regions.push(region.into());
        self
    }

    pub fn is_inside_any(&self, allowed: &[String]) -> bool {
        self.regions.iter().any(|r| allowed.contains(r))
    }
}

/// A key press with its modifiers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyChord {
    pub key: String,
    pub ctrl: bool,
    pub meta: bool,
    pub shift: bool,
    pub alt: bool,
}

impl KeyChord {
    pub fn key(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Default::default()
        }
    }

    pub fn ctrl(mut self) -> Self {
        self.ctrl = true;
        self
    }

    pub fn meta(mut self) -> Self {
        self.meta = true;
        self
    }

    pub fn shift(mut self) -> Self {
        self.shift = true;
        self
    }

    /// Human readable form, e.g. `Ctrl+Shift+I`
    pub fn describe(&self) -> String {
        let key = if self.key.chars().count() == 1 {
            self.key.to_uppercase()
        } else {
            self.key.clone()
        };
        let mut parts: Vec<&str> = Vec::new();
        if self.ctrl {
            parts.push("Ctrl");
        }
        if self.meta {
            parts.push("Cmd");
        }
        if self.alt {
            parts.push("Alt");
        }
        if self.shift {
            parts.push("Shift");
        }
        parts.push(key.as_str());
        parts.join("+")
    }
}

/// Raw browser signal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowserSignal {
    VisibilityChange { hidden: bool },
    WindowBlur,
    Copy { target: EventTarget },
    Cut { target: EventTarget },
    ContextMenu { target: EventTarget },
    Paste { target: EventTarget },
    KeyDown(KeyChord),
    Online,
    Offline,
    Unload,
}

impl BrowserSignal {
    pub fn kind(&self) -> SignalKind {
        match self {
            BrowserSignal::VisibilityChange { .. } => SignalKind::VisibilityChange,
            BrowserSignal::WindowBlur => SignalKind::WindowBlur,
            BrowserSignal::Copy { .. } => SignalKind::Copy,
            BrowserSignal::Cut { .. } => SignalKind::Cut,
            BrowserSignal::ContextMenu { .. } => SignalKind::ContextMenu,
            BrowserSignal::Paste { .. } => SignalKind::Paste,
            BrowserSignal::KeyDown(_) => SignalKind::KeyDown,
            BrowserSignal::Online => SignalKind::Online,
            BrowserSignal::Offline => SignalKind::Offline,
            BrowserSignal::Unload => SignalKind::Unload,
        }
    }
}

/// Whether the browser default action should run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Default,
    Prevented,
}

pub type SignalHandler = Arc<dyn Fn(&BrowserSignal) -> Disposition + Send + Sync>;

/// Box a closure as a `SignalHandler`
pub fn handler<F>(f: F) -> SignalHandler
where
    F: Fn(&BrowserSignal) -> Disposition + Send + Sync + 'static,
{
    Arc::new(f)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Registration surface for browser-level listeners
pub trait EventSource: Send + Sync {
    fn add_listener(&self, kind: SignalKind, handler: SignalHandler) -> ListenerId;

    /// Returns false when the id was not registered
    fn remove_listener(&self, id: ListenerId) -> bool;
}

struct Registration {
    id: ListenerId,
    kind: SignalKind,
    handler: SignalHandler,
}

/// In-process event source
#[derive(Default)]
pub struct SignalBus {
    listeners: RwLock<Vec<Registration>>,
    next_id: AtomicU64,
}

impl SignalBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a signal to every listener of its kind
    pub fn dispatch(&self, signal: &BrowserSignal) -> Disposition {
        let kind = signal.kind();
        // Handlers may add/remove listeners, so never call them under the lock
        let handlers: Vec<SignalHandler> = self
            .listeners
            .read()
            .iter()
            .filter(|r| r.kind == kind)
            .map(|r| r.handler.clone())
            .collect();

        let mut disposition = Disposition::Default;
        for handler in handlers {
            if handler(signal) == Disposition::Prevented {
                disposition = Disposition::Prevented;
            }
        }
        disposition
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn listener_count_for(&self, kind: SignalKind) -> usize {
        self.listeners.read().iter().filter(|r| r.kind == kind).count()
    }
}

impl EventSource for SignalBus {
    fn add_listener(&self, kind: SignalKind, handler: SignalHandler) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push(Registration { id, kind, handler });
        id
    }

    fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|r| r.id != id);
        listeners.len() != before
    }
}
