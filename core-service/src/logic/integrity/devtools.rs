//! Dev-Tools Heuristic
//!
//! Best-effort signal, not ground truth. Docked inspectors shrink the inner
//! viewport; an undocked inspector renders the probe object and trips its getter.
//! Split screen and unusual zoom also trip the viewport check.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};

use super::reporter::ViolationSink;
use super::types::{ViolationEvent, ViolationKind};
use crate::logic::clock::Clock;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ViewportSample {
    pub outer_width: u32,
    pub outer_height: u32,
    pub inner_width: u32,
    pub inner_height: u32,
}

impl ViewportSample {
    /// (width, height) the chrome + inspector take up
    pub fn delta(&self) -> (u32, u32) {
        (
            self.outer_width.saturating_sub(self.inner_width),
            self.outer_height.saturating_sub(self.inner_height),
        )
    }
}

pub trait ViewportProbe: Send + Sync {
    fn sample(&self) -> ViewportSample;

    /// True when the probe object's getter ran since the last call
    fn inspector_probe(&self) -> bool {
        false
    }
}

/// Edge-triggered, throttled dev-tools classifier
#[derive(Debug, Clone)]
pub struct DevToolsHeuristic {
    threshold_px: u32,
    min_gap: Duration,
    was_open: bool,
    last_report: Option<Instant>,
}

impl DevToolsHeuristic {
    pub fn new(threshold_px: u32, min_gap: Duration) -> Self {
        Self {
            threshold_px,
            min_gap,
            was_open: false,
            last_report: None,
        }
    }

    /// Returns report details when a closed -> open transition should be reported
    pub fn evaluate(&mut self, sample: ViewportSample, inspector_fired: bool, now: Instant) -> Option<String> {
        let (dw, dh) = sample.delta();

        let reason = if inspector_fired {
            Some("inspector probe".to_string())
        } else if dw > self.threshold_px || dh > self.threshold_px {
            Some(format!("viewport delta {}x{}px", dw, dh))
        } else {
            None
        };

        let Some(reason) = reason else {
            self.was_open = false;
            return None;
        };

        if self.was_open {
            return None;
        }

        if let Some(last) = self.last_report {
            if now.duration_since(last) < self.min_gap {
                return None;
            }
        }

        self.was_open = true;
        self.last_report = Some(now);
        Some(reason)
    }
}

/// Poll loop; runs until aborted by the monitor
pub(crate) async fn watch(
    probe: Arc<dyn ViewportProbe>,
    mut heuristic: DevToolsHeuristic,
    sink: ViolationSink,
    clock: Arc<dyn Clock>,
    poll: Duration,
) {
    let mut ticker = tokio::time::interval(poll);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let sample = probe.sample();
        let fired = probe.inspector_probe();
        if let Some(details) = heuristic.evaluate(sample, fired, Instant::now()) {
            log::debug!("Dev-tools heuristic tripped: {}", details);
            sink.emit(ViolationEvent::new(ViolationKind::DevToolsOpen, clock.now()).with_details(details));
        }
    }
}
