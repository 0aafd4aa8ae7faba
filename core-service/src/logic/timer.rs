//! Session Timer
//!
//! One-second countdown with exactly-once expiry. Re-arming aborts the previous
//! countdown before a new one starts, so a stale interval can never fire.
//! Window-seeded timers recompute remaining time from the wall clock on every
//! tick instead of trusting accumulated ticks over long sessions.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::constants;
use crate::logic::clock::Clock;

pub type ExpiryCallback = Arc<dyn Fn() + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerSeed {
    /// Server-supplied remaining seconds snapshot
    Remaining(u64),
    /// Remaining = start + duration - now
    Window {
        start: DateTime<Utc>,
        duration: chrono::Duration,
    },
}

impl TimerSeed {
    pub fn remaining_at(&self, now: DateTime<Utc>) -> u64 {
        match self {
            TimerSeed::Remaining(secs) => *secs,
            TimerSeed::Window { start, duration } => {
                // Round up so zero is only shown once the window has closed
                let left_ms = ((*start + *duration) - now).num_milliseconds();
                if left_ms <= 0 {
                    0
                } else {
                    ((left_ms + 999) / 1000) as u64
                }
            }
        }
    }
}

struct Countdown {
    task: JoinHandle<()>,
}

pub struct SessionTimer {
    clock: Arc<dyn Clock>,
    on_expire: ExpiryCallback,
    remaining_tx: watch::Sender<u64>,
    expired: Arc<AtomicBool>,
    countdown: Mutex<Option<Countdown>>,
    tick: Duration,
}

impl SessionTimer {
    pub fn new(clock: Arc<dyn Clock>, on_expire: ExpiryCallback) -> Self {
        let (remaining_tx, _) = watch::channel(0);
        Self {
            clock,
            on_expire,
            remaining_tx,
            expired: Arc::new(AtomicBool::new(false)),
            countdown: Mutex::new(None),
            tick: Duration::from_millis(constants::TIMER_TICK_MS),
        }
    }

    /// Start (or restart) the countdown. Must run inside a tokio runtime.
    pub fn arm(&self, seed: TimerSeed) {
        let mut countdown = self.countdown.lock();
        if let Some(previous) = countdown.take() {
            previous.task.abort();
            log::debug!("Session timer re-armed");
        }

        // Fresh flag per countdown; the aborted one can no longer reach its own
        let fired = Arc::new(AtomicBool::new(false));
        self.expired.store(false, Ordering::SeqCst);

        let task = tokio::spawn(run_countdown(
            seed,
            self.clock.clone(),
            self.remaining_tx.clone(),
            fired,
            self.expired.clone(),
            self.on_expire.clone(),
            self.tick,
        ));
        *countdown = Some(Countdown { task });
    }

    pub fn disarm(&self) {
        if let Some(previous) = self.countdown.lock().take() {
            previous.task.abort();
        }
    }

    pub fn remaining(&self) -> u64 {
        *self.remaining_tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.remaining_tx.subscribe()
    }

    pub fn is_expired(&self) -> bool {
        self.expired.load(Ordering::SeqCst)
    }
}

impl Drop for SessionTimer {
    fn drop(&mut self) {
        self.disarm();
    }
}

async fn run_countdown(
    seed: TimerSeed,
    clock: Arc<dyn Clock>,
    remaining_tx: watch::Sender<u64>,
    fired: Arc<AtomicBool>,
    expired: Arc<AtomicBool>,
    on_expire: ExpiryCallback,
    tick: Duration,
) {
    let mut remaining = seed.remaining_at(clock.now());
    remaining_tx.send_replace(remaining);

    let mut ticker = tokio::time::interval(tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // first tick completes immediately
    ticker.tick().await;

    loop {
        if remaining == 0 {
            if !fired.swap(true, Ordering::SeqCst) {
                expired.store(true, Ordering::SeqCst);
                log::info!("Session time expired");
                on_expire();
            }
            return;
        }

        ticker.tick().await;

        remaining = match &seed {
            TimerSeed::Remaining(_) => remaining.saturating_sub(1),
            window @ TimerSeed::Window { .. } => window.remaining_at(clock.now()),
        };
        remaining_tx.send_replace(remaining);
    }
}
