//! Recoil event pipeline.
//!
//! A background worker per light gun polls guest memory against a per-title
//! rule table, turns ammo counter edges into shot events and forwards them to
//! an external recoil device over a [`crate::signal::SignalChannel`].

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering, fence};
use std::time::{Duration, Instant};

pub mod rules;
pub mod tracker;
pub mod worker;

pub use rules::{RuleTable, TitleProbeRule};
pub use tracker::{PollInput, RecoilTracker};
pub use worker::{RecoilWorker, WorkerConfig};

/// Polling period of the recoil worker.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(5);
/// Time after a trigger edge within which an ammo drop counts as that shot.
pub const DEFAULT_WINDOW: Duration = Duration::from_millis(100);

/// Timestamp of a trigger edge that never happened.
pub const NEVER: i64 = i64::MIN;

/// Normalized signal understood by recoil drivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoilEvent {
    Gunshot,
    AutoOn,
    AutoOff,
    TripleShot,
    MachineGunOn,
    MachineGunOff,
}

impl RecoilEvent {
    pub const ALL: [RecoilEvent; 6] = [
        Self::Gunshot,
        Self::AutoOn,
        Self::AutoOff,
        Self::TripleShot,
        Self::MachineGunOn,
        Self::MachineGunOff,
    ];

    pub fn token(self) -> &'static str {
        match self {
            Self::Gunshot => "gunshot",
            Self::AutoOn => "auto_on",
            Self::AutoOff => "auto_off",
            Self::TripleShot => "tripleshot",
            Self::MachineGunOn => "machinegun_on",
            Self::MachineGunOff => "machinegun_off",
        }
    }
}

impl fmt::Display for RecoilEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl std::str::FromStr for RecoilEvent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|event| event.token() == s.trim())
            .ok_or_else(|| format!("unknown recoil token '{s}'"))
    }
}

/// Monotonic microsecond clock shared by the input path and the worker.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    epoch: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }

    pub fn now_us(&self) -> i64 {
        i64::try_from(self.epoch.elapsed().as_micros()).unwrap_or(i64::MAX)
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Consistent view of the trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerSnapshot {
    pub down: bool,
    pub last_press_us: i64,
    pub last_release_us: i64,
}

impl Default for TriggerSnapshot {
    fn default() -> Self {
        Self {
            down: false,
            last_press_us: NEVER,
            last_release_us: NEVER,
        }
    }
}

/// Single-writer sequence latch for the trigger state.
///
/// The input thread is the only writer. Readers retry until they observe an
/// even, unchanged sequence number, so a snapshot never mixes two updates.
pub struct TriggerLatch {
    seq: AtomicU64,
    down: AtomicBool,
    last_press_us: AtomicI64,
    last_release_us: AtomicI64,
}

impl Default for TriggerLatch {
    fn default() -> Self {
        Self {
            seq: AtomicU64::new(0),
            down: AtomicBool::new(false),
            last_press_us: AtomicI64::new(NEVER),
            last_release_us: AtomicI64::new(NEVER),
        }
    }
}

impl TriggerLatch {
    /// Record a trigger edge. Must only be called from one thread.
    pub fn record(&self, down: bool, now_us: i64) {
        let seq = self.seq.load(Ordering::Relaxed);
        self.seq.store(seq.wrapping_add(1), Ordering::Relaxed);
        fence(Ordering::Release);

        self.down.store(down, Ordering::Relaxed);
        if down {
            self.last_press_us.store(now_us, Ordering::Relaxed);
        } else {
            self.last_release_us.store(now_us, Ordering::Relaxed);
        }

        self.seq.store(seq.wrapping_add(2), Ordering::Release);
    }

    pub fn snapshot(&self) -> TriggerSnapshot {
        loop {
            let before = self.seq.load(Ordering::Acquire);
            if before & 1 != 0 {
                std::hint::spin_loop();
                continue;
            }

            let snapshot = TriggerSnapshot {
                down: self.down.load(Ordering::Relaxed),
                last_press_us: self.last_press_us.load(Ordering::Relaxed),
                last_release_us: self.last_release_us.load(Ordering::Relaxed),
            };

            fence(Ordering::Acquire);
            if self.seq.load(Ordering::Relaxed) == before {
                return snapshot;
            }
        }
    }
}

/// State the input thread publishes to the recoil worker.
#[derive(Default)]
pub struct RecoilShared {
    pub trigger: TriggerLatch,
    offscreen: AtomicBool,
}

impl RecoilShared {
    pub fn set_offscreen(&self, offscreen: bool) {
        self.offscreen.store(offscreen, Ordering::Release);
    }

    pub fn offscreen(&self) -> bool {
        self.offscreen.load(Ordering::Acquire)
    }
}
