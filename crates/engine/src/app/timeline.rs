use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Monotonic clock reading. `SystemClock` counts nanoseconds.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp(0);

    pub fn ticks_since(self, earlier: Timestamp) -> i64 {
        self.0.saturating_sub(earlier.0)
    }

    pub fn offset(self, ticks: i64) -> Timestamp {
        Timestamp(self.0.saturating_add(ticks))
    }
}

pub trait MonotonicClock: Send + Sync {
    fn now(&self) -> Timestamp;
}

#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock for SystemClock {
    fn now(&self) -> Timestamp {
        let nanos = Instant::now()
            .saturating_duration_since(self.origin)
            .as_nanos();
        Timestamp(i64::try_from(nanos).unwrap_or(i64::MAX))
    }
}

/// Clock that only moves when told to. Shared between a scripted producer
/// and the frame loop in replays.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: AtomicI64::new(start.0),
        }
    }

    pub fn set(&self, timestamp: Timestamp) {
        self.now.store(timestamp.0, Ordering::Release);
    }

    pub fn advance(&self, ticks: i64) -> Timestamp {
        Timestamp(self.now.fetch_add(ticks, Ordering::AcqRel).saturating_add(ticks))
    }
}

impl MonotonicClock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp(self.now.load(Ordering::Acquire))
    }
}

/// Start times of the previous and current rendered frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameTimeline {
    last_frame_start: Timestamp,
    current_frame_start: Timestamp,
    primed: bool,
}

impl FrameTimeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_frame_start(&self) -> Timestamp {
        self.last_frame_start
    }

    pub fn current_frame_start(&self) -> Timestamp {
        self.current_frame_start
    }

    /// False until the first frame of a session has been observed.
    pub fn is_primed(&self) -> bool {
        self.primed
    }

    pub fn mark_frame_start(&mut self, now: Timestamp) {
        self.current_frame_start = now;
    }

    /// First frame of a session: there is no prior frame to measure from.
    pub fn prime(&mut self) {
        self.last_frame_start = self.current_frame_start;
        self.primed = true;
    }

    /// Ticks between the two frame starts, never negative.
    pub fn frame_delta(&self) -> i64 {
        self.current_frame_start
            .ticks_since(self.last_frame_start)
            .max(0)
    }

    pub fn advance(&mut self) {
        self.last_frame_start = self.current_frame_start;
    }

    /// Forget the prior frame; the next frame is treated as a first frame.
    pub fn reset(&mut self) {
        self.primed = false;
    }
}
