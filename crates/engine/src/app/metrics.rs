use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tracing::warn;

use super::config::SimulationMode;

static METRICS_LOCK_POISON_WARNED: AtomicBool = AtomicBool::new(false);

fn warn_metrics_lock_poison_once(operation: &'static str) {
    if METRICS_LOCK_POISON_WARNED
        .compare_exchange(false, true, Ordering::Relaxed, Ordering::Relaxed)
        .is_ok()
    {
        warn!(operation, "metrics lock poisoned; recovered inner value");
    }
}

/// What diagnostic overlays read to report the active stepping.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StepMetricsSnapshot {
    pub fps: f32,
    pub steps_per_second: f32,
    pub substeps_per_second: f32,
    pub frame_time_ms: f32,
    pub last_step_count: u32,
    pub simulation_mode: SimulationMode,
    pub dropped_inputs: u64,
    pub step_overflows: u64,
}

#[derive(Clone, Debug)]
pub struct MetricsHandle {
    snapshot: Arc<RwLock<StepMetricsSnapshot>>,
}

impl Default for MetricsHandle {
    fn default() -> Self {
        Self {
            snapshot: Arc::new(RwLock::new(StepMetricsSnapshot::default())),
        }
    }
}

impl MetricsHandle {
    pub fn snapshot(&self) -> StepMetricsSnapshot {
        match self.snapshot.read() {
            Ok(guard) => *guard,
            Err(poisoned) => {
                warn_metrics_lock_poison_once("read");
                *poisoned.into_inner()
            }
        }
    }

    pub(crate) fn publish(&self, snapshot: StepMetricsSnapshot) {
        match self.snapshot.write() {
            Ok(mut guard) => *guard = snapshot,
            Err(poisoned) => {
                warn_metrics_lock_poison_once("write");
                let mut guard = poisoned.into_inner();
                *guard = snapshot;
            }
        }
    }
}

/// Counters that are not rates; copied into each snapshot as-is.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct StepCounters {
    pub last_step_count: u32,
    pub simulation_mode: SimulationMode,
    pub dropped_inputs: u64,
    pub step_overflows: u64,
}

/// Accumulates per-frame totals and emits a snapshot once `interval` of
/// frame time has passed. Driven by frame deltas, so replays on a manual
/// clock produce the same snapshots.
#[derive(Debug)]
pub(crate) struct MetricsAccumulator {
    interval: Duration,
    elapsed: Duration,
    frames: u32,
    steps: u32,
    substeps: u64,
}

impl MetricsAccumulator {
    pub(crate) fn new(interval: Duration) -> Self {
        Self {
            interval,
            elapsed: Duration::ZERO,
            frames: 0,
            steps: 0,
            substeps: 0,
        }
    }

    pub(crate) fn record_frame(&mut self, frame_dt: Duration, steps: u32, substeps: u64) {
        self.frames = self.frames.saturating_add(1);
        self.steps = self.steps.saturating_add(steps);
        self.substeps = self.substeps.saturating_add(substeps);
        self.elapsed = self.elapsed.saturating_add(frame_dt);
    }

    pub(crate) fn maybe_snapshot(&mut self, counters: StepCounters) -> Option<StepMetricsSnapshot> {
        if self.elapsed < self.interval {
            return None;
        }

        let elapsed_seconds = self.elapsed.as_secs_f32().max(f32::EPSILON);
        let frame_time_ms = if self.frames == 0 {
            0.0
        } else {
            (elapsed_seconds / self.frames as f32) * 1000.0
        };

        let snapshot = StepMetricsSnapshot {
            fps: self.frames as f32 / elapsed_seconds,
            steps_per_second: self.steps as f32 / elapsed_seconds,
            substeps_per_second: self.substeps as f32 / elapsed_seconds,
            frame_time_ms,
            last_step_count: counters.last_step_count,
            simulation_mode: counters.simulation_mode,
            dropped_inputs: counters.dropped_inputs,
            step_overflows: counters.step_overflows,
        };

        self.elapsed = Duration::ZERO;
        self.frames = 0;
        self.steps = 0;
        self.substeps = 0;

        Some(snapshot)
    }
}
