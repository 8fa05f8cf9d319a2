use tracing::warn;

use super::config::SimulationMode;

const ENHANCED_STEP_RATE: f64 = 240.0;
const BASELINE_TICK_RATE: f64 = 60.0;
const BASELINE_STEPS_PER_TICK: f64 = 4.0;
const LEGACY_MIN_STEPS: f64 = 4.0;

const EMA_ALPHA: f64 = 0.05;
const EMA_MAX_RATIO: f64 = 10.0;
const SUSTAINED_LAG_THRESHOLD: f64 = 0.0005;
const STEP_EPSILON: f64 = 0.0001;

/// How the adaptive estimator read the latest frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LagClass {
    Smooth,
    SustainedLag,
    Spike,
}

/// Chooses the number of physics steps per rendered frame.
///
/// The only numeric state is the moving average of frame deltas used by
/// [`SimulationMode::Adaptive`]; call [`StepCountEstimator::reset`] whenever
/// a new session starts so stale history cannot bias its first frames.
#[derive(Debug, Clone)]
pub struct StepCountEstimator {
    mode: SimulationMode,
    nominal_interval: f64,
    max_steps: u32,
    average_delta: f64,
    last_lag_class: Option<LagClass>,
}

impl StepCountEstimator {
    pub fn new(mode: SimulationMode, nominal_interval: f64, max_steps: u32) -> Self {
        Self {
            mode,
            nominal_interval,
            max_steps: max_steps.max(1),
            average_delta: 0.0,
            last_lag_class: None,
        }
    }

    pub fn mode(&self) -> SimulationMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: SimulationMode) {
        self.mode = mode;
    }

    pub fn average_delta(&self) -> f64 {
        self.average_delta
    }

    pub fn last_lag_class(&self) -> Option<LagClass> {
        self.last_lag_class
    }

    pub fn reset(&mut self) {
        self.average_delta = 0.0;
        self.last_lag_class = None;
    }

    /// Step count for a frame of `frame_delta` seconds. Always at least 1.
    pub fn estimate(&mut self, frame_delta: f64, time_scale: f64, force_baseline: bool) -> u32 {
        let delta = sanitize_delta(frame_delta);
        let scale = effective_time_scale(time_scale);

        let raw = if force_baseline || self.mode == SimulationMode::Baseline {
            baseline_steps(delta, scale)
        } else if self.mode == SimulationMode::Legacy {
            legacy_steps(delta, scale)
        } else {
            self.adaptive_steps(delta, scale)
        };

        self.clamp_steps(raw, delta)
    }

    fn adaptive_steps(&mut self, delta: f64, scale: f64) -> f64 {
        let nominal = self.nominal_interval;
        self.average_delta = EMA_ALPHA * delta + (1.0 - EMA_ALPHA) * self.average_delta;
        self.average_delta = self.average_delta.min(nominal * EMA_MAX_RATIO);

        let lagging_one_frame = nominal < delta - (1.0 / ENHANCED_STEP_RATE);
        let lagging_sustained = self.average_delta - nominal > SUSTAINED_LAG_THRESHOLD;

        let (class, steps) = if !lagging_one_frame && !lagging_sustained {
            (
                LagClass::Smooth,
                (nominal * ENHANCED_STEP_RATE - STEP_EPSILON).ceil(),
            )
        } else if !lagging_one_frame {
            (
                LagClass::SustainedLag,
                (self.average_delta * ENHANCED_STEP_RATE).ceil(),
            )
        } else {
            (LagClass::Spike, (delta * ENHANCED_STEP_RATE).ceil())
        };
        self.last_lag_class = Some(class);
        (steps / scale).round()
    }

    fn clamp_steps(&self, raw: f64, delta: f64) -> u32 {
        if !raw.is_finite() || raw < 1.0 {
            return 1;
        }
        if raw > f64::from(self.max_steps) {
            warn!(
                requested = raw,
                max_steps_per_frame = self.max_steps,
                frame_delta_ms = delta * 1000.0,
                mode = ?self.mode,
                "step_count_clamped"
            );
            return self.max_steps;
        }
        raw as u32
    }
}

fn baseline_steps(delta: f64, scale: f64) -> f64 {
    ((delta * BASELINE_TICK_RATE / scale) * BASELINE_STEPS_PER_TICK)
        .max(1.0)
        .round()
}

fn legacy_steps(delta: f64, scale: f64) -> f64 {
    ((delta * ENHANCED_STEP_RATE).max(LEGACY_MIN_STEPS) / scale).round()
}

fn sanitize_delta(frame_delta: f64) -> f64 {
    if frame_delta.is_finite() {
        frame_delta.max(0.0)
    } else {
        0.0
    }
}

/// `min(1, time_scale)`, with unusable scales read as 1.
fn effective_time_scale(time_scale: f64) -> f64 {
    if time_scale.is_finite() && time_scale > 0.0 {
        time_scale.min(1.0)
    } else {
        1.0
    }
}
