use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::channel::{input_channel, InputConsumer, InputProducer};
use super::config::{ConfigError, InputCutoffPolicy, SessionConfig, SessionOptions};
use super::estimator::StepCountEstimator;
use super::input::PlayerSlot;
use super::metrics::{MetricsAccumulator, MetricsHandle, StepCounters};
use super::results::ResultGate;
use super::step_queue::{BuildStats, StepQueue, StepQueueBuilder};
use super::substep::{FramePhase, SimulationHost, SubstepExecutor};
use super::timeline::{FrameTimeline, MonotonicClock};

const METRICS_INTERVAL: Duration = Duration::from_secs(1);

/// What a reset does with input that has not reached a queue yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputReset {
    /// Channel and working copy are emptied.
    Discard,
    /// Both survive into the next first frame.
    Keep,
}

/// Host state at the start of a rendered frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameGate {
    pub focused: bool,
    pub paused: bool,
    pub level_active: bool,
    pub level_ended: bool,
}

impl FrameGate {
    pub fn active() -> Self {
        Self {
            focused: true,
            paused: false,
            level_active: true,
            level_ended: false,
        }
    }

    pub fn suspends(&self) -> bool {
        !self.focused || self.paused || !self.level_active || self.level_ended
    }

    /// The host runs no physics at all this frame.
    pub fn halts(&self) -> bool {
        self.paused || !self.level_active
    }
}

impl Default for FrameGate {
    fn default() -> Self {
        Self::active()
    }
}

/// What the host knows about the frame it is about to simulate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameRequest {
    /// Delta the host would simulate (already scaled by its time warp).
    pub modified_delta: f64,
    /// Wall-clock delta of the last rendered frame.
    pub actual_delta: f64,
    pub time_scale: f64,
    pub in_level: bool,
    pub player_dead: bool,
    pub in_editor: bool,
}

impl Default for FrameRequest {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl FrameRequest {
    pub fn new(delta: f64) -> Self {
        Self {
            modified_delta: delta,
            actual_delta: delta,
            time_scale: 1.0,
            in_level: true,
            player_dead: false,
            in_editor: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FramePlan {
    /// Delta the frame simulates after substitution.
    pub delta: f64,
    pub step_count: u32,
    /// A step queue was built; entities may split this frame.
    pub built: bool,
    /// The host applies this frame's input itself. Never set together with
    /// `built`, and never for input the session keeps for a later queue.
    pub host_input_enabled: bool,
    pub stats: BuildStats,
}

impl FramePlan {
    pub fn step_delta(&self) -> f32 {
        (self.delta / f64::from(self.step_count.max(1))) as f32
    }
}

/// Everything one gameplay session needs between frames.
///
/// Runs entirely on the simulation thread; the only cross-thread piece is
/// the input channel whose producer lives with the capture side.
pub struct SessionContext {
    config: SessionConfig,
    options: SessionOptions,
    pending_options: Option<SessionOptions>,
    clock: Arc<dyn MonotonicClock>,
    consumer: InputConsumer,
    builder: StepQueueBuilder,
    timeline: FrameTimeline,
    estimator: StepCountEstimator,
    queue: StepQueue,
    executor: SubstepExecutor,
    passthrough: bool,
    host_input: bool,
    suspended: bool,
    frame_index: u64,
    built_frame: Option<u64>,
    last_step_count: u32,
    step_overflows: u64,
    substeps_reported: u64,
    metrics: MetricsHandle,
    accumulator: MetricsAccumulator,
}

/// Creates a session together with the producer for its input channel.
pub fn open_session(
    config: SessionConfig,
    clock: Arc<dyn MonotonicClock>,
) -> Result<(SessionContext, InputProducer), ConfigError> {
    config.validate()?;
    let (producer, consumer) = input_channel(config.input_channel_capacity);
    let session = SessionContext::new(config, consumer, clock)?;
    Ok((session, producer))
}

impl SessionContext {
    pub fn new(
        config: SessionConfig,
        consumer: InputConsumer,
        clock: Arc<dyn MonotonicClock>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let options = config.options;
        Ok(Self {
            config,
            options,
            pending_options: None,
            clock,
            consumer,
            builder: StepQueueBuilder::new(),
            timeline: FrameTimeline::new(),
            estimator: StepCountEstimator::new(
                options.simulation_mode,
                config.nominal_frame_interval(),
                config.max_steps_per_frame,
            ),
            queue: StepQueue::with_capacity(config.step_queue_capacity()),
            executor: SubstepExecutor::new(),
            passthrough: true,
            host_input: true,
            suspended: false,
            frame_index: 0,
            built_frame: None,
            last_step_count: 0,
            step_overflows: 0,
            substeps_reported: 0,
            metrics: MetricsHandle::default(),
            accumulator: MetricsAccumulator::new(METRICS_INTERVAL),
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn options(&self) -> SessionOptions {
        self.options
    }

    pub fn phase(&self) -> FramePhase {
        self.executor.phase()
    }

    pub fn queue(&self) -> &StepQueue {
        &self.queue
    }

    pub fn builder(&self) -> &StepQueueBuilder {
        &self.builder
    }

    pub fn timeline(&self) -> &FrameTimeline {
        &self.timeline
    }

    pub fn estimator(&self) -> &StepCountEstimator {
        &self.estimator
    }

    pub fn executor(&self) -> &SubstepExecutor {
        &self.executor
    }

    pub fn last_step_count(&self) -> u32 {
        self.last_step_count
    }

    pub fn step_overflows(&self) -> u64 {
        self.step_overflows
    }

    pub fn dropped_inputs(&self) -> u64 {
        self.consumer.dropped()
    }

    pub fn metrics(&self) -> MetricsHandle {
        self.metrics.clone()
    }

    pub fn result_gate(&self) -> ResultGate {
        ResultGate::new(self.options)
    }

    /// The host's own input path is live only while no queue drives the
    /// frame. Settled by [`SessionContext::plan_frame`].
    pub fn host_input_enabled(&self) -> bool {
        self.host_input
    }

    /// Options take effect at the next [`SessionContext::begin_frame`].
    pub fn apply_options(&mut self, options: SessionOptions) {
        self.pending_options = Some(options);
    }

    /// Level load: nothing from a previous session survives.
    pub fn start_session(&mut self) {
        self.reset_frame_state("session_start", InputReset::Discard);
        self.estimator.reset();
        self.last_step_count = 0;
        info!(
            mode = ?self.options.simulation_mode,
            cutoff = ?self.options.input_cutoff,
            enabled = self.options.enabled,
            "session_started"
        );
    }

    pub fn begin_frame(&mut self, gate: FrameGate) {
        self.frame_index += 1;

        if let Some(options) = self.pending_options.take() {
            if options != self.options {
                info!(
                    mode = ?options.simulation_mode,
                    cutoff = ?options.input_cutoff,
                    enabled = options.enabled,
                    "session_options_applied"
                );
            }
            self.options = options;
            self.estimator.set_mode(options.simulation_mode);
        }

        if self.options.input_cutoff == InputCutoffPolicy::Early {
            self.timeline.mark_frame_start(self.clock.now());
        }

        self.suspended = gate.suspends();
        if !self.options.enabled {
            self.reset_frame_state("soft_disabled", InputReset::Discard);
        } else if self.suspended {
            self.reset_frame_state("suspended", InputReset::Discard);
        }
    }

    pub fn plan_frame(&mut self, request: FrameRequest) -> FramePlan {
        let mode = self.options.simulation_mode;

        if !request.in_level {
            let step_count = self
                .estimator
                .estimate(request.modified_delta, request.time_scale, true);
            self.last_step_count = step_count;
            return self.settle_host_input(FramePlan {
                delta: request.modified_delta,
                step_count,
                ..FramePlan::default()
            });
        }

        let mut delta = request.modified_delta;
        if mode.is_enhanced() && (self.timeline.is_primed() || !self.options.enabled) {
            delta = request.actual_delta * request.time_scale;
        }

        let step_count = self.estimator.estimate(delta, request.time_scale, false);
        self.last_step_count = step_count;
        let mut plan = FramePlan {
            delta,
            step_count,
            ..FramePlan::default()
        };

        if self.suspended {
            self.executor.disarm();
        } else if request.player_dead {
            self.reset_frame_state("player_dead", InputReset::Keep);
        } else if request.in_editor {
            self.reset_frame_state("editor", InputReset::Keep);
        } else if !self.options.enabled {
            self.reset_frame_state("soft_disabled", InputReset::Discard);
        } else if delta > 0.0 {
            if let Some(stats) = self.build_queue(step_count) {
                plan.built = true;
                plan.stats = stats;
            }
        } else {
            self.executor.disarm();
        }

        self.settle_host_input(plan)
    }

    /// Decides who consumes this frame's input. A built queue owns it; in
    /// passthrough the host owns it and the session drops its own copy,
    /// unless late cutoff keeps it for the first queue after the reset.
    fn settle_host_input(&mut self, mut plan: FramePlan) -> FramePlan {
        let keeps_input = self.options.input_cutoff == InputCutoffPolicy::Late
            && self.options.enabled
            && !self.suspended;
        self.host_input = if plan.built || !self.passthrough || keeps_input {
            false
        } else {
            self.discard_host_delivered_input();
            true
        };
        plan.host_input_enabled = self.host_input;
        plan
    }

    fn discard_host_delivered_input(&mut self) {
        self.builder.clear_pending();
        let cutoff = match self.options.input_cutoff {
            InputCutoffPolicy::Early => self.timeline.current_frame_start(),
            InputCutoffPolicy::Late => self.clock.now(),
        };
        while self
            .consumer
            .pop_if(|event| event.timestamp <= cutoff)
            .is_some()
        {}
    }

    fn build_queue(&mut self, step_count: u32) -> Option<BuildStats> {
        self.executor.set_phase(FramePhase::Building);

        let drained = match self.options.input_cutoff {
            InputCutoffPolicy::Early => {
                let cutoff = self.timeline.current_frame_start();
                self.builder.drain_channel(&mut self.consumer, Some(cutoff))
            }
            InputCutoffPolicy::Late => {
                let drained = self.builder.drain_channel(&mut self.consumer, None);
                self.timeline.mark_frame_start(self.clock.now());
                drained
            }
        };

        if !self.timeline.is_primed() {
            self.timeline.prime();
            if self.options.input_cutoff == InputCutoffPolicy::Early {
                self.builder.clear_pending();
            }
            self.executor.disarm();
            debug!(drained, "first_frame_primed");
            return None;
        }

        let stats = self
            .builder
            .build(&mut self.timeline, step_count, &mut self.queue);
        self.step_overflows += u64::from(stats.dropped_steps);
        self.executor.arm();
        self.passthrough = false;
        self.built_frame = Some(self.frame_index);
        debug!(
            drained,
            step_count,
            input_steps = stats.input_steps,
            carried_over = self.builder.pending().len(),
            "step_queue_built"
        );
        Some(stats)
    }

    /// Start of a physics step, before any entity update.
    pub fn process_commands<H: SimulationHost + ?Sized>(&mut self, host: &mut H) {
        self.discard_stale_queue();
        if !self.options.dispatch_inputs_only_at_step_boundary {
            return;
        }
        if matches!(
            self.executor.phase(),
            FramePhase::Ready | FramePhase::Done { .. }
        ) {
            self.executor.dispatch_to_boundary(&mut self.queue, host);
        }
    }

    pub fn update_entity<H: SimulationHost + ?Sized>(
        &mut self,
        host: &mut H,
        player: PlayerSlot,
        step_delta: f32,
    ) {
        self.discard_stale_queue();
        self.executor.update_entity(
            &mut self.queue,
            host,
            player,
            step_delta,
            self.options.dispatch_inputs_only_at_step_boundary,
        );
    }

    pub fn rotation_delta(&self, player: PlayerSlot, requested: f32) -> f32 {
        self.executor.rotation_delta(player, requested)
    }

    pub fn finish_physics_step<H: SimulationHost + ?Sized>(&mut self, host: &mut H) {
        self.executor.finish_physics_step(host);
    }

    /// Folds the frame into the metrics and publishes a snapshot once per
    /// interval.
    pub fn end_frame(&mut self, frame_seconds: f64) {
        let substeps_total = self.executor.substeps_run();
        let substeps = substeps_total.saturating_sub(self.substeps_reported);
        self.substeps_reported = substeps_total;

        let frame_dt = if frame_seconds.is_finite() && frame_seconds > 0.0 {
            Duration::from_secs_f64(frame_seconds)
        } else {
            Duration::ZERO
        };
        self.accumulator
            .record_frame(frame_dt, self.last_step_count, substeps);

        if let Some(snapshot) = self.accumulator.maybe_snapshot(StepCounters {
            last_step_count: self.last_step_count,
            simulation_mode: self.options.simulation_mode,
            dropped_inputs: self.consumer.dropped(),
            step_overflows: self.step_overflows,
        }) {
            self.metrics.publish(snapshot);
        }
    }

    fn discard_stale_queue(&mut self) {
        if self.executor.phase() == FramePhase::Idle {
            return;
        }
        if self.built_frame != Some(self.frame_index) {
            warn!(
                built_frame = ?self.built_frame,
                frame = self.frame_index,
                "stale_step_queue"
            );
            self.reset_frame_state("stale_queue", InputReset::Discard);
        }
    }

    fn reset_frame_state(&mut self, reason: &'static str, inputs: InputReset) {
        if !self.passthrough || !self.builder.pending().is_empty() {
            info!(reason, ?inputs, "session_reset");
        }
        self.timeline.reset();
        self.executor.disarm();
        self.queue.clear();
        if inputs == InputReset::Discard {
            self.builder.clear_pending();
            self.consumer.clear();
        }
        self.passthrough = true;
        self.host_input = true;
        self.built_frame = None;
    }
}
