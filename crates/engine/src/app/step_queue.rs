use std::collections::VecDeque;

use thiserror::Error;
use tracing::warn;

use super::channel::InputConsumer;
use super::input::InputEvent;
use super::timeline::{FrameTimeline, Timestamp};

/// Smallest fraction a step may carry; a zero-length sub-step is meaningless.
pub const MIN_STEP_FRACTION: f64 = f32::MIN_POSITIVE as f64;

/// One sub-step of a physics step.
///
/// `fraction` is the share of the physics step's delta this sub-step covers.
/// A boundary step closes its physics step and carries no input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Step {
    pub input: Option<InputEvent>,
    pub fraction: f64,
    pub is_boundary: bool,
}

impl Step {
    /// What an exhausted queue hands out: a whole physics step, no input.
    pub const FULL_BOUNDARY: Step = Step {
        input: None,
        fraction: 1.0,
        is_boundary: true,
    };

    pub fn boundary(fraction: f64) -> Self {
        Self {
            input: None,
            fraction,
            is_boundary: true,
        }
    }

    pub fn with_input(input: InputEvent, fraction: f64) -> Self {
        Self {
            input: Some(input),
            fraction,
            is_boundary: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[error("step queue full ({capacity} steps); dropped {step:?}")]
pub struct StepQueueFull {
    pub step: Step,
    pub capacity: usize,
}

/// Bounded, ordered steps for one frame. Rebuilt every frame.
#[derive(Debug, Clone)]
pub struct StepQueue {
    steps: Vec<Step>,
    read_index: usize,
    capacity: usize,
}

impl StepQueue {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            steps: Vec::with_capacity(capacity),
            read_index: 0,
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Free slots for further pushes this frame.
    pub fn spare_capacity(&self) -> usize {
        self.capacity - self.steps.len()
    }

    pub fn push(&mut self, step: Step) -> Result<(), StepQueueFull> {
        if self.steps.len() >= self.capacity {
            return Err(StepQueueFull {
                step,
                capacity: self.capacity,
            });
        }
        self.steps.push(step);
        Ok(())
    }

    pub fn pop(&mut self) -> Option<Step> {
        let step = self.steps.get(self.read_index).copied()?;
        self.read_index += 1;
        Some(step)
    }

    pub fn peek(&self) -> Option<&Step> {
        self.steps.get(self.read_index)
    }

    pub fn is_empty(&self) -> bool {
        self.read_index >= self.steps.len()
    }

    /// Steps not yet popped.
    pub fn remaining(&self) -> &[Step] {
        &self.steps[self.read_index.min(self.steps.len())..]
    }

    pub fn clear(&mut self) {
        self.steps.clear();
        self.read_index = 0;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildStats {
    pub step_count: u32,
    pub input_steps: u32,
    pub dropped_steps: u32,
}

/// Turns buffered input into a [`StepQueue`] partitioned over physics steps.
///
/// Owns the working copy of drained input. Events that do not fit into the
/// current frame stay buffered for the next one.
#[derive(Debug, Default)]
pub struct StepQueueBuilder {
    pending: VecDeque<InputEvent>,
}

impl StepQueueBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> &VecDeque<InputEvent> {
        &self.pending
    }

    pub fn clear_pending(&mut self) {
        self.pending.clear();
    }

    pub fn push_pending(&mut self, event: InputEvent) {
        self.pending.push_back(event);
    }

    /// Moves events out of the channel. With a cutoff, events stamped after
    /// it are left in the channel, in order, for a later frame.
    pub fn drain_channel(
        &mut self,
        consumer: &mut InputConsumer,
        cutoff: Option<Timestamp>,
    ) -> usize {
        let before = self.pending.len();
        match cutoff {
            Some(cutoff) => {
                while let Some(event) = consumer.pop_if(|event| event.timestamp <= cutoff) {
                    self.pending.push_back(event);
                }
            }
            None => {
                while let Some(event) = consumer.pop() {
                    self.pending.push_back(event);
                }
            }
        }
        self.pending.len() - before
    }

    /// Rebuilds `queue` for a frame of `step_count` physics steps and
    /// advances the timeline.
    ///
    /// Each physics step gets its inputs as non-boundary steps in
    /// chronological order followed by exactly one boundary step. Input
    /// steps never take the slots the remaining boundaries need.
    pub fn build(
        &mut self,
        timeline: &mut FrameTimeline,
        step_count: u32,
        queue: &mut StepQueue,
    ) -> BuildStats {
        queue.clear();
        let step_count = step_count.max(1);
        let mut stats = BuildStats {
            step_count,
            ..BuildStats::default()
        };

        if self.pending.is_empty() {
            for _ in 0..step_count {
                push_boundary(queue, 1.0, &mut stats);
            }
            timeline.advance();
            return stats;
        }

        let origin = timeline.last_frame_start();
        // +1 keeps every in-frame timestamp strictly before its slice end.
        let slice = timeline.frame_delta() / i64::from(step_count) + 1;

        for index in 0..step_count {
            let step_end = slice * (i64::from(index) + 1);
            let boundaries_left = usize::try_from(step_count - index).unwrap_or(usize::MAX);
            let mut elapsed = 0.0;

            while let Some(event) = self.pending.front().copied() {
                let offset = event.timestamp.ticks_since(origin).max(0);
                if offset >= step_end {
                    break;
                }
                self.pending.pop_front();

                let position = (offset % slice) as f64 / slice as f64;
                let fraction = (position - elapsed).clamp(MIN_STEP_FRACTION, 1.0);
                if queue.spare_capacity() > boundaries_left
                    && queue.push(Step::with_input(event, fraction)).is_ok()
                {
                    stats.input_steps += 1;
                    elapsed = position;
                } else {
                    stats.dropped_steps += 1;
                    warn!(
                        timestamp = event.timestamp.0,
                        action = ?event.action,
                        physics_step = index,
                        capacity = queue.capacity(),
                        "step_queue_overflow"
                    );
                }
            }

            push_boundary(queue, (1.0 - elapsed).max(MIN_STEP_FRACTION), &mut stats);
        }

        timeline.advance();
        stats
    }
}

fn push_boundary(queue: &mut StepQueue, fraction: f64, stats: &mut BuildStats) {
    if let Err(error) = queue.push(Step::boundary(fraction)) {
        stats.dropped_steps += 1;
        warn!(capacity = error.capacity, fraction, "step_queue_overflow");
    }
}
