use tracing::debug;

use super::input::{Button, InputEvent, PlayerSlot};
use super::step_queue::{Step, StepQueue};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum MovementMode {
    /// Jump-buffering modes; trajectory fixed once airborne.
    #[default]
    Standard,
    Ship,
    Bird,
    Dart,
    Swing,
}

impl MovementMode {
    pub fn steers_mid_air(self) -> bool {
        !matches!(self, MovementMode::Standard)
    }
}

/// What the executor needs to know about an entity at a step boundary.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EntitySnapshot {
    pub position: Vec2,
    pub y_velocity: f64,
    pub on_ground: bool,
    pub upside_down: bool,
    pub touching_zone: bool,
    pub dashing: bool,
    pub movement: MovementMode,
}

impl EntitySnapshot {
    /// Airborne entities in a buffering mode are never split so their
    /// trajectory matches an unsplit step.
    pub fn splits_substeps(&self) -> bool {
        self.on_ground || self.touching_zone || self.dashing || self.movement.steers_mid_air()
    }

    /// Vertical velocity points away from the entity's floor.
    fn falls_against_orientation(&self) -> bool {
        (self.y_velocity < 0.0) ^ self.upside_down
    }
}

/// Callbacks into the host simulation. The core never simulates physics.
///
/// `advance` is the host's regular per-entity update (position, velocity,
/// in-update effects). During a split it receives the sub-step delta; the
/// host's own collision and rotation pass afterwards still runs once per
/// physics step with the full delta, see [`SubstepExecutor::rotation_delta`].
pub trait SimulationHost {
    fn apply_input(&mut self, pressed: bool, button: Button, player: PlayerSlot);
    fn advance(&mut self, player: PlayerSlot, delta: f32);
    /// `substep` is true when called from inside a split physics step.
    fn check_collisions(&mut self, player: PlayerSlot, delta: f32, substep: bool);
    fn update_rotation(&mut self, player: PlayerSlot, delta: f32);
    /// Forget collisions recorded by a mid-step collision check.
    fn reset_collision_log(&mut self, _player: PlayerSlot) {}
    fn entity(&self, player: PlayerSlot) -> EntitySnapshot;
    fn set_on_ground(&mut self, player: PlayerSlot, on_ground: bool);
    fn set_last_position(&mut self, player: PlayerSlot, position: Vec2);
    fn is_dual(&self) -> bool;
}

/// Per-frame state of the step-queue consumer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FramePhase {
    /// No queue this frame; entities run unsplit and the host reads input itself.
    #[default]
    Idle,
    Building,
    /// A queue is built and waiting for the next physics step.
    Ready,
    /// Inside the sub-step loop of one physics step.
    Splitting { p1: bool, p2: bool },
    /// The loop finished; the host's rotation pass for split entities is pending.
    Done { p1: bool, p2: bool },
}

impl FramePhase {
    pub fn is_split(self, player: PlayerSlot) -> bool {
        match (self, player) {
            (FramePhase::Splitting { p1, .. } | FramePhase::Done { p1, .. }, PlayerSlot::One) => p1,
            (FramePhase::Splitting { p2, .. } | FramePhase::Done { p2, .. }, PlayerSlot::Two) => p2,
            _ => false,
        }
    }
}

/// Consumes a frame's [`StepQueue`] and drives the host through sub-steps.
///
/// Inputs are dispatched one pop late: popping a step first applies the
/// input read by the previous pop, so every input takes effect at the start
/// of the sub-step interval that follows it.
#[derive(Debug, Default)]
pub struct SubstepExecutor {
    pending_input: Option<InputEvent>,
    phase: FramePhase,
    input_this_step: bool,
    rotation_delta: f32,
    start_positions: [Vec2; 2],
    substeps_run: u64,
    inputs_dispatched: u64,
}

impl SubstepExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> FramePhase {
        self.phase
    }

    pub(crate) fn set_phase(&mut self, phase: FramePhase) {
        self.phase = phase;
    }

    pub fn pending_input(&self) -> Option<InputEvent> {
        self.pending_input
    }

    pub fn substeps_run(&self) -> u64 {
        self.substeps_run
    }

    pub fn inputs_dispatched(&self) -> u64 {
        self.inputs_dispatched
    }

    /// A fresh queue was built for this frame.
    pub fn arm(&mut self) {
        self.pending_input = None;
        self.input_this_step = false;
        self.phase = FramePhase::Ready;
    }

    /// Back to passthrough; nothing pending survives.
    pub fn disarm(&mut self) {
        self.pending_input = None;
        self.input_this_step = false;
        self.phase = FramePhase::Idle;
    }

    /// Pops the next step, dispatching the previously popped input first.
    /// An exhausted queue yields [`Step::FULL_BOUNDARY`].
    pub fn pop_step<H: SimulationHost + ?Sized>(
        &mut self,
        queue: &mut StepQueue,
        host: &mut H,
    ) -> Step {
        let Some(step) = queue.pop() else {
            return Step::FULL_BOUNDARY;
        };
        if let Some(previous) = self.pending_input.take() {
            self.dispatch(host, previous);
        }
        self.pending_input = step.input;
        step
    }

    /// Boundary-only dispatch: consume this physics step's steps up front so
    /// its inputs are applied before the entities move.
    pub fn dispatch_to_boundary<H: SimulationHost + ?Sized>(
        &mut self,
        queue: &mut StepQueue,
        host: &mut H,
    ) {
        while !queue.is_empty() {
            if self.pop_step(queue, host).is_boundary {
                break;
            }
        }
    }

    /// One entity's update for one physics step.
    ///
    /// Player one drives the sub-step loop for both players; player two's
    /// own call is a no-op when the loop already advanced it.
    pub fn update_entity<H: SimulationHost + ?Sized>(
        &mut self,
        queue: &mut StepQueue,
        host: &mut H,
        player: PlayerSlot,
        step_delta: f32,
        boundary_dispatch: bool,
    ) {
        match self.phase {
            FramePhase::Idle | FramePhase::Building => {
                host.advance(player, step_delta);
                return;
            }
            FramePhase::Splitting { .. } => {
                debug!(?player, "nested_entity_update");
                host.advance(player, step_delta);
                return;
            }
            FramePhase::Ready | FramePhase::Done { .. } => {}
        }

        if player == PlayerSlot::Two {
            if !self.input_this_step {
                host.advance(player, step_delta);
            }
            return;
        }

        self.input_this_step = queue.peek().is_some_and(|step| !step.is_boundary);
        if !self.input_this_step && !boundary_dispatch {
            // Input-free physics step: drop its boundary without dispatching.
            queue.pop();
        }

        if !self.input_this_step || boundary_dispatch {
            self.input_this_step = false;
            self.phase = FramePhase::Ready;
            host.advance(PlayerSlot::One, step_delta);
            return;
        }

        self.run_split(queue, host, step_delta);
    }

    fn run_split<H: SimulationHost + ?Sized>(
        &mut self,
        queue: &mut StepQueue,
        host: &mut H,
        step_delta: f32,
    ) {
        let p1 = host.entity(PlayerSlot::One);
        let p2 = host.entity(PlayerSlot::Two);
        let split_p1 = p1.splits_substeps();
        let split_p2 = p2.splits_substeps() && host.is_dual();
        self.start_positions = [p1.position, p2.position];
        self.phase = FramePhase::Splitting {
            p1: split_p1,
            p2: split_p2,
        };

        let mut first = true;
        loop {
            let step = self.pop_step(queue, host);
            let substep_delta = step_delta * step.fraction as f32;
            self.rotation_delta = substep_delta;

            let p1_substep = Substep {
                player: PlayerSlot::One,
                split: split_p1,
                started_on_ground: p1.on_ground,
            };
            let p2_substep = Substep {
                player: PlayerSlot::Two,
                split: split_p2,
                started_on_ground: p2.on_ground,
            };
            for substep in [p1_substep, p2_substep] {
                substep.run(host, &step, substep_delta, step_delta, first);
            }

            self.substeps_run += 1;
            first = false;
            if step.is_boundary {
                break;
            }
        }

        self.phase = FramePhase::Done {
            p1: split_p1,
            p2: split_p2,
        };
    }

    /// Delta the host's rotation pass should use for `player` this step.
    pub fn rotation_delta(&self, player: PlayerSlot, requested: f32) -> f32 {
        if self.phase.is_split(player) && matches!(self.phase, FramePhase::Done { .. }) {
            self.rotation_delta
        } else {
            requested
        }
    }

    /// Closes a physics step: split entities get their start-of-step
    /// position back as last position.
    pub fn finish_physics_step<H: SimulationHost + ?Sized>(&mut self, host: &mut H) {
        if let FramePhase::Done { p1, p2 } = self.phase {
            if p1 {
                host.set_last_position(PlayerSlot::One, self.start_positions[0]);
            }
            if p2 {
                host.set_last_position(PlayerSlot::Two, self.start_positions[1]);
            }
            self.phase = FramePhase::Ready;
        }
        self.input_this_step = false;
    }

    fn dispatch<H: SimulationHost + ?Sized>(&mut self, host: &mut H, input: InputEvent) {
        self.inputs_dispatched += 1;
        host.apply_input(
            input.state.is_pressed(),
            input.action.button(),
            input.action.player(),
        );
    }
}

#[derive(Debug, Clone, Copy)]
struct Substep {
    player: PlayerSlot,
    split: bool,
    started_on_ground: bool,
}

impl Substep {
    fn run<H: SimulationHost + ?Sized>(
        &self,
        host: &mut H,
        step: &Step,
        substep_delta: f32,
        step_delta: f32,
        first: bool,
    ) {
        if !self.split {
            if step.is_boundary {
                host.advance(self.player, step_delta);
            }
            return;
        }

        host.advance(self.player, substep_delta);
        if step.is_boundary {
            return;
        }
        // A mid-step sign flip would normally only follow a completed
        // step; keep the ground state the step started with.
        if first && host.entity(self.player).falls_against_orientation() {
            host.set_on_ground(self.player, self.started_on_ground);
        }
        // Collisions always see the full step so outcomes match unsplit steps.
        host.check_collisions(self.player, step_delta, true);
        host.update_rotation(self.player, substep_delta);
        host.reset_collision_log(self.player);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::input::{GameAction, InputEvent};
    use crate::app::test_host::{approx, HostCall, RecordingHost};
    use crate::app::timeline::Timestamp;

    const STEP: f32 = 1.0 / 240.0;

    fn jump(ticks: i64) -> InputEvent {
        InputEvent::pressed(Timestamp(ticks), GameAction::P1Jump)
    }

    fn queue_of(steps: &[Step]) -> StepQueue {
        let mut queue = StepQueue::with_capacity(32);
        for step in steps {
            queue.push(*step).expect("push");
        }
        queue
    }

    fn armed() -> SubstepExecutor {
        let mut executor = SubstepExecutor::new();
        executor.arm();
        executor
    }

    #[test]
    fn pop_dispatches_previous_input_one_pop_late() {
        let mut host = RecordingHost::grounded();
        let mut executor = armed();
        let second = InputEvent::released(Timestamp(2), GameAction::P2Left);
        let mut queue = queue_of(&[
            Step::with_input(jump(1), 0.2),
            Step::with_input(second, 0.3),
            Step::boundary(0.5),
        ]);

        executor.pop_step(&mut queue, &mut host);
        assert!(host.inputs().is_empty());
        assert_eq!(executor.pending_input(), Some(jump(1)));

        executor.pop_step(&mut queue, &mut host);
        assert_eq!(host.inputs(), vec![(true, Button::Jump, PlayerSlot::One)]);

        let last = executor.pop_step(&mut queue, &mut host);
        assert!(last.is_boundary);
        assert_eq!(host.inputs().len(), 2);
        assert_eq!(host.inputs()[1], (false, Button::Left, PlayerSlot::Two));
        assert_eq!(executor.pending_input(), None);
        assert_eq!(executor.inputs_dispatched(), 2);
    }

    #[test]
    fn exhausted_queue_yields_full_boundary_without_dispatch() {
        let mut host = RecordingHost::grounded();
        let mut executor = armed();
        let mut queue = queue_of(&[Step::with_input(jump(1), 0.5)]);

        executor.pop_step(&mut queue, &mut host);
        let synthetic = executor.pop_step(&mut queue, &mut host);
        assert_eq!(synthetic, Step::FULL_BOUNDARY);
        assert!(host.inputs().is_empty());
        assert_eq!(executor.pending_input(), Some(jump(1)));
    }

    #[test]
    fn input_free_step_runs_unsplit() {
        let mut host = RecordingHost::grounded();
        let mut executor = armed();
        let mut queue = queue_of(&[Step::boundary(1.0), Step::boundary(1.0)]);

        executor.update_entity(&mut queue, &mut host, PlayerSlot::One, STEP, false);
        executor.update_entity(&mut queue, &mut host, PlayerSlot::Two, STEP, false);

        assert_eq!(
            host.calls,
            vec![
                HostCall::Advance(PlayerSlot::One, STEP),
                HostCall::Advance(PlayerSlot::Two, STEP),
            ]
        );
        assert_eq!(queue.remaining().len(), 1);
        assert_eq!(executor.rotation_delta(PlayerSlot::One, STEP), STEP);
    }

    #[test]
    fn grounded_entity_splits_around_input() {
        let mut host = RecordingHost::grounded();
        let mut executor = armed();
        let mut queue = queue_of(&[Step::with_input(jump(1), 0.25), Step::boundary(0.75)]);

        executor.update_entity(&mut queue, &mut host, PlayerSlot::One, STEP, false);
        executor.update_entity(&mut queue, &mut host, PlayerSlot::Two, STEP, false);

        let calls = &host.calls;
        assert!(matches!(calls[0], HostCall::Advance(PlayerSlot::One, d) if approx(d, STEP * 0.25)));
        assert_eq!(calls[1], HostCall::Collide(PlayerSlot::One, STEP, true));
        assert!(matches!(calls[2], HostCall::Rotate(PlayerSlot::One, d) if approx(d, STEP * 0.25)));
        assert_eq!(calls[3], HostCall::ResetLog(PlayerSlot::One));
        // The jump lands when the boundary is popped, before the remainder runs.
        assert_eq!(
            calls[4],
            HostCall::Input {
                pressed: true,
                button: Button::Jump,
                player: PlayerSlot::One
            }
        );
        assert!(matches!(calls[5], HostCall::Advance(PlayerSlot::One, d) if approx(d, STEP * 0.75)));
        // Player two is not in dual mode: unsplit, advanced once by the loop.
        assert_eq!(calls[6], HostCall::Advance(PlayerSlot::Two, STEP));
        assert_eq!(calls.len(), 7);

        assert_eq!(executor.phase(), FramePhase::Done { p1: true, p2: false });
        assert!(approx(executor.rotation_delta(PlayerSlot::One, STEP), STEP * 0.75));
        assert_eq!(executor.rotation_delta(PlayerSlot::Two, STEP), STEP);
        assert_eq!(executor.substeps_run(), 2);
    }

    #[test]
    fn finish_restores_start_position_for_split_entities() {
        let mut host = RecordingHost::grounded();
        host.entities[0].position = Vec2 { x: 3.0, y: 1.0 };
        let mut executor = armed();
        let mut queue = queue_of(&[Step::with_input(jump(1), 0.5), Step::boundary(0.5)]);

        executor.update_entity(&mut queue, &mut host, PlayerSlot::One, STEP, false);
        executor.finish_physics_step(&mut host);

        assert_eq!(
            host.calls.last(),
            Some(&HostCall::SetLastPosition(PlayerSlot::One, Vec2 { x: 3.0, y: 1.0 }))
        );
        assert_eq!(executor.phase(), FramePhase::Ready);
        assert_eq!(executor.rotation_delta(PlayerSlot::One, STEP), STEP);
    }

    #[test]
    fn airborne_buffering_entity_is_not_split() {
        let mut host = RecordingHost::grounded();
        host.entities[0].on_ground = false;
        let mut executor = armed();
        let mut queue = queue_of(&[Step::with_input(jump(1), 0.4), Step::boundary(0.6)]);

        executor.update_entity(&mut queue, &mut host, PlayerSlot::One, STEP, false);

        assert_eq!(
            host.calls,
            vec![
                HostCall::Input {
                    pressed: true,
                    button: Button::Jump,
                    player: PlayerSlot::One
                },
                HostCall::Advance(PlayerSlot::One, STEP),
                HostCall::Advance(PlayerSlot::Two, STEP),
            ]
        );
        assert_eq!(executor.phase(), FramePhase::Done { p1: false, p2: false });
    }

    #[test]
    fn flying_mode_splits_while_airborne() {
        let mut host = RecordingHost::grounded();
        host.entities[0].on_ground = false;
        host.entities[0].movement = MovementMode::Ship;
        let mut executor = armed();
        let mut queue = queue_of(&[Step::with_input(jump(1), 0.4), Step::boundary(0.6)]);

        executor.update_entity(&mut queue, &mut host, PlayerSlot::One, STEP, false);
        assert_eq!(executor.phase(), FramePhase::Done { p1: true, p2: false });
    }

    #[test]
    fn dual_mode_splits_second_player_too() {
        let mut host = RecordingHost::grounded();
        host.dual = true;
        let mut executor = armed();
        let mut queue = queue_of(&[Step::with_input(jump(1), 0.5), Step::boundary(0.5)]);

        executor.update_entity(&mut queue, &mut host, PlayerSlot::One, STEP, false);
        executor.update_entity(&mut queue, &mut host, PlayerSlot::Two, STEP, false);

        assert!(host
            .calls
            .contains(&HostCall::Collide(PlayerSlot::Two, STEP, true)));
        let p2_advances = host
            .calls
            .iter()
            .filter(|call| matches!(call, HostCall::Advance(PlayerSlot::Two, _)))
            .count();
        assert_eq!(p2_advances, 2);
    }

    #[test]
    fn ground_flag_restored_after_first_substep_flicker() {
        let mut host = RecordingHost::grounded();
        host.entities[0].y_velocity = -1.0;
        host.lose_ground_on_advance = true;
        let mut executor = armed();
        let mut queue = queue_of(&[Step::with_input(jump(1), 0.5), Step::boundary(0.5)]);

        executor.update_entity(&mut queue, &mut host, PlayerSlot::One, STEP, false);

        assert_eq!(host.calls[1], HostCall::SetGround(PlayerSlot::One, true));
        let restores = host
            .calls
            .iter()
            .filter(|call| matches!(call, HostCall::SetGround(..)))
            .count();
        assert_eq!(restores, 1);
    }

    #[test]
    fn ground_flag_untouched_when_velocity_matches_orientation() {
        let mut host = RecordingHost::grounded();
        host.entities[0].y_velocity = 1.0;
        host.lose_ground_on_advance = true;
        let mut executor = armed();
        let mut queue = queue_of(&[Step::with_input(jump(1), 0.5), Step::boundary(0.5)]);

        executor.update_entity(&mut queue, &mut host, PlayerSlot::One, STEP, false);
        assert!(!host
            .calls
            .iter()
            .any(|call| matches!(call, HostCall::SetGround(..))));
    }

    #[test]
    fn boundary_dispatch_applies_inputs_then_runs_unsplit() {
        let mut host = RecordingHost::grounded();
        let mut executor = armed();
        let mut queue = queue_of(&[
            Step::with_input(jump(1), 0.5),
            Step::boundary(0.5),
            Step::boundary(1.0),
        ]);

        executor.dispatch_to_boundary(&mut queue, &mut host);
        executor.update_entity(&mut queue, &mut host, PlayerSlot::One, STEP, true);

        assert_eq!(
            host.calls,
            vec![
                HostCall::Input {
                    pressed: true,
                    button: Button::Jump,
                    player: PlayerSlot::One
                },
                HostCall::Advance(PlayerSlot::One, STEP),
            ]
        );
        assert_eq!(queue.remaining().len(), 1);
    }

    #[test]
    fn idle_phase_passes_straight_through() {
        let mut host = RecordingHost::grounded();
        let mut executor = SubstepExecutor::new();
        let mut queue = queue_of(&[Step::with_input(jump(1), 0.5), Step::boundary(0.5)]);

        executor.update_entity(&mut queue, &mut host, PlayerSlot::One, STEP, false);
        assert_eq!(host.calls, vec![HostCall::Advance(PlayerSlot::One, STEP)]);
        assert_eq!(queue.remaining().len(), 2);
    }

    #[test]
    fn nested_update_while_splitting_runs_unsplit() {
        let mut host = RecordingHost::grounded();
        let mut executor = armed();
        executor.set_phase(FramePhase::Splitting { p1: true, p2: false });
        let mut queue = queue_of(&[Step::with_input(jump(1), 0.5), Step::boundary(0.5)]);

        executor.update_entity(&mut queue, &mut host, PlayerSlot::One, STEP, false);
        assert_eq!(host.calls, vec![HostCall::Advance(PlayerSlot::One, STEP)]);
        assert_eq!(queue.remaining().len(), 2);
    }
}
