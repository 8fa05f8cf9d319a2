use tracing::debug;

use super::input::PlayerSlot;
use super::session::{FrameGate, FramePlan, FrameRequest, SessionContext};
use super::substep::SimulationHost;

const PLAYERS: [PlayerSlot; 2] = [PlayerSlot::One, PlayerSlot::Two];

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameInput {
    pub gate: FrameGate,
    pub request: FrameRequest,
}

impl FrameInput {
    pub fn new(delta: f64) -> Self {
        Self {
            gate: FrameGate::active(),
            request: FrameRequest::new(delta),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameReport {
    pub plan: FramePlan,
    /// Physics steps actually run; zero outside a level or while the host
    /// halts. A suspended frame still runs its steps unsplit.
    pub physics_steps: u32,
    pub substeps: u64,
    pub inputs_dispatched: u64,
    pub host_input_enabled: bool,
}

/// Runs one rendered frame against `host`.
///
/// Per physics step: commands, both entity updates, the host's collision
/// and rotation pass with the executor's rotation override, then the
/// step's close.
pub fn run_frame<H: SimulationHost + ?Sized>(
    session: &mut SessionContext,
    host: &mut H,
    input: FrameInput,
) -> FrameReport {
    session.begin_frame(input.gate);
    let plan = session.plan_frame(input.request);

    let substeps_before = session.executor().substeps_run();
    let inputs_before = session.executor().inputs_dispatched();
    let physics_steps = if !input.request.in_level || input.gate.halts() || plan.delta <= 0.0 {
        0
    } else {
        plan.step_count
    };

    let step_delta = plan.step_delta();
    for _ in 0..physics_steps {
        session.process_commands(host);
        for player in PLAYERS {
            session.update_entity(host, player, step_delta);
        }
        for player in PLAYERS {
            host.check_collisions(player, step_delta, false);
            let rotation = session.rotation_delta(player, step_delta);
            host.update_rotation(player, rotation);
        }
        session.finish_physics_step(host);
    }

    session.end_frame(input.request.actual_delta);

    let report = FrameReport {
        plan,
        physics_steps,
        substeps: session.executor().substeps_run() - substeps_before,
        inputs_dispatched: session.executor().inputs_dispatched() - inputs_before,
        host_input_enabled: plan.host_input_enabled,
    };
    debug!(
        steps = report.physics_steps,
        substeps = report.substeps,
        inputs = report.inputs_dispatched,
        built = plan.built,
        "frame_finished"
    );
    report
}
