use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use stepsplit_engine::{
    open_session, run_frame, FrameGate, FrameInput, FrameRequest, InputCapture, KeybindTable,
    ManualClock, ModeBadge, SimulationHost, StepMetricsSnapshot, Timestamp,
};
use tracing::{debug, info};

use super::digest::TrajectoryDigest;
use super::harness::{HarnessError, HarnessFile, ScriptedKey};
use super::sim::Platformer;

const CAPTURE_THREAD_NAME: &str = "input-capture";

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RunSummary {
    pub frames: u32,
    pub physics_steps: u64,
    pub substeps: u64,
    pub inputs_applied: u64,
    pub collision_checks: u64,
    pub dropped_inputs: u64,
    pub step_overflows: u64,
    pub digest_hex: String,
    pub metrics: StepMetricsSnapshot,
    pub badge: Option<ModeBadge>,
    pub submits_result: bool,
}

fn script_timestamp(key: &ScriptedKey) -> Timestamp {
    Timestamp::ZERO.offset((key.at_ms * 1_000_000.0).round() as i64)
}

/// Capture side: replays the script into the input channel up to each
/// timestamp the frame loop hands over, and reports what it emitted.
fn capture_loop(
    mut capture: InputCapture,
    script: Vec<ScriptedKey>,
    until_rx: mpsc::Receiver<Timestamp>,
    emitted_tx: mpsc::Sender<Vec<ScriptedKey>>,
) {
    let mut script = script.into_iter().peekable();
    for until in until_rx {
        let mut emitted = Vec::new();
        while let Some(key) = script.next_if(|key| script_timestamp(key) <= until) {
            capture.on_key_at(key.key, key.pressed, script_timestamp(&key));
            emitted.push(key);
        }
        if emitted_tx.send(emitted).is_err() {
            break;
        }
    }
    debug!(dropped = capture.dropped(), "input_capture_stopped");
}

/// Replays `harness` on a manual clock. Deterministic: the same harness
/// always yields the same digest.
pub(crate) fn run_harness(
    harness: &HarnessFile,
    slow_frame: Duration,
) -> Result<RunSummary, HarnessError> {
    harness.validate()?;

    let clock = Arc::new(ManualClock::new(Timestamp::ZERO));
    let (mut session, producer) = open_session(harness.session, clock.clone())?;
    let binds = KeybindTable::new(harness.binds.clone());
    let capture = InputCapture::new(producer, binds.clone(), clock.clone());
    let mut world = Platformer::new(harness.dual);
    let mut digest = TrajectoryDigest::new();

    let mut option_changes = harness.option_changes.clone();
    option_changes.sort_by_key(|change| change.frame);
    let mut option_changes = option_changes.into_iter().peekable();

    info!(
        frames = harness.frames,
        frame_rate = harness.frame_rate,
        mode = ?harness.session.options.simulation_mode,
        cutoff = ?harness.session.options.input_cutoff,
        dual = harness.dual,
        script_len = harness.script.len(),
        "harness_started"
    );
    session.start_session();

    let (until_tx, until_rx) = mpsc::channel::<Timestamp>();
    let (emitted_tx, emitted_rx) = mpsc::channel::<Vec<ScriptedKey>>();
    let script = harness.sorted_script();

    let mut physics_steps = 0u64;
    let mut substeps = 0u64;

    thread::scope(|scope| -> Result<(), HarnessError> {
        thread::Builder::new()
            .name(CAPTURE_THREAD_NAME.to_string())
            .spawn_scoped(scope, move || {
                capture_loop(capture, script, until_rx, emitted_tx)
            })
            .map_err(HarnessError::SpawnCapture)?;

        // Dropped on every exit from this closure, which ends the capture loop.
        let until_tx = until_tx;

        for frame in 0..harness.frames {
            while let Some(change) = option_changes.next_if(|change| change.frame <= frame) {
                session.apply_options(change.options);
            }

            let frame_dt = harness
                .frame_interval()
                .saturating_add(harness.extra_delay(frame))
                .saturating_add(slow_frame);
            let now = clock.advance(i64::try_from(frame_dt.as_nanos()).unwrap_or(i64::MAX));
            until_tx
                .send(now)
                .map_err(|_| HarnessError::CaptureStopped)?;
            let emitted = emitted_rx
                .recv()
                .map_err(|_| HarnessError::CaptureStopped)?;

            let frame_seconds = frame_dt.as_secs_f64();
            let report = run_frame(
                &mut session,
                &mut world,
                FrameInput {
                    gate: FrameGate::active(),
                    request: FrameRequest::new(frame_seconds),
                },
            );
            physics_steps += u64::from(report.physics_steps);
            substeps += report.substeps;

            // Keys the session did not queue this frame reach the host directly.
            if report.host_input_enabled && !emitted.is_empty() {
                let table = binds.snapshot();
                for key in &emitted {
                    for action in table.actions_for(key.key) {
                        world.apply_input(key.pressed, action.button(), action.player());
                    }
                }
            }
            digest.record_frame(frame, &world);
        }
        Ok(())
    })?;

    let gate = session.result_gate();
    let summary = RunSummary {
        frames: digest.frames(),
        physics_steps,
        substeps,
        inputs_applied: world.inputs_applied(),
        collision_checks: world.collision_checks(),
        dropped_inputs: session.dropped_inputs(),
        step_overflows: session.step_overflows(),
        digest_hex: digest.finish_hex(),
        metrics: session.metrics().snapshot(),
        badge: gate.mode_badge(),
        submits_result: gate.should_submit(),
    };
    info!(
        frames = summary.frames,
        physics_steps = summary.physics_steps,
        substeps = summary.substeps,
        inputs_applied = summary.inputs_applied,
        dropped_inputs = summary.dropped_inputs,
        digest = summary.digest_hex.as_str(),
        "harness_finished"
    );
    Ok(summary)
}
