use std::io;
use std::sync::{Arc, Mutex};

use super::input::{Button, PlayerSlot};
use super::substep::{EntitySnapshot, SimulationHost, Vec2};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum HostCall {
    Input {
        pressed: bool,
        button: Button,
        player: PlayerSlot,
    },
    Advance(PlayerSlot, f32),
    Collide(PlayerSlot, f32, bool),
    Rotate(PlayerSlot, f32),
    ResetLog(PlayerSlot),
    SetGround(PlayerSlot, bool),
    SetLastPosition(PlayerSlot, Vec2),
}

/// Host that records every callback and moves entities along x.
#[derive(Debug, Default)]
pub(crate) struct RecordingHost {
    pub calls: Vec<HostCall>,
    pub entities: [EntitySnapshot; 2],
    pub dual: bool,
    pub lose_ground_on_advance: bool,
}

impl RecordingHost {
    pub(crate) fn grounded() -> Self {
        let grounded = EntitySnapshot {
            on_ground: true,
            ..EntitySnapshot::default()
        };
        Self {
            entities: [grounded, grounded],
            ..Self::default()
        }
    }

    pub(crate) fn inputs(&self) -> Vec<(bool, Button, PlayerSlot)> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                HostCall::Input {
                    pressed,
                    button,
                    player,
                } => Some((*pressed, *button, *player)),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn advanced_time(&self, player: PlayerSlot) -> f32 {
        self.calls
            .iter()
            .filter_map(|call| match call {
                HostCall::Advance(slot, delta) if *slot == player => Some(*delta),
                _ => None,
            })
            .sum()
    }
}

fn slot_index(player: PlayerSlot) -> usize {
    match player {
        PlayerSlot::One => 0,
        PlayerSlot::Two => 1,
    }
}

impl SimulationHost for RecordingHost {
    fn apply_input(&mut self, pressed: bool, button: Button, player: PlayerSlot) {
        self.calls.push(HostCall::Input {
            pressed,
            button,
            player,
        });
    }

    fn advance(&mut self, player: PlayerSlot, delta: f32) {
        self.calls.push(HostCall::Advance(player, delta));
        let entity = &mut self.entities[slot_index(player)];
        entity.position.x += delta;
        if self.lose_ground_on_advance {
            entity.on_ground = false;
        }
    }

    fn check_collisions(&mut self, player: PlayerSlot, delta: f32, substep: bool) {
        self.calls.push(HostCall::Collide(player, delta, substep));
    }

    fn update_rotation(&mut self, player: PlayerSlot, delta: f32) {
        self.calls.push(HostCall::Rotate(player, delta));
    }

    fn reset_collision_log(&mut self, player: PlayerSlot) {
        self.calls.push(HostCall::ResetLog(player));
    }

    fn entity(&self, player: PlayerSlot) -> EntitySnapshot {
        self.entities[slot_index(player)]
    }

    fn set_on_ground(&mut self, player: PlayerSlot, on_ground: bool) {
        self.calls.push(HostCall::SetGround(player, on_ground));
        self.entities[slot_index(player)].on_ground = on_ground;
    }

    fn set_last_position(&mut self, player: PlayerSlot, position: Vec2) {
        self.calls.push(HostCall::SetLastPosition(player, position));
    }

    fn is_dual(&self) -> bool {
        self.dual
    }
}

pub(crate) fn approx(actual: f32, expected: f32) -> bool {
    (actual - expected).abs() < 1e-6
}

/// Formatted log output collected while a closure runs.
#[derive(Debug, Clone, Default)]
pub(crate) struct LogBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl LogBuffer {
    pub(crate) fn count(&self, message: &str) -> usize {
        let bytes = self.bytes.lock().expect("log buffer lock");
        String::from_utf8_lossy(&bytes).matches(message).count()
    }
}

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.bytes
            .lock()
            .expect("log buffer lock")
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Runs `run` with a thread-scoped subscriber that records every event.
pub(crate) fn with_captured_logs<R>(run: impl FnOnce() -> R) -> (R, LogBuffer) {
    let buffer = LogBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::TRACE)
        .finish();
    let result = tracing::subscriber::with_default(subscriber, run);
    (result, buffer)
}
