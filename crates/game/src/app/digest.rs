use sha2::{Digest, Sha256};
use stepsplit_engine::PlayerSlot;

use super::sim::Platformer;

/// Hash of every entity state at the end of each frame. Two runs of the same
/// harness must produce the same digest.
#[derive(Clone, Default)]
pub(crate) struct TrajectoryDigest {
    hasher: Sha256,
    frames: u32,
}

impl TrajectoryDigest {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_frame(&mut self, frame: u32, world: &Platformer) {
        self.hasher.update(frame.to_le_bytes());
        for player in [PlayerSlot::One, PlayerSlot::Two] {
            let body = world.body(player);
            self.hasher.update(body.position.x.to_le_bytes());
            self.hasher.update(body.position.y.to_le_bytes());
            self.hasher.update(body.last_position.x.to_le_bytes());
            self.hasher.update(body.last_position.y.to_le_bytes());
            self.hasher.update(body.y_velocity.to_le_bytes());
            self.hasher.update(body.rotation_degrees.to_le_bytes());
            self.hasher.update([u8::from(body.on_ground)]);
        }
        self.frames += 1;
    }

    pub(crate) fn frames(&self) -> u32 {
        self.frames
    }

    pub(crate) fn finish_hex(self) -> String {
        to_hex_lower(&self.hasher.finalize())
    }
}

fn to_hex_lower(bytes: &[u8]) -> String {
    let mut output = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        use std::fmt::Write as _;
        let _ = write!(&mut output, "{byte:02x}");
    }
    output
}

#[cfg(test)]
mod tests {
    use stepsplit_engine::{Button, SimulationHost};

    use super::*;

    #[test]
    fn digest_is_stable_for_same_states() {
        let world = Platformer::new(false);
        let mut a = TrajectoryDigest::new();
        let mut b = TrajectoryDigest::new();
        a.record_frame(0, &world);
        b.record_frame(0, &world);

        assert_eq!(a.frames(), 1);
        assert_eq!(a.finish_hex(), b.finish_hex());
    }

    #[test]
    fn digest_changes_with_state() {
        let mut world = Platformer::new(false);
        let mut before = TrajectoryDigest::new();
        before.record_frame(0, &world);

        world.apply_input(true, Button::Right, PlayerSlot::One);
        world.advance(PlayerSlot::One, 1.0 / 240.0);
        let mut after = TrajectoryDigest::new();
        after.record_frame(0, &world);

        assert_ne!(before.finish_hex(), after.finish_hex());
    }

    #[test]
    fn hex_is_lowercase_and_full_length() {
        let hex = TrajectoryDigest::new().finish_hex();
        assert_eq!(hex.len(), 64);
        assert!(hex.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }
}
