use stepsplit_engine::{Button, EntitySnapshot, MovementMode, PlayerSlot, SimulationHost, Vec2};

const GRAVITY: f64 = -86.0;
const JUMP_VELOCITY: f64 = 22.0;
const SHIP_THRUST: f64 = 140.0;
const RUN_SPEED: f32 = 10.4;
const AIR_SPIN_DEGREES_PER_SECOND: f32 = 420.0;
const FLOOR_Y: f32 = 0.0;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct HeldButtons {
    jump: bool,
    left: bool,
    right: bool,
}

impl HeldButtons {
    fn set(&mut self, button: Button, pressed: bool) {
        match button {
            Button::Jump => self.jump = pressed,
            Button::Left => self.left = pressed,
            Button::Right => self.right = pressed,
        }
    }

    fn direction(&self) -> f32 {
        match (self.left, self.right) {
            (true, false) => -1.0,
            (false, true) => 1.0,
            _ => 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct Body {
    pub position: Vec2,
    pub last_position: Vec2,
    pub y_velocity: f64,
    pub on_ground: bool,
    pub rotation_degrees: f32,
    pub movement: MovementMode,
    held: HeldButtons,
    /// A jump press not yet consumed by a grounded update.
    jump_buffered: bool,
}

impl Body {
    fn grounded() -> Self {
        Self {
            on_ground: true,
            ..Self::default()
        }
    }
}

/// A two-player side-scroller that is just detailed enough to show where
/// inputs land inside a physics step: constant run speed, gravity, a flat
/// floor and a jump impulse.
#[derive(Debug, Clone)]
pub(crate) struct Platformer {
    bodies: [Body; 2],
    dual: bool,
    /// Horizontal span of a pad that counts as touching a zone.
    zone: Option<(f32, f32)>,
    collision_checks: u64,
    inputs_applied: u64,
}

impl Platformer {
    pub(crate) fn new(dual: bool) -> Self {
        Self {
            bodies: [Body::grounded(), Body::grounded()],
            dual,
            zone: Some((40.0, 44.0)),
            collision_checks: 0,
            inputs_applied: 0,
        }
    }

    pub(crate) fn body(&self, player: PlayerSlot) -> &Body {
        &self.bodies[slot(player)]
    }

    #[cfg(test)]
    pub(crate) fn set_movement(&mut self, player: PlayerSlot, movement: MovementMode) {
        self.bodies[slot(player)].movement = movement;
    }

    pub(crate) fn collision_checks(&self) -> u64 {
        self.collision_checks
    }

    pub(crate) fn inputs_applied(&self) -> u64 {
        self.inputs_applied
    }

    fn active(&self, player: PlayerSlot) -> bool {
        player.is_player_one() || self.dual
    }

    fn touching_zone(&self, body: &Body) -> bool {
        self.zone
            .is_some_and(|(start, end)| body.position.x >= start && body.position.x <= end)
    }
}

fn slot(player: PlayerSlot) -> usize {
    match player {
        PlayerSlot::One => 0,
        PlayerSlot::Two => 1,
    }
}

impl SimulationHost for Platformer {
    fn apply_input(&mut self, pressed: bool, button: Button, player: PlayerSlot) {
        self.inputs_applied += 1;
        let body = &mut self.bodies[slot(player)];
        body.held.set(button, pressed);
        if button == Button::Jump {
            body.jump_buffered = pressed;
        }
    }

    fn advance(&mut self, player: PlayerSlot, delta: f32) {
        if !self.active(player) {
            return;
        }
        let body = &mut self.bodies[slot(player)];
        let dt = f64::from(delta);

        body.position.x += body.held.direction() * RUN_SPEED * delta;

        match body.movement {
            MovementMode::Standard => {
                if body.on_ground && (body.jump_buffered || body.held.jump) {
                    body.y_velocity = JUMP_VELOCITY;
                    body.on_ground = false;
                    body.jump_buffered = false;
                }
                body.y_velocity += GRAVITY * dt;
            }
            MovementMode::Ship | MovementMode::Bird | MovementMode::Dart | MovementMode::Swing => {
                let thrust = if body.held.jump { SHIP_THRUST } else { 0.0 };
                body.y_velocity += (GRAVITY + thrust) * dt;
                if body.y_velocity > 0.0 {
                    body.on_ground = false;
                }
            }
        }

        body.position.y += (body.y_velocity * dt) as f32;
    }

    fn check_collisions(&mut self, player: PlayerSlot, _delta: f32, _substep: bool) {
        if !self.active(player) {
            return;
        }
        self.collision_checks += 1;
        let body = &mut self.bodies[slot(player)];
        if body.position.y <= FLOOR_Y && body.y_velocity <= 0.0 {
            body.position.y = FLOOR_Y;
            body.y_velocity = 0.0;
            body.on_ground = true;
        }
    }

    fn update_rotation(&mut self, player: PlayerSlot, delta: f32) {
        let body = &mut self.bodies[slot(player)];
        if body.on_ground {
            body.rotation_degrees = (body.rotation_degrees / 90.0).round() * 90.0;
        } else {
            body.rotation_degrees =
                (body.rotation_degrees + AIR_SPIN_DEGREES_PER_SECOND * delta) % 360.0;
        }
    }

    fn entity(&self, player: PlayerSlot) -> EntitySnapshot {
        let body = &self.bodies[slot(player)];
        EntitySnapshot {
            position: body.position,
            y_velocity: body.y_velocity,
            on_ground: body.on_ground,
            upside_down: false,
            touching_zone: self.touching_zone(body),
            dashing: false,
            movement: body.movement,
        }
    }

    fn set_on_ground(&mut self, player: PlayerSlot, on_ground: bool) {
        self.bodies[slot(player)].on_ground = on_ground;
    }

    fn set_last_position(&mut self, player: PlayerSlot, position: Vec2) {
        self.bodies[slot(player)].last_position = position;
    }

    fn is_dual(&self) -> bool {
        self.dual
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STEP: f32 = 1.0 / 240.0;

    fn step(world: &mut Platformer, player: PlayerSlot) {
        world.advance(player, STEP);
        world.check_collisions(player, STEP, false);
        world.update_rotation(player, STEP);
    }

    #[test]
    fn jump_press_leaves_ground_on_next_advance() {
        let mut world = Platformer::new(false);
        world.apply_input(true, Button::Jump, PlayerSlot::One);
        step(&mut world, PlayerSlot::One);

        let body = world.body(PlayerSlot::One);
        assert!(!body.on_ground);
        assert!(body.position.y > 0.0);
    }

    #[test]
    fn body_lands_back_on_floor() {
        let mut world = Platformer::new(false);
        world.apply_input(true, Button::Jump, PlayerSlot::One);
        step(&mut world, PlayerSlot::One);
        world.apply_input(false, Button::Jump, PlayerSlot::One);
        for _ in 0..600 {
            step(&mut world, PlayerSlot::One);
        }

        let body = world.body(PlayerSlot::One);
        assert!(body.on_ground);
        assert_eq!(body.position.y, FLOOR_Y);
        assert_eq!(body.rotation_degrees % 90.0, 0.0);
    }

    #[test]
    fn held_direction_moves_horizontally() {
        let mut world = Platformer::new(false);
        world.apply_input(true, Button::Right, PlayerSlot::One);
        for _ in 0..240 {
            step(&mut world, PlayerSlot::One);
        }
        assert!((world.body(PlayerSlot::One).position.x - RUN_SPEED).abs() < 1e-3);
    }

    #[test]
    fn second_player_idle_outside_dual_mode() {
        let mut world = Platformer::new(false);
        world.apply_input(true, Button::Right, PlayerSlot::Two);
        step(&mut world, PlayerSlot::Two);
        assert_eq!(world.body(PlayerSlot::Two).position.x, 0.0);
        assert!(!world.is_dual());
    }

    #[test]
    fn zone_is_reported_in_snapshot() {
        let mut world = Platformer::new(false);
        world.bodies[0].position.x = 42.0;
        world.bodies[0].on_ground = false;
        let snapshot = world.entity(PlayerSlot::One);
        assert!(snapshot.touching_zone);
        assert!(snapshot.splits_substeps());
    }

    #[test]
    fn ship_mode_climbs_while_jump_held() {
        let mut world = Platformer::new(false);
        world.set_movement(PlayerSlot::One, MovementMode::Ship);
        world.apply_input(true, Button::Jump, PlayerSlot::One);
        for _ in 0..24 {
            step(&mut world, PlayerSlot::One);
        }
        assert!(world.body(PlayerSlot::One).position.y > 0.0);
        assert!(world.entity(PlayerSlot::One).splits_substeps());
    }
}
