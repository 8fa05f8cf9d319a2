use serde::{Deserialize, Serialize};

use super::timeline::Timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Button {
    Jump,
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerSlot {
    One,
    Two,
}

impl PlayerSlot {
    pub fn is_player_one(self) -> bool {
        self == PlayerSlot::One
    }
}

/// A logical button bound to a player slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameAction {
    P1Jump,
    P1Left,
    P1Right,
    P2Jump,
    P2Left,
    P2Right,
}

pub const ACTION_COUNT: usize = 6;

impl GameAction {
    pub const ALL: [GameAction; ACTION_COUNT] = [
        GameAction::P1Jump,
        GameAction::P1Left,
        GameAction::P1Right,
        GameAction::P2Jump,
        GameAction::P2Left,
        GameAction::P2Right,
    ];

    pub const fn new(button: Button, player: PlayerSlot) -> Self {
        match (player, button) {
            (PlayerSlot::One, Button::Jump) => GameAction::P1Jump,
            (PlayerSlot::One, Button::Left) => GameAction::P1Left,
            (PlayerSlot::One, Button::Right) => GameAction::P1Right,
            (PlayerSlot::Two, Button::Jump) => GameAction::P2Jump,
            (PlayerSlot::Two, Button::Left) => GameAction::P2Left,
            (PlayerSlot::Two, Button::Right) => GameAction::P2Right,
        }
    }

    pub const fn button(self) -> Button {
        match self {
            GameAction::P1Jump | GameAction::P2Jump => Button::Jump,
            GameAction::P1Left | GameAction::P2Left => Button::Left,
            GameAction::P1Right | GameAction::P2Right => Button::Right,
        }
    }

    pub const fn player(self) -> PlayerSlot {
        match self {
            GameAction::P1Jump | GameAction::P1Left | GameAction::P1Right => PlayerSlot::One,
            GameAction::P2Jump | GameAction::P2Left | GameAction::P2Right => PlayerSlot::Two,
        }
    }

    pub(crate) const fn index(self) -> usize {
        match self {
            GameAction::P1Jump => 0,
            GameAction::P1Left => 1,
            GameAction::P1Right => 2,
            GameAction::P2Jump => 3,
            GameAction::P2Left => 4,
            GameAction::P2Right => 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputState {
    Pressed,
    Released,
}

impl InputState {
    pub fn is_pressed(self) -> bool {
        self == InputState::Pressed
    }
}

/// One classified, timestamped input. Immutable once captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputEvent {
    pub timestamp: Timestamp,
    pub action: GameAction,
    pub state: InputState,
}

impl InputEvent {
    pub fn new(timestamp: Timestamp, action: GameAction, state: InputState) -> Self {
        Self {
            timestamp,
            action,
            state,
        }
    }

    pub fn pressed(timestamp: Timestamp, action: GameAction) -> Self {
        Self::new(timestamp, action, InputState::Pressed)
    }

    pub fn released(timestamp: Timestamp, action: GameAction) -> Self {
        Self::new(timestamp, action, InputState::Released)
    }

    /// Packs action and state into the single byte stored in a channel slot.
    pub(crate) fn payload_code(&self) -> u8 {
        ((self.action.index() as u8) << 1) | u8::from(self.state.is_pressed())
    }

    pub(crate) fn from_parts(timestamp: Timestamp, code: u8) -> Self {
        let action = GameAction::ALL[usize::from(code >> 1) % ACTION_COUNT];
        let state = if code & 1 == 1 {
            InputState::Pressed
        } else {
            InputState::Released
        };
        Self::new(timestamp, action, state)
    }
}

/// Which logical actions are currently held, per action.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct ActionStates {
    down: [bool; ACTION_COUNT],
}

impl ActionStates {
    pub(crate) fn set(&mut self, action: GameAction, is_down: bool) {
        self.down[action.index()] = is_down;
    }

    pub(crate) fn is_down(&self, action: GameAction) -> bool {
        self.down[action.index()]
    }

    pub(crate) fn clear(&mut self) {
        self.down = [false; ACTION_COUNT];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_splits_into_button_and_player() {
        for action in GameAction::ALL {
            assert_eq!(GameAction::new(action.button(), action.player()), action);
        }
        assert_eq!(GameAction::P2Left.player(), PlayerSlot::Two);
        assert_eq!(GameAction::P2Left.button(), Button::Left);
    }

    #[test]
    fn payload_code_preserves_action_and_state() {
        let event = InputEvent::released(Timestamp(42), GameAction::P2Right);
        let decoded = InputEvent::from_parts(event.timestamp, event.payload_code());
        assert_eq!(decoded, event);

        let pressed = InputEvent::pressed(Timestamp(7), GameAction::P1Jump);
        assert_eq!(
            InputEvent::from_parts(Timestamp(7), pressed.payload_code()),
            pressed
        );
    }

    #[test]
    fn action_states_track_each_action_independently() {
        let mut states = ActionStates::default();
        states.set(GameAction::P1Jump, true);
        assert!(states.is_down(GameAction::P1Jump));
        assert!(!states.is_down(GameAction::P2Jump));

        states.clear();
        assert!(!states.is_down(GameAction::P1Jump));
    }
}
