use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::channel::InputProducer;
use super::input::{ActionStates, GameAction, InputEvent, InputState};
use super::timeline::{MonotonicClock, Timestamp};

static KEYBIND_LOCK_POISON_WARNED: AtomicBool = AtomicBool::new(false);

fn warn_keybind_lock_poison_once(operation: &'static str) {
    if KEYBIND_LOCK_POISON_WARNED
        .compare_exchange(false, true, Ordering::Relaxed, Ordering::Relaxed)
        .is_ok()
    {
        warn!(operation, "keybind lock poisoned; recovered inner value");
    }
}

/// Platform-independent physical key identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyCode(pub u32);

/// Physical keys bound to each action. One key may drive several actions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BindMap {
    binds: BTreeMap<KeyCode, Vec<GameAction>>,
}

impl BindMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, key: KeyCode, action: GameAction) -> &mut Self {
        let actions = self.binds.entry(key).or_default();
        if !actions.contains(&action) {
            actions.push(action);
        }
        self
    }

    pub fn with_bind(mut self, key: KeyCode, action: GameAction) -> Self {
        self.bind(key, action);
        self
    }

    pub fn actions_for(&self, key: KeyCode) -> &[GameAction] {
        self.binds.get(&key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.binds.is_empty()
    }
}

/// Shared bind table. Writers swap the whole map; readers take a cheap
/// snapshot per key event.
#[derive(Debug, Clone, Default)]
pub struct KeybindTable {
    current: Arc<RwLock<Arc<BindMap>>>,
}

impl KeybindTable {
    pub fn new(map: BindMap) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(map))),
        }
    }

    pub fn snapshot(&self) -> Arc<BindMap> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => {
                warn_keybind_lock_poison_once("read");
                Arc::clone(&poisoned.into_inner())
            }
        }
    }

    pub fn replace(&self, map: BindMap) {
        let map = Arc::new(map);
        match self.current.write() {
            Ok(mut guard) => *guard = map,
            Err(poisoned) => {
                warn_keybind_lock_poison_once("write");
                *poisoned.into_inner() = map;
            }
        }
    }
}

/// Producer side of the input channel.
///
/// Turns raw key transitions into [`InputEvent`]s: OS auto-repeat of a held
/// key is swallowed, and an action bound to several keys only changes state
/// on its first press and last release.
pub struct InputCapture {
    producer: InputProducer,
    binds: KeybindTable,
    clock: Arc<dyn MonotonicClock>,
    held_keys: HashSet<KeyCode>,
    action_states: ActionStates,
}

impl InputCapture {
    pub fn new(
        producer: InputProducer,
        binds: KeybindTable,
        clock: Arc<dyn MonotonicClock>,
    ) -> Self {
        Self {
            producer,
            binds,
            clock,
            held_keys: HashSet::new(),
            action_states: ActionStates::default(),
        }
    }

    /// Stamps the transition with the capture clock. Returns the number of
    /// events accepted by the channel.
    pub fn on_key(&mut self, key: KeyCode, pressed: bool) -> usize {
        let now = self.clock.now();
        self.on_key_at(key, pressed, now)
    }

    pub fn on_key_at(&mut self, key: KeyCode, pressed: bool, timestamp: Timestamp) -> usize {
        if pressed {
            if !self.held_keys.insert(key) {
                return 0;
            }
        } else if !self.held_keys.remove(&key) {
            return 0;
        }

        let binds = self.binds.snapshot();
        let mut pushed = 0;
        for &action in binds.actions_for(key) {
            let still_held = !pressed
                && self
                    .held_keys
                    .iter()
                    .any(|held| binds.actions_for(*held).contains(&action));
            if still_held || self.action_states.is_down(action) == pressed {
                continue;
            }
            self.action_states.set(action, pressed);

            let state = if pressed {
                InputState::Pressed
            } else {
                InputState::Released
            };
            if self
                .producer
                .push(InputEvent::new(timestamp, action, state))
                .is_ok()
            {
                pushed += 1;
            }
        }

        if pushed == 0 && binds.actions_for(key).is_empty() {
            debug!(key = key.0, "unbound_key");
        }
        pushed
    }

    /// Focus loss: every held key is forgotten without emitting releases.
    pub fn release_all(&mut self) {
        self.held_keys.clear();
        self.action_states.clear();
    }

    pub fn dropped(&self) -> u64 {
        self.producer.dropped()
    }
}
