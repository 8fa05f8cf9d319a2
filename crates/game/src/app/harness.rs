use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use stepsplit_engine::{BindMap, ConfigError, GameAction, KeyCode, SessionConfig, SessionOptions};
use thiserror::Error;
use tracing::warn;

pub(crate) const HARNESS_ENV_VAR: &str = "STEPSPLIT_HARNESS";
pub(crate) const SLOW_FRAME_ENV_VAR: &str = "STEPSPLIT_SLOW_FRAME_MS";

pub(crate) const KEY_SPACE: KeyCode = KeyCode(32);
pub(crate) const KEY_LEFT: KeyCode = KeyCode(37);
pub(crate) const KEY_UP: KeyCode = KeyCode(38);
pub(crate) const KEY_RIGHT: KeyCode = KeyCode(39);
pub(crate) const KEY_A: KeyCode = KeyCode(65);
pub(crate) const KEY_D: KeyCode = KeyCode(68);
pub(crate) const KEY_W: KeyCode = KeyCode(87);

#[derive(Debug, Error)]
pub(crate) enum HarnessError {
    #[error("failed to read harness file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid harness file {path} at {field}: {source}")]
    Parse {
        path: PathBuf,
        field: String,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("harness frame_rate must give a representable frame interval, got {0}")]
    FrameRate(f64),
    #[error("lag spike at frame {frame} has an unusable extra_ms of {extra_ms}")]
    LagSpike { frame: u32, extra_ms: f64 },
    #[error("failed to spawn input capture thread: {0}")]
    SpawnCapture(#[source] std::io::Error),
    #[error("input capture thread stopped unexpectedly")]
    CaptureStopped,
}

/// One scripted key transition, relative to the start of the run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct ScriptedKey {
    pub at_ms: f64,
    pub key: KeyCode,
    pub pressed: bool,
}

/// Extra wall time added to a single rendered frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct LagSpike {
    pub frame: u32,
    pub extra_ms: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct OptionChange {
    pub frame: u32,
    pub options: SessionOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct HarnessFile {
    pub session: SessionConfig,
    pub frames: u32,
    /// Rendering rate of the simulated display.
    pub frame_rate: f64,
    pub dual: bool,
    pub binds: BindMap,
    pub script: Vec<ScriptedKey>,
    pub lag_spikes: Vec<LagSpike>,
    pub option_changes: Vec<OptionChange>,
}

impl Default for HarnessFile {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            frames: 240,
            frame_rate: 60.0,
            dual: false,
            binds: default_binds(),
            script: Vec::new(),
            lag_spikes: Vec::new(),
            option_changes: Vec::new(),
        }
    }
}

impl HarnessFile {
    pub(crate) fn validate(&self) -> Result<(), HarnessError> {
        self.session.validate()?;
        if !self.frame_rate.is_finite()
            || self.frame_rate <= 0.0
            || Duration::try_from_secs_f64(1.0 / self.frame_rate).is_err()
        {
            return Err(HarnessError::FrameRate(self.frame_rate));
        }
        for spike in &self.lag_spikes {
            if spike_delay(spike).is_none() {
                return Err(HarnessError::LagSpike {
                    frame: spike.frame,
                    extra_ms: spike.extra_ms,
                });
            }
        }
        Ok(())
    }

    /// Zero for a frame rate that [`HarnessFile::validate`] rejects.
    pub(crate) fn frame_interval(&self) -> Duration {
        Duration::try_from_secs_f64(1.0 / self.frame_rate).unwrap_or(Duration::ZERO)
    }

    pub(crate) fn extra_delay(&self, frame: u32) -> Duration {
        self.lag_spikes
            .iter()
            .filter(|spike| spike.frame == frame)
            .filter_map(spike_delay)
            .fold(Duration::ZERO, Duration::saturating_add)
    }

    /// Script sorted by time; the capture thread replays it in this order.
    pub(crate) fn sorted_script(&self) -> Vec<ScriptedKey> {
        let mut script: Vec<_> = self
            .script
            .iter()
            .copied()
            .filter(|key| key.at_ms.is_finite() && key.at_ms >= 0.0)
            .collect();
        script.sort_by(|a, b| a.at_ms.total_cmp(&b.at_ms));
        script
    }
}

fn spike_delay(spike: &LagSpike) -> Option<Duration> {
    Duration::try_from_secs_f64(spike.extra_ms / 1000.0).ok()
}

pub(crate) fn default_binds() -> BindMap {
    BindMap::new()
        .with_bind(KEY_SPACE, GameAction::P1Jump)
        .with_bind(KEY_W, GameAction::P1Jump)
        .with_bind(KEY_A, GameAction::P1Left)
        .with_bind(KEY_D, GameAction::P1Right)
        .with_bind(KEY_UP, GameAction::P2Jump)
        .with_bind(KEY_LEFT, GameAction::P2Left)
        .with_bind(KEY_RIGHT, GameAction::P2Right)
}

/// Scenario used when no harness file is given: a run-up, a few jumps of
/// different lengths and one long stall mid-air.
pub(crate) fn builtin_scenario() -> HarnessFile {
    let mut script = Vec::new();
    let mut push = |at_ms: f64, key: KeyCode, pressed: bool| {
        script.push(ScriptedKey {
            at_ms,
            key,
            pressed,
        });
    };
    push(100.0, KEY_D, true);
    push(520.3, KEY_SPACE, true);
    push(537.9, KEY_SPACE, false);
    push(1210.0, KEY_SPACE, true);
    // Auto-repeat from the OS while the key is held.
    push(1243.0, KEY_SPACE, true);
    push(1276.0, KEY_SPACE, true);
    push(1402.6, KEY_SPACE, false);
    push(2004.1, KEY_W, true);
    push(2005.2, KEY_SPACE, true);
    push(2090.0, KEY_W, false);
    push(2091.5, KEY_SPACE, false);
    push(3300.0, KEY_D, false);

    HarnessFile {
        session: SessionConfig {
            options: SessionOptions {
                simulation_mode: stepsplit_engine::SimulationMode::Adaptive,
                ..SessionOptions::default()
            },
            ..SessionConfig::default()
        },
        script,
        lag_spikes: vec![LagSpike {
            frame: 75,
            extra_ms: 48.0,
        }],
        ..HarnessFile::default()
    }
}

pub(crate) fn parse_harness_json(path: &Path, raw: &str) -> Result<HarnessFile, HarnessError> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    let harness: HarnessFile =
        serde_path_to_error::deserialize(&mut deserializer).map_err(|err| {
            let field = err.path().to_string();
            HarnessError::Parse {
                path: path.to_path_buf(),
                field,
                source: err.into_inner(),
            }
        })?;
    harness.validate()?;
    Ok(harness)
}

pub(crate) fn load_harness(path: &Path) -> Result<HarnessFile, HarnessError> {
    let raw = fs::read_to_string(path).map_err(|source| HarnessError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;
    parse_harness_json(path, &raw)
}

pub(crate) fn resolve_harness() -> Result<HarnessFile, HarnessError> {
    match env::var(HARNESS_ENV_VAR) {
        Ok(path) if !path.trim().is_empty() => load_harness(Path::new(path.trim())),
        Ok(_) | Err(env::VarError::NotPresent) => Ok(builtin_scenario()),
        Err(err) => {
            warn!(
                env_var = HARNESS_ENV_VAR,
                error = %err,
                "unable to read harness env var; using builtin scenario"
            );
            Ok(builtin_scenario())
        }
    }
}

pub(crate) fn resolve_slow_frame_delay() -> Duration {
    match env::var(SLOW_FRAME_ENV_VAR) {
        Ok(value) => match value.parse::<u64>() {
            Ok(ms) => Duration::from_millis(ms),
            Err(_) => {
                warn!(
                    env_var = SLOW_FRAME_ENV_VAR,
                    value = value.as_str(),
                    "invalid slow-frame env var value; ignoring"
                );
                Duration::ZERO
            }
        },
        Err(env::VarError::NotPresent) => Duration::ZERO,
        Err(err) => {
            warn!(
                env_var = SLOW_FRAME_ENV_VAR,
                error = %err,
                "unable to read slow-frame env var; ignoring"
            );
            Duration::ZERO
        }
    }
}
