use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::channel::DEFAULT_INPUT_CHANNEL_CAPACITY;

pub const DEFAULT_TARGET_FRAME_RATE: f64 = 60.0;
pub const DEFAULT_MAX_STEPS_PER_FRAME: u32 = 240;
pub const DEFAULT_STEP_QUEUE_INPUT_RESERVE: usize = 64;

/// How many physics steps a rendered frame is divided into.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulationMode {
    /// The host's own formula; enhanced stepping off.
    #[default]
    Baseline,
    /// Fixed 240 Hz stepping without lag compensation.
    Legacy,
    /// 240 Hz stepping with EMA-based lag compensation.
    Adaptive,
}

impl SimulationMode {
    pub fn is_enhanced(self) -> bool {
        self != SimulationMode::Baseline
    }
}

/// When the current frame's timestamp is taken relative to draining input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputCutoffPolicy {
    /// Stamp the frame first; later events wait for the next frame.
    #[default]
    Early,
    /// Drain everything first, then stamp the frame.
    Late,
}

/// Options a player may change at any time; applied at the next frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionOptions {
    /// Soft toggle. When false the session passes input straight through.
    pub enabled: bool,
    pub simulation_mode: SimulationMode,
    pub input_cutoff: InputCutoffPolicy,
    pub safe_mode_suppresses_result_submission: bool,
    pub dispatch_inputs_only_at_step_boundary: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            simulation_mode: SimulationMode::Baseline,
            input_cutoff: InputCutoffPolicy::Early,
            safe_mode_suppresses_result_submission: false,
            dispatch_inputs_only_at_step_boundary: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    pub options: SessionOptions,
    /// Nominal rendering rate; its reciprocal is the animation interval.
    pub target_frame_rate: f64,
    pub input_channel_capacity: usize,
    pub max_steps_per_frame: u32,
    /// Step queue slots available for input steps on top of one boundary
    /// per physics step.
    pub step_queue_input_reserve: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            options: SessionOptions::default(),
            target_frame_rate: DEFAULT_TARGET_FRAME_RATE,
            input_channel_capacity: DEFAULT_INPUT_CHANNEL_CAPACITY,
            max_steps_per_frame: DEFAULT_MAX_STEPS_PER_FRAME,
            step_queue_input_reserve: DEFAULT_STEP_QUEUE_INPUT_RESERVE,
        }
    }
}

impl SessionConfig {
    pub fn nominal_frame_interval(&self) -> f64 {
        1.0 / self.target_frame_rate
    }

    pub fn step_queue_capacity(&self) -> usize {
        self.max_steps_per_frame as usize + self.step_queue_input_reserve
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.target_frame_rate.is_finite() || self.target_frame_rate <= 0.0 {
            return Err(ConfigError::Invalid {
                field: "target_frame_rate",
                message: format!("expected a positive rate, got {}", self.target_frame_rate),
            });
        }
        if self.input_channel_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "input_channel_capacity",
                message: "expected at least 1".to_string(),
            });
        }
        if self.max_steps_per_frame == 0 {
            return Err(ConfigError::Invalid {
                field: "max_steps_per_frame",
                message: "expected at least 1".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config json at {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid config value for {field}: {message}")]
    Invalid {
        field: &'static str,
        message: String,
    },
}

pub fn parse_session_config_json(raw: &str) -> Result<SessionConfig, ConfigError> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    let config = serde_path_to_error::deserialize::<_, SessionConfig>(&mut deserializer)
        .map_err(|error| {
            let path = error.path().to_string();
            ConfigError::Parse {
                path,
                source: error.into_inner(),
            }
        })?;
    config.validate()?;
    Ok(config)
}

pub fn load_session_config(path: &Path) -> Result<SessionConfig, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;
    parse_session_config_json(&raw)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    #[test]
    fn empty_object_yields_defaults() {
        let config = parse_session_config_json("{}").expect("config");
        assert_eq!(config, SessionConfig::default());
        assert_eq!(config.step_queue_capacity(), 240 + 64);
        assert!((config.nominal_frame_interval() - 1.0 / 60.0).abs() < 1e-12);
    }

    #[test]
    fn options_parse_snake_case_modes() {
        let config = parse_session_config_json(
            r#"{"options": {"simulation_mode": "adaptive", "input_cutoff": "late",
                "dispatch_inputs_only_at_step_boundary": true}}"#,
        )
        .expect("config");

        assert_eq!(config.options.simulation_mode, SimulationMode::Adaptive);
        assert_eq!(config.options.input_cutoff, InputCutoffPolicy::Late);
        assert!(config.options.dispatch_inputs_only_at_step_boundary);
        assert!(config.options.enabled);
    }

    #[test]
    fn parse_error_reports_field_path() {
        let error = parse_session_config_json(r#"{"options": {"simulation_mode": "turbo"}}"#)
            .expect_err("unknown mode");
        match error {
            ConfigError::Parse { path, .. } => assert_eq!(path, "options.simulation_mode"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let error =
            parse_session_config_json(r#"{"mouse_fix": true}"#).expect_err("unknown field");
        assert!(matches!(error, ConfigError::Parse { .. }));
    }

    #[test]
    fn zero_capacity_fails_validation() {
        let error = parse_session_config_json(r#"{"input_channel_capacity": 0}"#)
            .expect_err("zero capacity");
        assert!(matches!(
            error,
            ConfigError::Invalid {
                field: "input_channel_capacity",
                ..
            }
        ));
    }

    #[test]
    fn non_positive_frame_rate_fails_validation() {
        let config = SessionConfig {
            target_frame_rate: 0.0,
            ..SessionConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_reads_config_from_disk() {
        let temp = TempDir::new().expect("temp dir");
        let path = temp.path().join("session.json");
        fs::write(&path, r#"{"target_frame_rate": 240.0, "max_steps_per_frame": 16}"#)
            .expect("write config");

        let config = load_session_config(&path).expect("load");
        assert_eq!(config.max_steps_per_frame, 16);
        assert!((config.target_frame_rate - 240.0).abs() < f64::EPSILON);
    }

    #[test]
    fn load_missing_file_is_read_error() {
        let temp = TempDir::new().expect("temp dir");
        let error = load_session_config(&temp.path().join("missing.json")).expect_err("missing");
        assert!(matches!(error, ConfigError::ReadFile { .. }));
    }
}
