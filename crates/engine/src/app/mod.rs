mod channel;
mod config;
mod estimator;
mod input;
mod keybinds;
mod loop_runner;
mod metrics;
mod results;
mod session;
mod step_queue;
mod substep;
#[cfg(test)]
mod test_host;
mod timeline;

pub use channel::{
    input_channel, ChannelFull, InputConsumer, InputProducer, DEFAULT_INPUT_CHANNEL_CAPACITY,
};
pub use config::{
    load_session_config, parse_session_config_json, ConfigError, InputCutoffPolicy, SessionConfig,
    SessionOptions, SimulationMode, DEFAULT_MAX_STEPS_PER_FRAME, DEFAULT_STEP_QUEUE_INPUT_RESERVE,
    DEFAULT_TARGET_FRAME_RATE,
};
pub use estimator::{LagClass, StepCountEstimator};
pub use input::{Button, GameAction, InputEvent, InputState, PlayerSlot, ACTION_COUNT};
pub use keybinds::{BindMap, InputCapture, KeyCode, KeybindTable};
pub use loop_runner::{run_frame, FrameInput, FrameReport};
pub use metrics::{MetricsHandle, StepMetricsSnapshot};
pub use results::{ModeBadge, ResultGate};
pub use session::{open_session, FrameGate, FramePlan, FrameRequest, SessionContext};
pub use step_queue::{
    BuildStats, Step, StepQueue, StepQueueBuilder, StepQueueFull, MIN_STEP_FRACTION,
};
pub use substep::{EntitySnapshot, FramePhase, MovementMode, SimulationHost, SubstepExecutor, Vec2};
pub use timeline::{FrameTimeline, ManualClock, MonotonicClock, SystemClock, Timestamp};
