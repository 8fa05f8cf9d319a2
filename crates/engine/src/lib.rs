pub mod app;

pub use app::{
    input_channel, load_session_config, open_session, parse_session_config_json, run_frame,
    BindMap, BuildStats, Button, ChannelFull, ConfigError, EntitySnapshot, FrameGate, FrameInput,
    FramePhase, FramePlan, FrameReport, FrameRequest, FrameTimeline, GameAction, InputCapture,
    InputConsumer, InputCutoffPolicy, InputEvent, InputProducer, InputState, KeyCode,
    KeybindTable, LagClass, ManualClock, MetricsHandle, ModeBadge, MonotonicClock,
    MovementMode, PlayerSlot, ResultGate, SessionConfig, SessionContext, SessionOptions,
    SimulationHost, SimulationMode, Step, StepCountEstimator, StepMetricsSnapshot, StepQueue,
    StepQueueBuilder, StepQueueFull, SubstepExecutor, SystemClock, Timestamp, Vec2,
    ACTION_COUNT, DEFAULT_INPUT_CHANNEL_CAPACITY, DEFAULT_MAX_STEPS_PER_FRAME,
    DEFAULT_STEP_QUEUE_INPUT_RESERVE, DEFAULT_TARGET_FRAME_RATE, MIN_STEP_FRACTION,
};
