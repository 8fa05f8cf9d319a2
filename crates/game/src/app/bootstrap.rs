use std::time::Duration;

use tracing::info;
use tracing_subscriber::EnvFilter;

use super::harness::{resolve_harness, resolve_slow_frame_delay, HarnessError, HarnessFile};

pub(crate) struct AppWiring {
    pub(crate) harness: HarnessFile,
    pub(crate) slow_frame: Duration,
}

pub(crate) fn build_app() -> Result<AppWiring, HarnessError> {
    init_tracing();
    info!("=== stepsplit harness ===");

    let harness = resolve_harness()?;
    let slow_frame = resolve_slow_frame_delay();
    if !slow_frame.is_zero() {
        info!(slow_frame_ms = slow_frame.as_millis() as u64, "slow_frame_enabled");
    }

    Ok(AppWiring {
        harness,
        slow_frame,
    })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}
