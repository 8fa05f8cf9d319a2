use std::process::ExitCode;

use tracing::{error, info};

use super::bootstrap::AppWiring;
use super::replay::run_harness;

pub(crate) fn run(app: AppWiring) -> ExitCode {
    let summary = match run_harness(&app.harness, app.slow_frame) {
        Ok(summary) => summary,
        Err(err) => {
            error!(error = %err, "harness_failed");
            return ExitCode::FAILURE;
        }
    };

    info!(
        fps = summary.metrics.fps,
        steps_per_second = summary.metrics.steps_per_second,
        substeps_per_second = summary.metrics.substeps_per_second,
        last_step_count = summary.metrics.last_step_count,
        step_overflows = summary.step_overflows,
        collision_checks = summary.collision_checks,
        badge = summary.badge.map(|badge| badge.label()).unwrap_or("none"),
        submits_result = summary.submits_result,
        "run_summary"
    );
    println!("{}", summary.digest_hex);

    ExitCode::SUCCESS
}
