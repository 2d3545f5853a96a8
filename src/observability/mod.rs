use std::time::Instant;

use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::protocol::turns::ResponseUsage;

/// Initialize the tracing subscriber with the configured log level.
///
/// Maps config log levels to tracing levels:
/// - "DISABLED" -> no subscriber installed
/// - "WARNING" -> WARN
/// - "CRITICAL" -> ERROR
/// - Others map directly (TRACE, DEBUG, INFO, WARN, ERROR)
pub fn init_tracing(log_level: &str) {
    let level = log_level.to_uppercase();

    if level == "DISABLED" {
        return;
    }

    let tracing_level = tracing_level_for(&level);
    let filter = EnvFilter::try_new(tracing_level).unwrap_or_else(|_| EnvFilter::new("INFO"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

fn tracing_level_for(level: &str) -> &str {
    match level {
        "WARNING" => "WARN",
        "CRITICAL" => "ERROR",
        other => other,
    }
}

/// Log the end of a turn with its usage and wall time.
pub fn log_request_complete(
    model: &str,
    status: &str,
    usage: Option<&ResponseUsage>,
    start_time: Instant,
) {
    let duration_ms = start_time.elapsed().as_millis();
    match usage {
        Some(usage) => info!(
            model = model,
            status = status,
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            total_tokens = usage.total_tokens,
            duration_ms = duration_ms as u64,
            "turn complete"
        ),
        None => info!(
            model = model,
            status = status,
            duration_ms = duration_ms as u64,
            "turn complete"
        ),
    }
}
