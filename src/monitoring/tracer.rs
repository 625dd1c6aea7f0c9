/*!
 * Structured Tracing
 * Subscriber setup and spans for job control operations
 *
 * Features:
 * - Operation IDs for correlating per-pid log lines of one control call
 * - JSON-formatted logs for structured parsing
 * - Env-filter driven verbosity
 */

use tracing::{info, span, Level, Span};
use tracing_subscriber::{
    fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};
use uuid::Uuid;

/// Initialize structured tracing
///
/// Environment variables:
/// - RUST_LOG: Set log level (default: info)
///
/// `json` selects machine-readable output (see `SUPERVISOR_TRACE_JSON`).
/// Calling this twice is harmless: the second install is ignored.
pub fn init_tracing(json: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);

    let installed = if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .compact(),
            )
            .try_init()
    };

    if installed.is_ok() {
        info!(json, "Structured tracing initialized");
    }
}

/// Generate a unique operation ID for log correlation
pub fn generate_op_id() -> String {
    Uuid::new_v4().to_string()
}

/// Span wrapping one pause/resume/terminate call
///
/// `outcomes` and `result` are recorded once the call completes.
pub fn control_span(operation: &'static str, pid: u32) -> Span {
    let op_id = generate_op_id();
    span!(
        Level::INFO,
        "control",
        op = operation,
        op_id = %op_id,
        pid = pid,
        outcomes = tracing::field::Empty,
        result = tracing::field::Empty,
    )
}

/// Record the aggregate result of a control call on its span
pub fn record_control_result(span: &Span, outcomes: usize, success: bool) {
    span.record("outcomes", outcomes);
    span.record("result", if success { "success" } else { "error" });
}
