//! Prometheus recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the global Prometheus recorder.
///
/// Call once at startup, before anything records a metric.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    describe();
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

fn describe() {
    metrics::describe_counter!(ADMISSION_DECISIONS_TOTAL, "Admission checks by outcome");
    metrics::describe_counter!(SCREENING_REJECTIONS_TOTAL, "Messages refused by screening");
    metrics::describe_counter!(SCREENING_FLAGS_TOTAL, "Messages flagged for monitoring");
    metrics::describe_counter!(RELAY_OUTCOMES_TOTAL, "Relays by terminal state");
    metrics::describe_histogram!(RELAY_TOKENS, "Tokens forwarded per relay");
    metrics::describe_counter!(SUMMARIZATION_ENQUEUED_TOTAL, "Summarization requests queued");
    metrics::describe_counter!(SUMMARIES_TOTAL, "Summarization worker results");
    metrics::describe_counter!(HTTP_ERRORS_TOTAL, "Error responses by reason code");
}

// Metric names recorded across crates.

/// Admission checks (counter, labels: outcome, window).
pub const ADMISSION_DECISIONS_TOTAL: &str = "admission_decisions_total";
/// Screening rejections (counter, labels: reason).
pub const SCREENING_REJECTIONS_TOTAL: &str = "screening_rejections_total";
/// Screening flags (counter).
pub const SCREENING_FLAGS_TOTAL: &str = "screening_flags_total";
/// Relay terminal states (counter, labels: outcome).
pub const RELAY_OUTCOMES_TOTAL: &str = "relay_outcomes_total";
/// Tokens per relay (histogram).
pub const RELAY_TOKENS: &str = "relay_tokens";
/// Summarization requests queued (counter).
pub const SUMMARIZATION_ENQUEUED_TOTAL: &str = "summarization_enqueued_total";
/// Summarization enqueue failures (counter, labels: reason).
pub const SUMMARIZATION_ENQUEUE_FAILURES_TOTAL: &str = "summarization_enqueue_failures_total";
/// Summarization worker results (counter, labels: outcome).
pub const SUMMARIES_TOTAL: &str = "summaries_total";
/// Error responses (counter, labels: code).
pub const HTTP_ERRORS_TOTAL: &str = "http_errors_total";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_without_global_install() {
        let handle = PrometheusBuilder::new().build_recorder().handle();
        let output = handle.render();
        assert!(output.is_empty() || output.contains('\n'));
    }

    #[test]
    fn metric_names_are_snake_case() {
        for name in [
            ADMISSION_DECISIONS_TOTAL,
            SCREENING_REJECTIONS_TOTAL,
            SCREENING_FLAGS_TOTAL,
            RELAY_OUTCOMES_TOTAL,
            RELAY_TOKENS,
            SUMMARIZATION_ENQUEUED_TOTAL,
            SUMMARIZATION_ENQUEUE_FAILURES_TOTAL,
            SUMMARIES_TOTAL,
            HTTP_ERRORS_TOTAL,
        ] {
            assert!(name.chars().all(|c| c.is_ascii_lowercase() || c == '_'), "{name}");
        }
    }
}
