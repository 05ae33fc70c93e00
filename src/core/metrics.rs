use std::sync::OnceLock;

use metrics::{describe_counter, describe_histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::core::config::Settings;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub(crate) fn init(settings: &Settings) -> anyhow::Result<()> {
    if !settings.telemetry().prometheus_enabled {
        return Ok(());
    }

    if PROM_HANDLE.get().is_none() {
        let handle = PrometheusBuilder::new().install_recorder()?;
        let _ = PROM_HANDLE.set(handle);
        describe();
    }

    Ok(())
}

pub(crate) fn render() -> Option<String> {
    PROM_HANDLE.get().map(|handle| handle.render())
}

fn describe() {
    describe_counter!("http_requests_total", "HTTP responses by status code");
    describe_histogram!("http_request_duration_seconds", Unit::Seconds, "HTTP request latency");
    describe_counter!(
        "assignments_expired_total",
        "Assignments moved to expired by the sweep or a lazy check"
    );
    describe_counter!("assignments_submitted_total", "Assignments finalized by a submit");
    describe_counter!("submissions_recovered_total", "Ungraded submissions scored by the worker");
    describe_counter!("code_runner_failures_total", "Runner batches that degraded to failures");
    describe_histogram!("code_runner_batch_seconds", Unit::Seconds, "Runner batch latency");
    describe_counter!("result_emails_failed_total", "Notification deliveries that failed");
}
