// src/metrics.rs
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

/// One-time metrics registration (so series show up on /metrics).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("poll_cycles_total", "Completed polling cycles.");
        describe_counter!("poll_failures_total", "Cycles aborted by auth/fetch errors.");
        describe_counter!(
            "survey_records_skipped_total",
            "Malformed survey records skipped during a fetch."
        );
        describe_counter!("change_events_total", "Change events produced by diffing.");
        describe_counter!("notify_delivered_total", "Successful subscriber deliveries.");
        describe_counter!("notify_failed_total", "Failed subscriber deliveries.");
        describe_gauge!("poll_last_success_ts", "Unix ts of the last successful cycle.");
        describe_gauge!("surveys_active", "Surveys present in the latest snapshot.");
    });
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Initialize the Prometheus recorder. Call once at startup.
    pub fn init() -> Self {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .expect("prometheus: install recorder");
        ensure_metrics_described();
        Self { handle }
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
