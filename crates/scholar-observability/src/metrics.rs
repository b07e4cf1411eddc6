//! Prometheus metrics.
//!
//! The recorder is process-global. The HTTP layer and the fan-out emit
//! through the `metrics` macros; `/metrics` renders the handle returned by
//! [`install_prometheus`].

use metrics::{describe_counter, describe_gauge, describe_histogram, gauge};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

use crate::ObservabilityError;

/// Latency buckets for `*_duration_seconds` histograms.
const LATENCY_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Installs the Prometheus recorder and describes Scholar's metrics.
pub fn install_prometheus() -> Result<PrometheusHandle, ObservabilityError> {
    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Suffix("duration_seconds".to_string()),
            LATENCY_BUCKETS,
        )
        .map_err(|e| ObservabilityError::Recorder(e.to_string()))?
        .install_recorder()
        .map_err(|e| ObservabilityError::Recorder(e.to_string()))?;

    describe_metrics();
    Ok(handle)
}

/// Registers metric descriptions with the installed recorder.
pub fn describe_metrics() {
    describe_counter!(
        "scholar_http_requests_total",
        "HTTP requests served, by method and status"
    );
    describe_histogram!(
        "scholar_http_request_duration_seconds",
        "HTTP request latency in seconds, by route"
    );
    describe_counter!(
        "scholar_access_denied_total",
        "Requests rejected by a role guard"
    );
    describe_counter!(
        "scholar_notifications_created_total",
        "Notifications written by fan-out"
    );
    describe_counter!(
        "scholar_notification_fanout_failures_total",
        "Fan-outs that failed after their triggering write"
    );
    describe_gauge!(
        "scholar_db_pool_size",
        "Connections currently held by the database pool"
    );
    describe_gauge!(
        "scholar_db_pool_idle",
        "Idle connections in the database pool"
    );
}

/// Publishes database pool occupancy.
pub fn record_pool_stats(size: u32, idle: usize) {
    gauge!("scholar_db_pool_size").set(f64::from(size));
    gauge!("scholar_db_pool_idle").set(idle as f64);
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics::counter;

    #[test]
    fn test_recorded_metrics_render() {
        let recorder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                LATENCY_BUCKETS,
            )
            .unwrap()
            .build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            describe_metrics();
            counter!("scholar_http_requests_total", "method" => "GET", "status" => "200")
                .increment(2);
            record_pool_stats(4, 3);
        });

        let rendered = handle.render();
        assert!(rendered.contains("scholar_http_requests_total{method=\"GET\",status=\"200\"} 2"));
        assert!(rendered.contains("scholar_db_pool_size 4"));
        assert!(rendered.contains("scholar_db_pool_idle 3"));
    }
}
