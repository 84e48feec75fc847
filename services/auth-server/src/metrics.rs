//! Prometheus metrics exposition
//!
//! - `auth_http_requests_total` (counter): labels `route`, `status`
//! - `auth_http_request_duration_seconds` (histogram): label `route`
//! - `auth_token_validations_total` (counter): label `result`
//! - `auth_token_exchanges_total` (counter): labels `grant_type`, `result`

use anyhow::Context;
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

const DURATION_METRIC: &str = "auth_http_request_duration_seconds";

/// Bucket boundaries from 1ms to 10s. Token and metadata requests are
/// local; authorize/callback include an IdP round trip.
const DURATION_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

fn builder() -> anyhow::Result<PrometheusBuilder> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Full(DURATION_METRIC.to_string()), DURATION_BUCKETS)
        .context("failed to set histogram buckets")
}

/// Install the global Prometheus recorder and return a handle for `/metrics`.
pub fn install_recorder() -> anyhow::Result<PrometheusHandle> {
    builder()?
        .install_recorder()
        .context("failed to install Prometheus recorder")
}

/// Record a completed HTTP request.
pub fn record_request(route: &str, status: u16, duration_secs: f64) {
    metrics::counter!(
        "auth_http_requests_total",
        "route" => route.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!(DURATION_METRIC, "route" => route.to_string()).record(duration_secs);
}

/// Record a bearer validation outcome: `valid`, `invalid` or `missing`.
pub fn record_token_validation(result: &'static str) {
    metrics::counter!("auth_token_validations_total", "result" => result).increment(1);
}

/// Record a `/token` exchange outcome.
pub fn record_token_exchange(grant_type: &str, result: &str) {
    metrics::counter!(
        "auth_token_exchanges_total",
        "grant_type" => grant_type.to_string(),
        "result" => result.to_string()
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_exporter_prometheus::PrometheusRecorder;

    /// Isolated recorder/handle pair; `install_recorder()` can only succeed
    /// once per process.
    fn isolated_recorder() -> (PrometheusRecorder, PrometheusHandle) {
        let recorder = builder().unwrap().build_recorder();
        let handle = recorder.handle();
        (recorder, handle)
    }

    #[test]
    fn record_functions_do_not_panic_without_recorder() {
        record_request("/token", 200, 0.01);
        record_token_validation("valid");
        record_token_exchange("authorization_code", "success");
    }

    #[test]
    fn request_counter_and_histogram_carry_route() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_request("/token", 200, 0.004);
        record_request("/authorize", 400, 0.002);

        let output = handle.render();
        assert!(output.contains("auth_http_requests_total"));
        assert!(output.contains("route=\"/token\""));
        assert!(output.contains("status=\"400\""));
        assert!(
            output.contains("auth_http_request_duration_seconds_bucket"),
            "histogram must render _bucket lines"
        );
        assert!(output.contains("le=\"0.001\""));
        assert!(output.contains("le=\"10\""));
    }

    #[test]
    fn token_counters_carry_labels() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_token_validation("invalid");
        record_token_exchange("refresh_token", "invalid_grant");

        let output = handle.render();
        assert!(output.contains("auth_token_validations_total{result=\"invalid\"} 1"));
        assert!(output.contains("grant_type=\"refresh_token\""));
        assert!(output.contains("result=\"invalid_grant\""));
    }
}
