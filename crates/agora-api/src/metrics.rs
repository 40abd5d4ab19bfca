//! Prometheus metrics
//!
//! Collectors register with the default registry on first use; `/metrics`
//! renders everything in the text exposition format.

use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, register_int_gauge,
    Encoder, HistogramVec, IntCounter, IntCounterVec, IntGauge, TextEncoder,
};

lazy_static! {
    // HTTP
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "agora_http_requests_total",
        "HTTP requests by endpoint and status",
        &["endpoint", "status"]
    )
    .expect("Failed to register HTTP requests counter");

    pub static ref HTTP_REQUEST_DURATION: HistogramVec = register_histogram_vec!(
        "agora_http_request_duration_seconds",
        "HTTP request latency in seconds",
        &["endpoint"]
    )
    .expect("Failed to register HTTP latency histogram");

    pub static ref UPTIME_SECONDS: IntGauge = register_int_gauge!(
        "agora_uptime_seconds",
        "Time since server start"
    )
    .expect("Failed to register uptime gauge");

    // Sessions
    pub static ref SESSIONS_ISSUED_TOTAL: IntCounter = register_int_counter!(
        "agora_sessions_issued_total",
        "Refresh-token sessions created by register, login and federated sign-in"
    )
    .expect("Failed to register sessions issued counter");

    pub static ref SESSION_ROTATIONS_TOTAL: IntCounter = register_int_counter!(
        "agora_session_rotations_total",
        "Successful refresh-token rotations"
    )
    .expect("Failed to register session rotations counter");

    pub static ref REPLAY_SWEEPS_TOTAL: IntCounter = register_int_counter!(
        "agora_refresh_replay_sweeps_total",
        "Inactive refresh tokens presented, each revoking every session of the account"
    )
    .expect("Failed to register replay sweeps counter");

    pub static ref SESSIONS_REVOKED_TOTAL: IntCounter = register_int_counter!(
        "agora_sessions_revoked_total",
        "Sessions removed by replay sweeps"
    )
    .expect("Failed to register revoked sessions counter");

    pub static ref LOGOUTS_TOTAL: IntCounter = register_int_counter!(
        "agora_logouts_total",
        "Logout requests that passed token verification"
    )
    .expect("Failed to register logouts counter");

    pub static ref SESSIONS_PURGED_TOTAL: IntCounter = register_int_counter!(
        "agora_sessions_purged_total",
        "Expired sessions removed by the background purge"
    )
    .expect("Failed to register purged sessions counter");

    pub static ref AUTH_FAILURES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "agora_auth_failures_total",
        "Rejected authentication attempts by operation",
        &["operation"]
    )
    .expect("Failed to register auth failures counter");
}

/// Render all registered metrics in Prometheus text format
pub fn render() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&prometheus::gather(), &mut buffer)?;

    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_includes_touched_collectors() {
        SESSIONS_ISSUED_TOTAL.inc();
        AUTH_FAILURES_TOTAL.with_label_values(&["refresh"]).inc();

        let output = render().unwrap();
        assert!(output.contains("agora_sessions_issued_total"));
        assert!(output.contains("agora_auth_failures_total{operation=\"refresh\"}"));
    }
}
