//! Prometheus metrics recorder.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Installs the global Prometheus recorder and returns the render handle.
///
/// The handle is stored in the API state; `/metrics` renders it on
/// demand. Returns `None` when a recorder is already installed (e.g. in
/// tests that build several servers in one process).
pub fn install_prometheus_recorder() -> Option<PrometheusHandle> {
    PrometheusBuilder::new().install_recorder().ok()
}

/// Metric names emitted by the API, kept in one place so dashboards and
/// code do not drift apart.
pub mod names {
    pub const QUEUE_TOKENS_ISSUED: &str = "gatepass_queue_tokens_issued_total";
    pub const QUEUE_TOKENS_CLOSED: &str = "gatepass_queue_tokens_closed_total";
    pub const TRANSACTIONS_CREATED: &str = "gatepass_transactions_created_total";
    pub const PASSES_ISSUED: &str = "gatepass_passes_issued_total";
    pub const WS_CONNECTIONS: &str = "gatepass_ws_connections";
    pub const LOGIN_FAILURES: &str = "gatepass_login_failures_total";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_install_returns_none_instead_of_panicking() {
        let first = install_prometheus_recorder();
        let second = install_prometheus_recorder();
        if first.is_some() {
            assert!(second.is_none());
        }
    }

    #[test]
    fn metric_names_are_prefixed() {
        for name in [
            names::QUEUE_TOKENS_ISSUED,
            names::QUEUE_TOKENS_CLOSED,
            names::TRANSACTIONS_CREATED,
            names::PASSES_ISSUED,
            names::WS_CONNECTIONS,
            names::LOGIN_FAILURES,
        ] {
            assert!(name.starts_with("gatepass_"));
        }
    }
}
