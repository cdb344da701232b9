use std::net::SocketAddr;

use metrics::{Counter, Histogram};
use metrics_derive::Metrics;
use metrics_exporter_prometheus::PrometheusBuilder;

/// Metrics for the `quarry_sponsor_rpc` component.
/// Durations are recorded in seconds.
#[derive(Metrics, Clone)]
#[metrics(scope = "quarry_sponsor_rpc")]
pub struct Metrics {
    #[metric(describe = "Number of operations received")]
    pub requests: Counter,

    #[metric(describe = "Number of operations that failed validation or execution")]
    pub failures: Counter,

    #[metric(describe = "Duration of a handler from dispatch to result")]
    pub handler_duration: Histogram,

    #[metric(describe = "Duration of submitting a user operation and waiting for its receipt")]
    pub relay_duration: Histogram,
}

/// Serves the Prometheus scrape endpoint on `addr`.
pub fn init_prometheus_exporter(addr: SocketAddr) -> anyhow::Result<()> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    Ok(())
}
