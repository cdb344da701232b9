//! Sponsor relay service binary.

use std::sync::Arc;

use clap::Parser;
use quarry_core::logger::init_logger;
use quarry_sponsor_rpc::{AppContext, Config, Dispatcher, metrics::init_prometheus_exporter, router, setup};
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::parse();

    init_logger(&config.log_level, config.log_format);

    init_prometheus_exporter(config.metrics_addr)?;

    info!(
        message = "Starting sponsor service",
        address = %config.address,
        port = config.port,
        rpc_url = %config.rpc_url,
        bundler_url = %config.bundler_url(),
        paymaster = %config.paymaster_address,
        entry_point_version = ?config.entry_point_version,
        namespace = config.namespace.as_deref().unwrap_or("<none>"),
        low_latency_rewrites = config.low_latency_rewrites,
        metrics_address = %config.metrics_addr,
    );

    let context = AppContext::from_config(&config).await?;

    if config.skip_setup {
        info!(message = "Skipping setup");
    } else {
        setup::run(&context).await?;
    }

    let app = router(Dispatcher::new(Arc::new(context)));
    let listener = TcpListener::bind(config.bind_addr()).await?;

    info!(message = "Sponsor server started", address = %listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
