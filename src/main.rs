// Main entry point - Dependency injection and scheduler startup
mod application;
mod domain;
mod infrastructure;
mod presentation;

use std::sync::Arc;

use crate::application::aggregator::TrackAggregator;
use crate::application::scheduler::RefreshScheduler;
use crate::infrastructure::config::{load_dashboard_config, load_source_config};
use crate::infrastructure::influx_source::InfluxSource;
use crate::presentation::json_sink::JsonRenderSink;
use tokio::sync::Mutex;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    // Load configuration
    let source_config = load_source_config()?;
    let dashboard_config = load_dashboard_config()?;

    // Create the source adapter (infrastructure layer)
    let source = Arc::new(InfluxSource::new(
        source_config.influx.url,
        source_config.influx.token,
        source_config.influx.org,
        source_config.influx.bucket,
    ));

    // One aggregator per process; both view cycles serialize through it
    let aggregator = Arc::new(Mutex::new(TrackAggregator::new(
        dashboard_config.tracks.palette.clone(),
        dashboard_config.tracks.retention()?,
    )));

    // Render sink (presentation layer)
    let sink = Arc::new(JsonRenderSink::stdout(
        dashboard_config.viewport.viewport(),
    ));

    let scheduler = RefreshScheduler::new(source, sink, aggregator, dashboard_config);

    tracing::info!("fleet-dashboard refresh loop starting");
    tokio::select! {
        _ = scheduler.run() => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down");
        }
    }

    Ok(())
}
