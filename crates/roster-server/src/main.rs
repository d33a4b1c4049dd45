//! Main entry point for the Roster sync server.

use roster_server::{
    bus,
    model::config::Configuration,
    startup::{self, Services},
};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let configuration = Configuration::new()?;

    let _logging_guard = startup::init_logging(&configuration.logging_config())?;

    roster_sync::metrics::init_metrics();

    let Services {
        router,
        coordination,
    } = startup::build_services(&configuration).await?;

    let shutdown = startup::wait_for_shutdown_signal();
    let consumers = bus::spawn_consumers(&configuration, &coordination, router, &shutdown).await?;
    info!(consumers = consumers.len(), "Roster sync server started");

    startup::drain_on_shutdown(&shutdown, consumers, configuration.shutdown_timeout()).await;

    Ok(())
}
