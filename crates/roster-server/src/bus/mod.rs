//! Message bus adapter
//!
//! One Redis Streams consumer per change channel, each on its own task and
//! its own connection.

pub mod redis_stream;

use tokio::task::JoinHandle;
use tracing::error;

use roster_cache::RedisCoordinationStore;
use roster_common::ChangeChannel;
use roster_sync::EventRouter;

pub use redis_stream::{ConsumerSettings, Disposition, PAYLOAD_FIELD, ReadSchedule, StreamConsumer};

use crate::model::config::Configuration;
use crate::startup::ShutdownSignal;

/// Start a consumer task for every channel.
pub async fn spawn_consumers(
    configuration: &Configuration,
    coordination: &RedisCoordinationStore,
    router: EventRouter,
    shutdown: &ShutdownSignal,
) -> anyhow::Result<Vec<JoinHandle<()>>> {
    let settings = configuration.consumer_settings();
    let mut handles = Vec::with_capacity(ChangeChannel::ALL.len());
    for channel in ChangeChannel::ALL {
        let conn = coordination.dedicated_connection().await?;
        let consumer = StreamConsumer::new(
            channel,
            configuration.stream_name(channel),
            settings.clone(),
            conn,
            router.clone(),
        );
        let shutdown_rx = shutdown.subscribe();
        handles.push(tokio::spawn(async move {
            if let Err(e) = consumer.run(shutdown_rx).await {
                error!(%channel, error = %e, "Stream consumer failed");
            }
        }));
    }
    Ok(handles)
}
