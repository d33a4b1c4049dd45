//! Redis Streams consumer for one change channel
//!
//! Entries are read through a consumer group with `XREADGROUP`. An entry is
//! acknowledged once the router applied it; a failed entry stays in the
//! pending list. When the redelivery interval has elapsed the whole pending
//! list is paged through, starting at id `0` and continuing after the last id
//! returned until a read comes back empty. Envelopes are stored in the entry
//! field `payload`.

use std::time::{Duration, Instant};

use anyhow::Context;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use redis::streams::{StreamId, StreamReadOptions, StreamReadReply};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use roster_common::{ChangeChannel, Result as SyncResult, SyncError};
use roster_sync::EventRouter;

/// Entry field holding the JSON envelope
pub const PAYLOAD_FIELD: &str = "payload";

const READ_NEW: &str = ">";
const READ_PENDING: &str = "0";
const READ_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Settings shared by all stream consumers of a process
#[derive(Debug, Clone)]
pub struct ConsumerSettings {
    pub group: String,
    pub consumer: String,
    /// Maximum entries per read
    pub batch_size: usize,
    /// How long a read for new entries blocks
    pub block: Duration,
    /// How often pending (failed) entries are read again
    pub redelivery_interval: Duration,
    /// Acknowledge entries whose failure redelivery cannot fix
    pub discard_malformed: bool,
}

/// What to do with an entry after handling it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Ack,
    /// Acknowledge without applying
    Discard,
    /// Leave pending for redelivery
    Retain,
}

impl Disposition {
    pub fn of(result: &SyncResult<()>, discard_malformed: bool) -> Self {
        match result {
            Ok(()) => Disposition::Ack,
            Err(e) if discard_malformed && !e.is_retryable() => Disposition::Discard,
            Err(_) => Disposition::Retain,
        }
    }
}

/// Alternates between new entries and passes over the pending backlog
#[derive(Debug)]
pub struct ReadSchedule {
    interval: Duration,
    next_pending: Instant,
    /// Resume point of the pass in progress
    pending_after: Option<String>,
}

impl ReadSchedule {
    /// The backlog is read first, picking up entries left pending by a
    /// previous run of this consumer.
    pub fn new(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            next_pending: now,
            pending_after: None,
        }
    }

    /// Id to pass to the next `XREADGROUP`.
    pub fn next_id(&mut self, now: Instant) -> String {
        if let Some(after) = &self.pending_after {
            return after.clone();
        }
        if now >= self.next_pending {
            self.next_pending = now + self.interval;
            self.pending_after = Some(READ_PENDING.to_string());
            READ_PENDING.to_string()
        } else {
            READ_NEW.to_string()
        }
    }

    /// Record the last entry id a read for `id` returned.
    pub fn advance(&mut self, id: &str, last: Option<&str>) {
        if id == READ_NEW {
            return;
        }
        self.pending_after = last.map(str::to_string);
    }
}

/// `BLOCK` argument for `timeout`, saturating instead of wrapping
fn block_millis(timeout: Duration) -> usize {
    usize::try_from(timeout.as_millis()).unwrap_or(usize::MAX)
}

pub struct StreamConsumer {
    channel: ChangeChannel,
    stream: String,
    settings: ConsumerSettings,
    conn: ConnectionManager,
    router: EventRouter,
}

impl StreamConsumer {
    pub fn new(
        channel: ChangeChannel,
        stream: String,
        settings: ConsumerSettings,
        conn: ConnectionManager,
        router: EventRouter,
    ) -> Self {
        Self {
            channel,
            stream,
            settings,
            conn,
            router,
        }
    }

    /// Create the consumer group (and the stream) if missing.
    pub async fn ensure_group(&mut self) -> anyhow::Result<()> {
        let created: redis::RedisResult<()> = self
            .conn
            .xgroup_create_mkstream(&self.stream, &self.settings.group, "0")
            .await;
        match created {
            Ok(()) => {
                info!(stream = %self.stream, group = %self.settings.group, "Consumer group created");
                Ok(())
            }
            Err(e) if e.code() == Some("BUSYGROUP") => Ok(()),
            Err(e) => Err(e).with_context(|| format!("create consumer group on {}", self.stream)),
        }
    }

    /// Consume until shutdown. The entry being handled when the signal
    /// arrives is finished first.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) -> anyhow::Result<()> {
        self.ensure_group().await?;
        info!(
            channel = %self.channel,
            stream = %self.stream,
            consumer = %self.settings.consumer,
            "Stream consumer started"
        );

        let mut schedule = ReadSchedule::new(self.settings.redelivery_interval, Instant::now());
        loop {
            let id = schedule.next_id(Instant::now());
            let reply = tokio::select! {
                _ = shutdown.recv() => break,
                reply = self.read(&id) => reply,
            };

            let entries = match reply {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(stream = %self.stream, error = %e, "Stream read failed");
                    tokio::time::sleep(READ_ERROR_BACKOFF).await;
                    continue;
                }
            };

            schedule.advance(&id, entries.last().map(|entry| entry.id.as_str()));
            for entry in entries {
                self.process(entry).await;
            }
        }

        info!(channel = %self.channel, "Stream consumer stopped");
        Ok(())
    }

    async fn read(&mut self, id: &str) -> anyhow::Result<Vec<StreamId>> {
        let mut opts = StreamReadOptions::default()
            .group(&self.settings.group, &self.settings.consumer)
            .count(self.settings.batch_size);
        if id == READ_NEW {
            opts = opts.block(block_millis(self.settings.block));
        }

        let reply: Option<StreamReadReply> = self
            .conn
            .xread_options(&[self.stream.as_str()], &[id], &opts)
            .await
            .with_context(|| format!("XREADGROUP {}", self.stream))?;

        Ok(reply
            .map(|reply| reply.keys.into_iter().flat_map(|key| key.ids).collect())
            .unwrap_or_default())
    }

    async fn process(&mut self, entry: StreamId) {
        let result = match entry.get::<Vec<u8>>(PAYLOAD_FIELD) {
            Some(payload) => self.router.handle(self.channel, &payload).await,
            None => Err(SyncError::decode(
                self.channel,
                format!("entry has no `{PAYLOAD_FIELD}` field"),
            )),
        };

        match Disposition::of(&result, self.settings.discard_malformed) {
            Disposition::Ack => {
                debug!(stream = %self.stream, id = %entry.id, "Entry applied");
                self.ack(&entry.id).await;
            }
            Disposition::Discard => {
                warn!(stream = %self.stream, id = %entry.id, "Discarding malformed entry");
                self.ack(&entry.id).await;
            }
            Disposition::Retain => {
                debug!(stream = %self.stream, id = %entry.id, "Entry left pending for redelivery");
            }
        }
    }

    async fn ack(&mut self, id: &str) {
        let acked: redis::RedisResult<i64> = self
            .conn
            .xack(&self.stream, &self.settings.group, &[id])
            .await;
        // An unacknowledged entry is redelivered and applied again, which is safe
        if let Err(e) = acked {
            warn!(stream = %self.stream, id, error = %e, "XACK failed");
        }
    }
}
