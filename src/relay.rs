//! The single consumer draining the work queue into the destination chat.

use crate::caption;
use crate::channel::{ChannelClient, DeliveryError};
use crate::db::{self, Pool};
use crate::model::{QueueItem, SenderStats, SettingKey, MIN_DELAY_SECONDS};
use anyhow::Result;
use chrono::{FixedOffset, NaiveDate, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// Timings and routing for the worker.
#[derive(Debug, Clone)]
pub struct RelayOptions {
    pub destination: i64,
    pub poll_interval: Duration,
    pub error_cooldown: Duration,
    pub zone: FixedOffset,
}

/// Result of one step of the worker's state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Paused,
    Idle,
    Delivered { id: i64, delay: Duration },
    /// Delivery failed permanently; the item was marked sent without arriving.
    Abandoned { id: i64, delay: Duration },
    RateLimited { id: i64, retry_after: Duration },
}

impl CycleOutcome {
    /// How long the loop sleeps before the next cycle.
    pub fn sleep_for(&self, poll_interval: Duration) -> Duration {
        match self {
            CycleOutcome::Paused | CycleOutcome::Idle => poll_interval,
            CycleOutcome::Delivered { delay, .. } | CycleOutcome::Abandoned { delay, .. } => *delay,
            CycleOutcome::RateLimited { retry_after, .. } => *retry_after,
        }
    }
}

/// Progress message sent to the sender after each delivery.
pub fn progress_report(
    sent_batch: i64,
    batch_total: i64,
    pending: i64,
    stats: &SenderStats,
    delay_secs: u64,
) -> String {
    format!(
        "✅ <b>Video Sent :</b> {}/{}\n\
         ⏳ <b>Total in Queue :</b> {}\n\
         📅 <b>Total Sent Today :</b> {}\n\
         📈 <b>Total Sent Lifetime :</b> {}\n\
         ⏲ <b>Current Delay :</b> {}s",
        sent_batch, batch_total, pending, stats.sent_today, stats.sent_lifetime, delay_secs
    )
}

pub struct RelayWorker {
    pool: Pool,
    channel: Arc<dyn ChannelClient>,
    options: RelayOptions,
    /// Items delivered since the queue was last empty.
    session_sent: i64,
    /// Caption already composed for an item waiting out a rate limit.
    held_caption: Option<(i64, String)>,
}

impl RelayWorker {
    pub fn new(pool: Pool, channel: Arc<dyn ChannelClient>, options: RelayOptions) -> Self {
        Self {
            pool,
            channel,
            options,
            session_sent: 0,
            held_caption: None,
        }
    }

    pub fn session_sent(&self) -> i64 {
        self.session_sent
    }

    /// Run forever. A failing cycle is logged and followed by a cooldown.
    pub async fn run(mut self) {
        info!(destination = self.options.destination, "relay worker started");
        loop {
            let pause = match self.run_cycle().await {
                Ok(outcome) => outcome.sleep_for(self.options.poll_interval),
                Err(err) => {
                    error!(?err, "relay worker error");
                    self.options.error_cooldown
                }
            };
            tokio::time::sleep(pause).await;
        }
    }

    /// Perform one step: check pause, take the oldest pending item, deliver it.
    #[instrument(skip_all)]
    pub async fn run_cycle(&mut self) -> Result<CycleOutcome> {
        if db::get_flag(&self.pool, SettingKey::Paused).await? {
            return Ok(CycleOutcome::Paused);
        }

        let Some(item) = db::peek_oldest_pending(&self.pool).await? else {
            if self.session_sent > 0 {
                debug!(sent = self.session_sent, "queue drained");
            }
            self.session_sent = 0;
            self.held_caption = None;
            return Ok(CycleOutcome::Idle);
        };

        let delay = self.current_delay().await?;
        let caption = self.caption_for(&item).await?;

        let res = self
            .channel
            .copy_message(self.options.destination, item.sender_id, item.message_id, &caption)
            .await;

        match res {
            Ok(()) => {
                self.held_caption = None;
                self.on_delivered(&item, delay).await?;
                Ok(CycleOutcome::Delivered { id: item.id, delay })
            }
            Err(DeliveryError::RateLimited { retry_after }) => {
                warn!(id = item.id, ?retry_after, "flood limit hit; retrying same item");
                self.held_caption = Some((item.id, caption));
                Ok(CycleOutcome::RateLimited {
                    id: item.id,
                    retry_after,
                })
            }
            Err(DeliveryError::Rejected(reason)) => {
                self.held_caption = None;
                error!(id = item.id, sender_id = item.sender_id, %reason, "delivery failed; dropping item");
                db::mark_sent(&self.pool, item.id).await?;
                Ok(CycleOutcome::Abandoned { id: item.id, delay })
            }
        }
    }

    async fn current_delay(&self) -> Result<Duration> {
        let secs = match db::get_int(&self.pool, SettingKey::Delay).await? {
            Some(secs) => secs.max(0),
            None => {
                warn!("stored delay is not a number; using minimum");
                MIN_DELAY_SECONDS
            }
        };
        Ok(Duration::from_secs(secs as u64))
    }

    /// Reuse the caption of an item that was rate limited, otherwise compose.
    async fn caption_for(&mut self, item: &QueueItem) -> Result<String> {
        match self.held_caption.take() {
            Some((id, caption)) if id == item.id => Ok(caption),
            _ => caption::compose(&self.pool).await,
        }
    }

    fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.options.zone).date_naive()
    }

    async fn on_delivered(&mut self, item: &QueueItem, delay: Duration) -> Result<()> {
        db::mark_delivered(&self.pool, item.id).await?;
        let stats = db::record_delivery(&self.pool, item.sender_id, self.today()).await?;
        self.session_sent += 1;
        info!(id = item.id, sender_id = item.sender_id, kind = item.media_kind.as_str(), "relayed item");

        let pending = db::count_pending(&self.pool).await?;
        let report = progress_report(
            self.session_sent,
            self.session_sent + pending,
            pending,
            &stats,
            delay.as_secs(),
        );
        if let Err(err) = self.channel.send_text(item.sender_id, &report).await {
            warn!(?err, sender_id = item.sender_id, "failed to send progress report");
        }
        if let Err(err) = self
            .channel
            .delete_message(item.sender_id, item.message_id)
            .await
        {
            debug!(?err, id = item.id, "could not delete original message");
        }
        Ok(())
    }
}
