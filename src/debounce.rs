//! Coalesces bursts of enqueued items into one acknowledgement per sender.
//!
//! Each sender has at most one open window. Every new item bumps the window's
//! generation and re-arms its timer under the same lock; a timer only fires if
//! its generation is still current, so a superseded timer can never send.

use crate::channel::ChannelClient;
use crate::db::{self, Pool};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

struct BatchWindow {
    count: u32,
    chat_id: i64,
    last_message_id: i32,
    generation: u64,
    timer: JoinHandle<()>,
}

struct Inner {
    pool: Pool,
    channel: Arc<dyn ChannelClient>,
    quiet: Duration,
    windows: Mutex<HashMap<i64, BatchWindow>>,
}

/// Cheap to clone; clones share the same windows.
#[derive(Clone)]
pub struct BatchDebouncer {
    inner: Arc<Inner>,
}

/// Text of the acknowledgement sent when a window closes.
pub fn batch_summary(added: u32, pending: i64) -> String {
    format!(
        "📥 <b>Batch Received!</b>\n\
         ━━━━━━━━━━━━━━━━━━\n\
         📎 <b>Added:</b> {} files\n\
         🔢 <b>Total in Queue:</b> {}",
        added, pending
    )
}

impl BatchDebouncer {
    pub fn new(pool: Pool, channel: Arc<dyn ChannelClient>, quiet: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                pool,
                channel,
                quiet,
                windows: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Record one enqueued item from `sender_id` and (re)start its quiet timer.
    pub async fn notify(&self, sender_id: i64, chat_id: i64, message_id: i32) {
        let mut windows = self.inner.windows.lock().await;
        match windows.get_mut(&sender_id) {
            Some(window) => {
                window.timer.abort();
                window.count += 1;
                window.chat_id = chat_id;
                window.last_message_id = message_id;
                window.generation += 1;
                window.timer = self.arm(sender_id, window.generation);
                debug!(sender_id, count = window.count, "batch window extended");
            }
            None => {
                let timer = self.arm(sender_id, 0);
                windows.insert(
                    sender_id,
                    BatchWindow {
                        count: 1,
                        chat_id,
                        last_message_id: message_id,
                        generation: 0,
                        timer,
                    },
                );
            }
        }
    }

    fn arm(&self, sender_id: i64, generation: u64) -> JoinHandle<()> {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep(inner.quiet).await;
            inner.fire(sender_id, generation).await;
        })
    }

    /// Number of senders with an open window.
    pub async fn open_windows(&self) -> usize {
        self.inner.windows.lock().await.len()
    }
}

impl Inner {
    async fn fire(&self, sender_id: i64, generation: u64) {
        let window = {
            let mut windows = self.windows.lock().await;
            let current = windows
                .get(&sender_id)
                .is_some_and(|w| w.generation == generation);
            if current {
                windows.remove(&sender_id)
            } else {
                None
            }
        };
        let Some(window) = window else {
            return;
        };

        let pending = match db::count_pending(&self.pool).await {
            Ok(n) => n,
            Err(err) => {
                warn!(?err, sender_id, "failed to count pending items for batch summary");
                return;
            }
        };
        let text = batch_summary(window.count, pending);
        if let Err(err) = self
            .channel
            .reply_text(window.chat_id, window.last_message_id, &text)
            .await
        {
            warn!(?err, sender_id, "failed to send batch summary");
        }
    }
}
