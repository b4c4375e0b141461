//! Short-lived captions typed as plain text right before a media item.
//!
//! Entries live only in memory and expire after a fixed window.

use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone)]
struct StagedCaption {
    text: String,
    staged_at: Instant,
}

/// Per-sender caption stage. At most one live entry per sender.
#[derive(Debug)]
pub struct CaptionStaging {
    window: Duration,
    entries: Mutex<HashMap<i64, StagedCaption>>,
}

impl CaptionStaging {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Stage `text` for `sender_id`, replacing any earlier stage.
    pub async fn stage(&self, sender_id: i64, text: &str) {
        let mut entries = self.entries.lock().await;
        entries.insert(
            sender_id,
            StagedCaption {
                text: text.to_string(),
                staged_at: Instant::now(),
            },
        );
    }

    /// Remove the sender's stage and return its text if it is still fresh.
    /// Stale entries are dropped without being returned.
    pub async fn try_consume(&self, sender_id: i64) -> Option<String> {
        let staged = self.entries.lock().await.remove(&sender_id)?;
        let age = staged.staged_at.elapsed();
        if age < self.window {
            Some(staged.text)
        } else {
            debug!(sender_id, ?age, "discarding stale staged caption");
            None
        }
    }

    /// Drop every expired entry.
    pub async fn purge_expired(&self) {
        let window = self.window;
        self.entries
            .lock()
            .await
            .retain(|_, staged| staged.staged_at.elapsed() < window);
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}
