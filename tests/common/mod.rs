#![allow(dead_code)]

use anyhow::{anyhow, Result};
use chrono::FixedOffset;
use sqlx::sqlite::SqlitePoolOptions;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tg_relaybot::channel::{ChannelClient, DeliveryError, Profile};
use tg_relaybot::db;
use tg_relaybot::relay::{RelayOptions, RelayWorker};
use tokio::sync::Mutex;

pub const DESTINATION: i64 = -100_200;

pub async fn setup_pool() -> sqlx::SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    db::seed_default_settings(&pool).await.unwrap();
    pool
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyCall {
    pub destination: i64,
    pub source_chat: i64,
    pub message_id: i32,
    pub caption: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyCall {
    pub chat_id: i64,
    pub reply_to: i32,
    pub text: String,
}

/// Records every call; copy results are scripted and default to success.
#[derive(Clone, Default)]
pub struct RecordingChannel {
    copy_responses: Arc<Mutex<VecDeque<Result<(), DeliveryError>>>>,
    pub copies: Arc<Mutex<Vec<CopyCall>>>,
    pub texts: Arc<Mutex<Vec<(i64, String)>>>,
    pub replies: Arc<Mutex<Vec<ReplyCall>>>,
    pub deletes: Arc<Mutex<Vec<(i64, i32)>>>,
    pub profiles: Arc<Mutex<Vec<(i64, Profile)>>>,
}

impl RecordingChannel {
    pub fn with_copy_responses(responses: Vec<Result<(), DeliveryError>>) -> Self {
        Self {
            copy_responses: Arc::new(Mutex::new(VecDeque::from(responses))),
            ..Default::default()
        }
    }

    pub async fn add_profile(&self, user_id: i64, display_name: &str, username: Option<&str>) {
        self.profiles.lock().await.push((
            user_id,
            Profile {
                display_name: display_name.to_string(),
                username: username.map(str::to_string),
            },
        ));
    }

    pub async fn copies(&self) -> Vec<CopyCall> {
        self.copies.lock().await.clone()
    }

    pub async fn texts(&self) -> Vec<(i64, String)> {
        self.texts.lock().await.clone()
    }

    pub async fn replies(&self) -> Vec<ReplyCall> {
        self.replies.lock().await.clone()
    }

    pub async fn deletes(&self) -> Vec<(i64, i32)> {
        self.deletes.lock().await.clone()
    }
}

#[async_trait::async_trait]
impl ChannelClient for RecordingChannel {
    async fn copy_message(
        &self,
        destination: i64,
        source_chat: i64,
        message_id: i32,
        caption: &str,
    ) -> Result<(), DeliveryError> {
        self.copies.lock().await.push(CopyCall {
            destination,
            source_chat,
            message_id,
            caption: caption.to_string(),
        });
        self.copy_responses.lock().await.pop_front().unwrap_or(Ok(()))
    }

    async fn send_text(&self, chat_id: i64, text: &str) -> Result<()> {
        self.texts.lock().await.push((chat_id, text.to_string()));
        Ok(())
    }

    async fn reply_text(&self, chat_id: i64, reply_to: i32, text: &str) -> Result<()> {
        self.replies.lock().await.push(ReplyCall {
            chat_id,
            reply_to,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn delete_message(&self, chat_id: i64, message_id: i32) -> Result<()> {
        self.deletes.lock().await.push((chat_id, message_id));
        Ok(())
    }

    async fn resolve_profile(&self, user_id: i64) -> Result<Profile> {
        self.profiles
            .lock()
            .await
            .iter()
            .find(|(id, _)| *id == user_id)
            .map(|(_, p)| p.clone())
            .ok_or_else(|| anyhow!("chat not found"))
    }
}

pub fn zone() -> FixedOffset {
    FixedOffset::east_opt(6 * 3600).unwrap()
}

pub fn worker(pool: &sqlx::SqlitePool, channel: &RecordingChannel) -> RelayWorker {
    RelayWorker::new(
        pool.clone(),
        Arc::new(channel.clone()),
        RelayOptions {
            destination: DESTINATION,
            poll_interval: Duration::from_millis(10),
            error_cooldown: Duration::from_millis(10),
            zone: zone(),
        },
    )
}
