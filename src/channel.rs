use anyhow::Result;
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use teloxide::payloads::{CopyMessageSetters, SendMessageSetters};
use teloxide::prelude::*;
use teloxide::types::{MessageId, ParseMode};
use teloxide::RequestError;
use thiserror::Error;

/// Outcome of a failed copy into the destination chat.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Flood control: the same request may be retried after `retry_after`.
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },
    /// Anything else; the item will not be retried.
    #[error("delivery rejected: {0}")]
    Rejected(String),
}

/// Public name of a Telegram account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub display_name: String,
    pub username: Option<String>,
}

/// Everything the relay needs from the chat platform.
///
/// Chat and message ids are raw Telegram integers; private chats share the
/// sender's user id.
#[async_trait]
pub trait ChannelClient: Send + Sync {
    /// Copy `message_id` from `source_chat` into `destination` with an HTML caption.
    async fn copy_message(
        &self,
        destination: i64,
        source_chat: i64,
        message_id: i32,
        caption: &str,
    ) -> Result<(), DeliveryError>;

    async fn send_text(&self, chat_id: i64, text: &str) -> Result<()>;

    async fn reply_text(&self, chat_id: i64, reply_to: i32, text: &str) -> Result<()>;

    async fn delete_message(&self, chat_id: i64, message_id: i32) -> Result<()>;

    async fn resolve_profile(&self, user_id: i64) -> Result<Profile>;
}

/// [`ChannelClient`] backed by the Telegram Bot API.
#[derive(Clone)]
pub struct TelegramChannel {
    bot: Bot,
}

impl fmt::Debug for TelegramChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramChannel").finish_non_exhaustive()
    }
}

impl TelegramChannel {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

fn classify(err: RequestError) -> DeliveryError {
    match err {
        RequestError::RetryAfter(wait) => DeliveryError::RateLimited { retry_after: wait },
        other => DeliveryError::Rejected(other.to_string()),
    }
}

#[async_trait]
impl ChannelClient for TelegramChannel {
    async fn copy_message(
        &self,
        destination: i64,
        source_chat: i64,
        message_id: i32,
        caption: &str,
    ) -> Result<(), DeliveryError> {
        self.bot
            .copy_message(ChatId(destination), ChatId(source_chat), MessageId(message_id))
            .caption(caption)
            .parse_mode(ParseMode::Html)
            .await
            .map(|_| ())
            .map_err(classify)
    }

    async fn send_text(&self, chat_id: i64, text: &str) -> Result<()> {
        self.bot
            .send_message(ChatId(chat_id), text)
            .parse_mode(ParseMode::Html)
            .await?;
        Ok(())
    }

    async fn reply_text(&self, chat_id: i64, reply_to: i32, text: &str) -> Result<()> {
        self.bot
            .send_message(ChatId(chat_id), text)
            .parse_mode(ParseMode::Html)
            .reply_to_message_id(MessageId(reply_to))
            .await?;
        Ok(())
    }

    async fn delete_message(&self, chat_id: i64, message_id: i32) -> Result<()> {
        self.bot
            .delete_message(ChatId(chat_id), MessageId(message_id))
            .await?;
        Ok(())
    }

    async fn resolve_profile(&self, user_id: i64) -> Result<Profile> {
        let chat = self.bot.get_chat(ChatId(user_id)).await?;
        let first = chat.first_name().unwrap_or_default();
        let display_name = match chat.last_name() {
            Some(last) => format!("{} {}", first, last),
            None => first.to_string(),
        };
        Ok(Profile {
            display_name,
            username: chat.username().map(str::to_owned),
        })
    }
}
