use crate::channel::ChannelClient;
use crate::commands::{self, CommandContext};
use crate::db::{self, Pool};
use crate::debounce::BatchDebouncer;
use crate::model::MediaKind;
use crate::staging::CaptionStaging;
use anyhow::Result;
use chrono::FixedOffset;
use std::sync::Arc;
use teloxide::types::Message;
use tracing::{debug, info, instrument, warn};

/// Shared state handed to every update handler.
#[derive(Clone)]
pub struct AppContext {
    pub pool: Pool,
    pub channel: Arc<dyn ChannelClient>,
    pub staging: Arc<CaptionStaging>,
    pub debouncer: BatchDebouncer,
    pub admins: Arc<Vec<i64>>,
    pub zone: FixedOffset,
}

impl AppContext {
    pub fn is_admin(&self, user_id: i64) -> bool {
        self.admins.contains(&user_id)
    }
}

/// A private message from a trusted sender, stripped of Telegram types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    pub sender_id: i64,
    pub chat_id: i64,
    pub message_id: i32,
    /// `None` for a plain text message.
    pub kind: Option<MediaKind>,
    pub text: Option<String>,
}

/// Classify a Telegram message. Text without media has no kind; anything
/// else that is not text is relayed, with unrecognized media as `Other`.
pub fn media_kind_of(msg: &Message) -> Option<MediaKind> {
    if msg.video().is_some() {
        Some(MediaKind::Video)
    } else if msg.photo().is_some() {
        Some(MediaKind::Photo)
    } else if msg.animation().is_some() {
        Some(MediaKind::Animation)
    } else if msg.document().is_some() {
        Some(MediaKind::Document)
    } else if msg.text().is_some() {
        None
    } else {
        Some(MediaKind::Other)
    }
}

#[instrument(skip_all)]
pub async fn handle_update(ctx: &AppContext, msg: &Message) -> Result<()> {
    let user = match msg.from() {
        Some(u) => u,
        None => return Ok(()),
    };
    let sender_id = user.id.0 as i64;
    if !ctx.is_admin(sender_id) {
        debug!(sender_id, "ignoring message from untrusted sender");
        return Ok(());
    }

    let chat_id = msg.chat.id.0;
    if let Some(text) = msg.text() {
        if let Some(parsed) = commands::parse(text) {
            return handle_command(ctx, chat_id, parsed).await;
        }
    }

    if !msg.chat.is_private() {
        return Ok(());
    }

    let inbound = Inbound {
        sender_id,
        chat_id,
        message_id: msg.id.0,
        kind: media_kind_of(msg),
        text: msg.text().map(str::to_owned),
    };
    handle_inbound(ctx, inbound).await
}

async fn handle_command(
    ctx: &AppContext,
    chat_id: i64,
    parsed: Result<commands::Command, commands::CommandError>,
) -> Result<()> {
    let reply = match parsed {
        Ok(cmd) => {
            let cmd_ctx = CommandContext {
                pool: &ctx.pool,
                channel: ctx.channel.as_ref(),
                admins: &ctx.admins,
                zone: ctx.zone,
            };
            commands::execute(&cmd_ctx, cmd).await?
        }
        Err(err) => {
            debug!(%err, "rejected command");
            err.reply()
        }
    };
    ctx.channel.send_text(chat_id, &reply).await
}

/// Stage plain text as the next caption, or enqueue media for relay.
#[instrument(skip_all, fields(sender_id = inbound.sender_id))]
pub async fn handle_inbound(ctx: &AppContext, inbound: Inbound) -> Result<()> {
    let Some(kind) = inbound.kind else {
        let Some(text) = inbound.text.as_deref() else {
            return Ok(());
        };
        ctx.staging.purge_expired().await;
        ctx.staging.stage(inbound.sender_id, text).await;
        let ack = format!(
            "📝 <b>Caption Saved!</b> Send media within {}s to apply.",
            ctx.staging.window().as_secs()
        );
        if let Err(err) = ctx
            .channel
            .reply_text(inbound.chat_id, inbound.message_id, &ack)
            .await
        {
            warn!(?err, "failed to acknowledge staged caption");
        }
        return Ok(());
    };

    if let Some(caption) = ctx.staging.try_consume(inbound.sender_id).await {
        // One-shot override, superseding any counted custom caption.
        db::configure_custom_caption(&ctx.pool, 1, &caption).await?;
        info!("applied staged caption to next item");
    }

    let pending = db::enqueue(&ctx.pool, inbound.sender_id, inbound.message_id, kind).await?;
    debug!(kind = kind.as_str(), pending, "queued item");
    ctx.debouncer
        .notify(inbound.sender_id, inbound.chat_id, inbound.message_id)
        .await;
    Ok(())
}
