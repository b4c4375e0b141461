//! Admin commands that adjust relay policy or report on it.

use crate::channel::ChannelClient;
use crate::db::{self, Pool};
use crate::model::{SettingKey, CUSTOM_UNLIMITED, MIN_DELAY_SECONDS};
use anyhow::Result;
use chrono::FixedOffset;
use std::fmt::Write as _;
use teloxide::utils::html;
use thiserror::Error;
use tracing::{info, instrument, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Delay(i64),
    Hold,
    Resume,
    Cancel,
    Info,
    InfoAdmin,
    Link(String),
    JoinShow,
    JoinOff,
    TotalOff,
    /// `remaining` uses the stored encoding: -1 unlimited, >0 shots.
    Custom { remaining: i64, text: String },
    CustomOff,
}

/// Rejected command input. Nothing is written when parsing fails.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("{0}")]
    Usage(&'static str),
    #[error("delay must be >= {}s", MIN_DELAY_SECONDS)]
    DelayTooShort,
    #[error("unknown command")]
    Unknown,
}

impl CommandError {
    /// Reply shown to the admin.
    pub fn reply(&self) -> String {
        match self {
            CommandError::Usage(usage) => format!("❌ Usage: <code>{}</code>", usage),
            CommandError::DelayTooShort => {
                format!("⚠️ <b>Delay must be &gt;= {}s.</b>", MIN_DELAY_SECONDS)
            }
            CommandError::Unknown => "Unknown command. Use /help to see all commands.".into(),
        }
    }
}

const DELAY_USAGE: &str = "/delay 10";
const LINK_USAGE: &str = "/link https://t.me/yourlink";
const CUSTOM_USAGE: &str = "/custom 5 Your Text Here (use 0 for all)";

/// Parse a slash command. Returns `None` when `text` is not a command at all.
pub fn parse(text: &str) -> Option<Result<Command, CommandError>> {
    let trimmed = text.trim();
    let body = trimmed.strip_prefix('/')?;
    let (head, args) = match body.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (body, ""),
    };
    // `/cmd@botname` addresses this bot in groups.
    let name = head.split('@').next().unwrap_or(head).to_ascii_lowercase();

    let cmd = match name.as_str() {
        "start" => Ok(Command::Start),
        "help" => Ok(Command::Help),
        "delay" => parse_delay(args),
        "hold" => Ok(Command::Hold),
        "resume" => Ok(Command::Resume),
        "cancel" => Ok(Command::Cancel),
        "info" => Ok(Command::Info),
        "infoadmin" => Ok(Command::InfoAdmin),
        "link" => match args.split_whitespace().next() {
            Some(link) => Ok(Command::Link(link.to_string())),
            None => Err(CommandError::Usage(LINK_USAGE)),
        },
        "joinshow" => Ok(Command::JoinShow),
        "joinoff" => Ok(Command::JoinOff),
        "totaloff" => Ok(Command::TotalOff),
        "custom" => parse_custom(args),
        "customoff" => Ok(Command::CustomOff),
        _ => Err(CommandError::Unknown),
    };
    Some(cmd)
}

fn parse_delay(args: &str) -> Result<Command, CommandError> {
    let secs: i64 = args
        .split_whitespace()
        .next()
        .and_then(|a| a.parse().ok())
        .ok_or(CommandError::Usage(DELAY_USAGE))?;
    if secs < MIN_DELAY_SECONDS {
        return Err(CommandError::DelayTooShort);
    }
    Ok(Command::Delay(secs))
}

fn parse_custom(args: &str) -> Result<Command, CommandError> {
    let (count, text) = match args.split_once(char::is_whitespace) {
        Some((count, text)) => (count, text.trim()),
        None => (args, ""),
    };
    let count: i64 = count
        .parse()
        .ok()
        .filter(|c| *c >= 0)
        .ok_or(CommandError::Usage(CUSTOM_USAGE))?;
    let remaining = if count == 0 { CUSTOM_UNLIMITED } else { count };
    Ok(Command::Custom {
        remaining,
        text: text.to_string(),
    })
}

/// What command execution needs besides the command itself.
pub struct CommandContext<'a> {
    pub pool: &'a Pool,
    pub channel: &'a dyn ChannelClient,
    pub admins: &'a [i64],
    pub zone: FixedOffset,
}

/// Apply a command and return the HTML reply for the admin.
#[instrument(skip_all, fields(cmd = ?cmd))]
pub async fn execute(ctx: &CommandContext<'_>, cmd: Command) -> Result<String> {
    let pool = ctx.pool;
    let reply = match cmd {
        Command::Start => {
            let delay = db::get_setting(pool, SettingKey::Delay).await?.unwrap_or_default();
            format!(
                "🤖 <b>Media Forwarder Bot Ready!</b>\n\
                 ━━━━━━━━━━━━━━━━━━\n\
                 ⏱ <b>Current Delay:</b> {}s\n\
                 Use /help to see all commands.",
                delay
            )
        }
        Command::Help => help_text().to_string(),
        Command::Delay(secs) => {
            db::set_setting(pool, SettingKey::Delay, &secs.to_string()).await?;
            info!(secs, "delay updated");
            format!("✅ Delay updated to <b>{}s</b>.", secs)
        }
        Command::Hold => {
            db::set_flag(pool, SettingKey::Paused, true).await?;
            "⏸ <b>Forwarding PAUSED.</b>".into()
        }
        Command::Resume => {
            db::set_flag(pool, SettingKey::Paused, false).await?;
            "▶️ <b>Forwarding RESUMED.</b>".into()
        }
        Command::Cancel => {
            let cancelled = db::cancel_pending(pool).await?;
            info!(cancelled, "queue cleared");
            format!("🗑 <b>Queue Cleared!</b> ({} removed)", cancelled)
        }
        Command::Info => info_text(pool).await?,
        Command::InfoAdmin => admin_dashboard(ctx).await?,
        Command::Link(link) => {
            db::set_setting(pool, SettingKey::Link, &link).await?;
            format!("✅ Link set to: {}", html::escape(&link))
        }
        Command::JoinShow => {
            db::set_flag(pool, SettingKey::JoinEnabled, true).await?;
            "✅ <b>Join Footer Enabled.</b>".into()
        }
        Command::JoinOff => {
            db::set_flag(pool, SettingKey::JoinEnabled, false).await?;
            "❌ <b>Join Footer Disabled.</b>".into()
        }
        Command::TotalOff => {
            db::set_flag(pool, SettingKey::TotalOff, true).await?;
            "🧹 <b>Total Off ENABLED:</b> Sending clean videos only.".into()
        }
        Command::Custom { remaining, text } => {
            db::configure_custom_caption(pool, remaining, &text).await?;
            let shots = if remaining == CUSTOM_UNLIMITED {
                "Infinite".to_string()
            } else {
                remaining.to_string()
            };
            format!(
                "✅ <b>Custom Caption Set!</b>\n\nText: {}\nVideos: {}",
                html::escape(&text),
                shots
            )
        }
        Command::CustomOff => {
            db::set_setting(pool, SettingKey::CustomRemaining, "0").await?;
            "❌ <b>Custom Caption Disabled.</b>".into()
        }
    };
    Ok(reply)
}

fn help_text() -> &'static str {
    "<b>🛠 Command List:</b>\n\n\
     <b>⚙️ Basic:</b>\n\
     /delay X - Set interval (min 5s)\n\
     /info - Show stats &amp; config\n\
     /infoadmin - Admin Dashboard\n\
     /hold - Pause /resume - Resume\n\
     /cancel - Clear queue\n\n\
     <b>📝 Caption Management:</b>\n\
     <i>Just send text to set caption for next video!</i>\n\
     /link {url} - Set Join Link\n\
     /joinshow - Show 'For More...'\n\
     /joinoff - Hide 'For More...'\n\
     /custom X {text} - Set custom caption manually\n\
     /customoff - Stop custom caption\n\
     /totaloff - <b>CLEAN MODE</b>"
}

async fn info_text(pool: &Pool) -> Result<String> {
    let counts = db::queue_counts(pool).await?;
    let delay = db::get_setting(pool, SettingKey::Delay).await?.unwrap_or_default();
    let paused = db::get_flag(pool, SettingKey::Paused).await?;
    let clean = db::get_flag(pool, SettingKey::TotalOff).await?;
    let join = db::get_flag(pool, SettingKey::JoinEnabled).await?;
    let remaining = db::get_setting(pool, SettingKey::CustomRemaining)
        .await?
        .unwrap_or_default();
    let custom_text = db::get_setting(pool, SettingKey::CustomText)
        .await?
        .unwrap_or_default();
    let preview: String = custom_text.chars().take(10).collect();

    Ok(format!(
        "📊 <b>Detailed Info</b>\n\
         ━━━━━━━━━━━━━━━━━━\n\
         ⚙️ <b>State:</b> {}\n\
         ⏱ <b>Delay:</b> {}s\n\
         📥 <b>Queue Pending:</b> {}\n\
         📤 <b>Total Sent (Global):</b> {}\n\
         📝 <b>Captions:</b> {}\n\
         🔗 <b>Join Footer:</b> {}\n\
         💬 <b>Custom Queue:</b> {} left ({}...)",
        if paused { "Paused ⏸" } else { "Active ▶️" },
        delay,
        counts.pending,
        counts.total_sent,
        if clean { "OFF (Clean) 🧹" } else { "ON 📝" },
        if join { "Yes" } else { "No" },
        remaining,
        html::escape(&preview),
    ))
}

async fn admin_dashboard(ctx: &CommandContext<'_>) -> Result<String> {
    let mut out = String::from("<b>👮 ADMIN INFORMATION DASHBOARD</b>\n\n");
    for (idx, admin_id) in ctx.admins.iter().copied().enumerate() {
        let (name, username) = match ctx.channel.resolve_profile(admin_id).await {
            Ok(profile) => (
                profile.display_name,
                profile
                    .username
                    .map(|u| format!("@{}", u))
                    .unwrap_or_else(|| "No Username".into()),
            ),
            Err(err) => {
                warn!(?err, admin_id, "failed to resolve admin profile");
                ("Unknown Admin".into(), "Unknown".into())
            }
        };

        let activity = db::sender_activity(ctx.pool, admin_id).await?;
        let (today, total) = activity
            .stats
            .map(|s| (s.sent_today, s.sent_lifetime))
            .unwrap_or((0, 0));
        let last_seen = activity
            .last_sent_at
            .map(|t| t.with_timezone(&ctx.zone).format("%d-%b-%Y %I:%M %p").to_string())
            .unwrap_or_else(|| "Never".into());

        let _ = write!(
            out,
            "<b>👮 Admin {:02}</b>\n\
             👤 <b>Display Name :</b> {}\n\
             💠 <b>Username :</b> {}\n\
             🆔 <b>Uid :</b> <code>{}</code>\n\
             🕰 <b>Last Send :</b> {}\n\
             📅 <b>Today Send :</b> {}\n\
             📊 <b>Total Send :</b> {}\n\
             ━━━━━━━━━━━━━━━━━━━━\n\n",
            idx + 1,
            html::escape(&name),
            html::escape(&username),
            admin_id,
            last_seen,
            today,
            total
        );
    }
    Ok(out)
}
