use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Declared kind of a relayed media message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    Photo,
    Animation,
    Document,
    Other,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Video => "video",
            MediaKind::Photo => "photo",
            MediaKind::Animation => "animation",
            MediaKind::Document => "document",
            MediaKind::Other => "other",
        }
    }

    pub fn parse_kind(s: &str) -> MediaKind {
        match s {
            "video" => MediaKind::Video,
            "photo" => MediaKind::Photo,
            "animation" => MediaKind::Animation,
            "document" => MediaKind::Document,
            _ => MediaKind::Other,
        }
    }
}

/// Queue row status. Transitions only go Pending -> Sent or Pending -> Cancelled.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum QueueStatus {
    Pending,
    Sent,
    Cancelled,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Pending => "pending",
            QueueStatus::Sent => "sent",
            QueueStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse_status(s: &str) -> Option<QueueStatus> {
        match s {
            "pending" => Some(QueueStatus::Pending),
            "sent" => Some(QueueStatus::Sent),
            "cancelled" => Some(QueueStatus::Cancelled),
            _ => None,
        }
    }
}

/// The fixed set of policy keys held in the settings table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingKey {
    Delay,
    Paused,
    Link,
    JoinEnabled,
    CustomText,
    CustomRemaining,
    TotalOff,
}

impl SettingKey {
    pub const ALL: [SettingKey; 7] = [
        SettingKey::Delay,
        SettingKey::Paused,
        SettingKey::Link,
        SettingKey::JoinEnabled,
        SettingKey::CustomText,
        SettingKey::CustomRemaining,
        SettingKey::TotalOff,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SettingKey::Delay => "delay",
            SettingKey::Paused => "paused",
            SettingKey::Link => "link",
            SettingKey::JoinEnabled => "join_enabled",
            SettingKey::CustomText => "custom_text",
            SettingKey::CustomRemaining => "custom_remaining",
            SettingKey::TotalOff => "total_off",
        }
    }

    /// Value written on first startup.
    pub fn default_value(&self) -> &'static str {
        match self {
            SettingKey::Delay => "10",
            SettingKey::Paused => "0",
            SettingKey::Link => "https://t.me/telegram",
            SettingKey::JoinEnabled => "0",
            SettingKey::CustomText => "",
            SettingKey::CustomRemaining => "0",
            SettingKey::TotalOff => "0",
        }
    }
}

/// Minimum accepted relay delay, in seconds.
pub const MIN_DELAY_SECONDS: i64 = 5;

/// `custom_remaining` value meaning "apply to every item".
pub const CUSTOM_UNLIMITED: i64 = -1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueueItem {
    pub id: i64,
    pub sender_id: i64,
    pub message_id: i32,
    pub media_kind: MediaKind,
    pub status: QueueStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SenderStats {
    pub sender_id: i64,
    pub sent_today: i64,
    pub sent_lifetime: i64,
    pub last_updated: NaiveDate,
}
