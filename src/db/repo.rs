use super::model::{QueueCounts, SenderActivity};
use crate::model::{MediaKind, QueueItem, QueueStatus, SenderStats, SettingKey};
use anyhow::{anyhow, Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::instrument;

pub type Pool = SqlitePool;

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    // WAL so the worker's reads don't block handlers' writes.
    let options = SqliteConnectOptions::from_str(&normalized)
        .with_context(|| format!("invalid database url {normalized}"))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Full);
    let pool = SqlitePoolOptions::new().connect_with(options).await?;
    Ok(pool)
}

/// Expand a leading `~/` in a file-backed SQLite URL and make sure its parent
/// directory exists. In-memory and non-sqlite URLs pass through untouched.
fn prepare_sqlite_url(url: &str) -> String {
    let Some(rest) = url.strip_prefix("sqlite:") else {
        return url.to_string();
    };
    if rest.starts_with(":memory") {
        return url.to_string();
    }
    let rest = rest.strip_prefix("//").unwrap_or(rest);
    let (path, query) = match rest.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (rest, None),
    };
    if path.is_empty() {
        return url.to_string();
    }

    let path = match (path.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(tail), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), tail),
        _ => path.to_string(),
    };
    if let Some(parent) = std::path::Path::new(&path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    match query {
        Some(q) => format!("sqlite://{path}?{q}"),
        None => format!("sqlite://{path}"),
    }
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Settings store
// ---------------------------------------------------------------------------

/// Insert the default value of every known key that has no row yet.
#[instrument(skip_all)]
pub async fn seed_default_settings(pool: &Pool) -> Result<()> {
    let mut tx = pool.begin().await?;
    for key in SettingKey::ALL {
        sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)")
            .bind(key.as_str())
            .bind(key.default_value())
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;
    Ok(())
}

#[instrument(skip_all, fields(key = key.as_str()))]
pub async fn get_setting(pool: &Pool, key: SettingKey) -> Result<Option<String>> {
    let value = sqlx::query_scalar::<_, String>("SELECT value FROM settings WHERE key = ?")
        .bind(key.as_str())
        .fetch_optional(pool)
        .await?;
    Ok(value)
}

#[instrument(skip_all, fields(key = key.as_str()))]
pub async fn set_setting(pool: &Pool, key: SettingKey, value: &str) -> Result<()> {
    sqlx::query(
        "INSERT INTO settings (key, value) VALUES (?, ?) ON CONFLICT(key) DO UPDATE SET value = excluded.value",
    )
    .bind(key.as_str())
    .bind(value)
    .execute(pool)
    .await?;
    Ok(())
}

/// Boolean keys are stored as "1"/"0"; anything else reads as false.
pub async fn get_flag(pool: &Pool, key: SettingKey) -> Result<bool> {
    Ok(get_setting(pool, key).await?.as_deref() == Some("1"))
}

pub async fn set_flag(pool: &Pool, key: SettingKey, on: bool) -> Result<()> {
    set_setting(pool, key, if on { "1" } else { "0" }).await
}

/// Integer keys; `None` when the row is missing or not a number.
pub async fn get_int(pool: &Pool, key: SettingKey) -> Result<Option<i64>> {
    Ok(get_setting(pool, key)
        .await?
        .and_then(|v| v.trim().parse::<i64>().ok()))
}

/// Replace the custom caption state in one transaction and leave clean mode.
/// `remaining` follows the `custom_remaining` encoding (-1 unlimited, >0 shots).
#[instrument(skip_all)]
pub async fn configure_custom_caption(pool: &Pool, remaining: i64, text: &str) -> Result<()> {
    let mut tx = pool.begin().await?;
    let writes = [
        (SettingKey::CustomText, text.to_string()),
        (SettingKey::CustomRemaining, remaining.to_string()),
        (SettingKey::TotalOff, "0".to_string()),
    ];
    for (key, value) in writes {
        sqlx::query(
            "INSERT INTO settings (key, value) VALUES (?, ?) ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key.as_str())
        .bind(value)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(())
}

/// Take one shot of the custom caption if it is active.
///
/// A positive `custom_remaining` is decremented by exactly one; -1 (unlimited)
/// is left untouched; 0 yields `None`. The decrement is the first statement of
/// the transaction so the write lock is held before anything is read.
#[instrument(skip_all)]
pub async fn claim_custom_caption(pool: &Pool) -> Result<Option<String>> {
    let mut tx = pool.begin().await?;
    let decremented = sqlx::query_scalar::<_, String>(
        "UPDATE settings SET value = CAST(CAST(value AS INTEGER) - 1 AS TEXT) \
         WHERE key = ? AND CAST(value AS INTEGER) > 0 RETURNING value",
    )
    .bind(SettingKey::CustomRemaining.as_str())
    .fetch_optional(&mut *tx)
    .await?;

    let active = if decremented.is_some() {
        true
    } else {
        let remaining =
            sqlx::query_scalar::<_, String>("SELECT value FROM settings WHERE key = ?")
                .bind(SettingKey::CustomRemaining.as_str())
                .fetch_optional(&mut *tx)
                .await?;
        remaining
            .and_then(|v| v.trim().parse::<i64>().ok())
            .is_some_and(|v| v < 0)
    };

    let text = if active {
        let text = sqlx::query_scalar::<_, String>("SELECT value FROM settings WHERE key = ?")
            .bind(SettingKey::CustomText.as_str())
            .fetch_optional(&mut *tx)
            .await?;
        Some(text.unwrap_or_default())
    } else {
        None
    };
    tx.commit().await?;
    Ok(text)
}

// ---------------------------------------------------------------------------
// Work queue store
// ---------------------------------------------------------------------------

/// Append a pending item and return the number of items still pending.
#[instrument(skip_all)]
pub async fn enqueue(
    pool: &Pool,
    sender_id: i64,
    message_id: i32,
    kind: MediaKind,
) -> Result<i64> {
    let mut tx = pool.begin().await?;
    sqlx::query("INSERT INTO queue (sender_id, message_id, media_kind, status) VALUES (?, ?, ?, ?)")
        .bind(sender_id)
        .bind(message_id)
        .bind(kind.as_str())
        .bind(QueueStatus::Pending.as_str())
        .execute(&mut *tx)
        .await?;
    let pending: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM queue WHERE status = 'pending'")
        .fetch_one(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(pending)
}

#[instrument(skip_all)]
pub async fn peek_oldest_pending(pool: &Pool) -> Result<Option<QueueItem>> {
    let row = sqlx::query(
        "SELECT id, sender_id, message_id, media_kind, status, created_at FROM queue \
         WHERE status = 'pending' ORDER BY id ASC LIMIT 1",
    )
    .fetch_optional(pool)
    .await?;
    row.map(|row| queue_item_from_row(&row)).transpose()
}

fn queue_item_from_row(row: &SqliteRow) -> Result<QueueItem> {
    let id: i64 = row.try_get("id")?;
    let status: String = row.try_get("status")?;
    let status = QueueStatus::parse_status(&status)
        .ok_or_else(|| anyhow!("queue item {} has unknown status {}", id, status))?;
    let kind: String = row.try_get("media_kind")?;
    let created_at: NaiveDateTime = row.try_get("created_at")?;
    Ok(QueueItem {
        id,
        sender_id: row.try_get("sender_id")?,
        message_id: row.try_get("message_id")?,
        media_kind: MediaKind::parse_kind(&kind),
        status,
        created_at: created_at.and_utc(),
    })
}

/// Mark a pending item as sent. Returns false when the row was no longer
/// pending (e.g. cancelled while its delivery was in flight).
#[instrument(skip_all)]
pub async fn mark_sent(pool: &Pool, id: i64) -> Result<bool> {
    let res = sqlx::query(
        "UPDATE queue SET status = 'sent', sent_at = CURRENT_TIMESTAMP WHERE id = ? AND status = 'pending'",
    )
    .bind(id)
    .execute(pool)
    .await?;
    Ok(res.rows_affected() > 0)
}

/// Record that an item reached the destination. Unlike [`mark_sent`] this also
/// settles a row cancelled while its copy was in flight, since the copy happened.
#[instrument(skip_all)]
pub async fn mark_delivered(pool: &Pool, id: i64) -> Result<()> {
    sqlx::query(
        "UPDATE queue SET status = 'sent', sent_at = CURRENT_TIMESTAMP \
         WHERE id = ? AND status IN ('pending', 'cancelled')",
    )
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Cancel every currently pending item; returns how many were cancelled.
#[instrument(skip_all)]
pub async fn cancel_pending(pool: &Pool) -> Result<u64> {
    let res = sqlx::query("UPDATE queue SET status = 'cancelled' WHERE status = 'pending'")
        .execute(pool)
        .await?;
    Ok(res.rows_affected())
}

#[instrument(skip_all)]
pub async fn count_pending(pool: &Pool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM queue WHERE status = 'pending'")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

#[instrument(skip_all)]
pub async fn sum_lifetime_sent(pool: &Pool) -> Result<i64> {
    let total: Option<i64> = sqlx::query_scalar("SELECT SUM(sent_lifetime) FROM stats")
        .fetch_one(pool)
        .await?;
    Ok(total.unwrap_or(0))
}

pub async fn queue_counts(pool: &Pool) -> Result<QueueCounts> {
    Ok(QueueCounts {
        pending: count_pending(pool).await?,
        total_sent: sum_lifetime_sent(pool).await?,
    })
}

// ---------------------------------------------------------------------------
// Stats store
// ---------------------------------------------------------------------------

/// Count one delivery for `sender_id` on `today`, resetting the daily counter
/// first if the row was last touched on another day. Single UPSERT statement.
#[instrument(skip_all)]
pub async fn record_delivery(pool: &Pool, sender_id: i64, today: NaiveDate) -> Result<SenderStats> {
    let row = sqlx::query(
        "INSERT INTO stats (sender_id, sent_today, sent_lifetime, last_updated) VALUES (?, 1, 1, ?) \
         ON CONFLICT(sender_id) DO UPDATE SET \
             sent_today = CASE WHEN stats.last_updated = excluded.last_updated \
                               THEN stats.sent_today + 1 ELSE 1 END, \
             sent_lifetime = stats.sent_lifetime + 1, \
             last_updated = excluded.last_updated \
         RETURNING sender_id, sent_today, sent_lifetime, last_updated",
    )
    .bind(sender_id)
    .bind(today)
    .fetch_one(pool)
    .await?;
    stats_from_row(&row)
}

pub async fn fetch_stats(pool: &Pool, sender_id: i64) -> Result<Option<SenderStats>> {
    let row = sqlx::query(
        "SELECT sender_id, sent_today, sent_lifetime, last_updated FROM stats WHERE sender_id = ?",
    )
    .bind(sender_id)
    .fetch_optional(pool)
    .await?;
    row.map(|row| stats_from_row(&row)).transpose()
}

fn stats_from_row(row: &SqliteRow) -> Result<SenderStats> {
    Ok(SenderStats {
        sender_id: row.try_get("sender_id")?,
        sent_today: row.try_get("sent_today")?,
        sent_lifetime: row.try_get("sent_lifetime")?,
        last_updated: row.try_get("last_updated")?,
    })
}

/// Stats row plus the time of the sender's most recent delivered item.
pub async fn sender_activity(pool: &Pool, sender_id: i64) -> Result<SenderActivity> {
    let stats = fetch_stats(pool, sender_id).await?;
    let last: Option<NaiveDateTime> = sqlx::query_scalar(
        "SELECT COALESCE(sent_at, created_at) FROM queue \
         WHERE sender_id = ? AND status = 'sent' ORDER BY id DESC LIMIT 1",
    )
    .bind(sender_id)
    .fetch_optional(pool)
    .await?;
    Ok(SenderActivity {
        stats,
        last_sent_at: last.map(|t| t.and_utc()),
    })
}
