mod common;

use anyhow::Result;
use common::{setup_pool, worker, zone, RecordingChannel, DESTINATION};
use std::sync::Arc;
use std::time::Duration;
use tg_relaybot::channel::{ChannelClient, DeliveryError, Profile};
use tg_relaybot::db;
use tg_relaybot::model::{MediaKind, SettingKey};
use tg_relaybot::relay::{CycleOutcome, RelayOptions, RelayWorker};

async fn queue_status(pool: &sqlx::SqlitePool) -> Vec<(i32, String)> {
    sqlx::query_as("SELECT message_id, status FROM queue ORDER BY id")
        .fetch_all(pool)
        .await
        .unwrap()
}

#[tokio::test]
async fn countdown_caption_applies_to_first_item_only() {
    let pool = setup_pool().await;
    let channel = RecordingChannel::default();
    db::set_setting(&pool, SettingKey::Delay, "5").await.unwrap();
    db::configure_custom_caption(&pool, 1, "Hi").await.unwrap();

    for mid in [101, 102, 103] {
        db::enqueue(&pool, 1, mid, MediaKind::Video).await.unwrap();
    }

    let mut w = worker(&pool, &channel);
    for _ in 0..3 {
        let outcome = w.run_cycle().await.unwrap();
        assert!(matches!(
            outcome,
            CycleOutcome::Delivered { delay, .. } if delay == Duration::from_secs(5)
        ));
    }
    assert_eq!(w.run_cycle().await.unwrap(), CycleOutcome::Idle);

    let copies = channel.copies().await;
    let captions: Vec<&str> = copies.iter().map(|c| c.caption.as_str()).collect();
    assert_eq!(captions, vec!["Hi\n\n", "", ""]);
    let ids: Vec<i32> = copies.iter().map(|c| c.message_id).collect();
    assert_eq!(ids, vec![101, 102, 103]);
    assert!(copies.iter().all(|c| c.destination == DESTINATION && c.source_chat == 1));

    let stats = db::fetch_stats(&pool, 1).await.unwrap().unwrap();
    assert_eq!((stats.sent_today, stats.sent_lifetime), (3, 3));
    assert_eq!(channel.deletes().await, vec![(1, 101), (1, 102), (1, 103)]);
    assert!(queue_status(&pool).await.iter().all(|(_, s)| s == "sent"));
}

#[tokio::test]
async fn progress_report_counts_session_and_resets_when_idle() {
    let pool = setup_pool().await;
    let channel = RecordingChannel::default();
    db::enqueue(&pool, 1, 1, MediaKind::Photo).await.unwrap();
    db::enqueue(&pool, 1, 2, MediaKind::Photo).await.unwrap();

    let mut w = worker(&pool, &channel);
    w.run_cycle().await.unwrap();
    w.run_cycle().await.unwrap();
    assert_eq!(w.session_sent(), 2);

    let texts = channel.texts().await;
    assert_eq!(texts.len(), 2);
    assert_eq!(texts[0].0, 1);
    assert!(texts[0].1.contains("Video Sent :</b> 1/2"));
    assert!(texts[1].1.contains("Video Sent :</b> 2/2"));
    assert!(texts[1].1.contains("Total Sent Lifetime :</b> 2"));
    assert!(texts[1].1.contains("Current Delay :</b> 10s"));

    assert_eq!(w.run_cycle().await.unwrap(), CycleOutcome::Idle);
    assert_eq!(w.session_sent(), 0);

    db::enqueue(&pool, 1, 3, MediaKind::Photo).await.unwrap();
    w.run_cycle().await.unwrap();
    let texts = channel.texts().await;
    assert!(texts[2].1.contains("Video Sent :</b> 1/1"));
}

#[tokio::test]
async fn rate_limit_retries_same_item_without_double_decrement() {
    let pool = setup_pool().await;
    let channel = RecordingChannel::with_copy_responses(vec![
        Err(DeliveryError::RateLimited {
            retry_after: Duration::from_secs(3),
        }),
        Ok(()),
    ]);
    db::configure_custom_caption(&pool, 2, "Promo").await.unwrap();
    db::enqueue(&pool, 4, 40, MediaKind::Video).await.unwrap();
    db::enqueue(&pool, 4, 41, MediaKind::Video).await.unwrap();

    let mut w = worker(&pool, &channel);
    let outcome = w.run_cycle().await.unwrap();
    assert!(matches!(outcome, CycleOutcome::RateLimited { retry_after, .. } if retry_after == Duration::from_secs(3)));
    assert_eq!(outcome.sleep_for(Duration::from_secs(2)), Duration::from_secs(3));
    assert!(db::fetch_stats(&pool, 4).await.unwrap().is_none());
    assert_eq!(db::count_pending(&pool).await.unwrap(), 2);

    assert!(matches!(w.run_cycle().await.unwrap(), CycleOutcome::Delivered { .. }));
    assert!(matches!(w.run_cycle().await.unwrap(), CycleOutcome::Delivered { .. }));

    let copies = channel.copies().await;
    let sent: Vec<(i32, &str)> = copies
        .iter()
        .map(|c| (c.message_id, c.caption.as_str()))
        .collect();
    assert_eq!(
        sent,
        vec![(40, "Promo\n\n"), (40, "Promo\n\n"), (41, "Promo\n\n")]
    );
    assert_eq!(
        db::get_int(&pool, SettingKey::CustomRemaining).await.unwrap(),
        Some(0)
    );
    assert_eq!(db::fetch_stats(&pool, 4).await.unwrap().unwrap().sent_lifetime, 2);
}

#[tokio::test]
async fn rejected_delivery_abandons_item_and_moves_on() {
    let pool = setup_pool().await;
    let channel = RecordingChannel::with_copy_responses(vec![Err(DeliveryError::Rejected(
        "message to copy not found".into(),
    ))]);
    db::enqueue(&pool, 2, 20, MediaKind::Document).await.unwrap();
    db::enqueue(&pool, 2, 21, MediaKind::Document).await.unwrap();

    let mut w = worker(&pool, &channel);
    let outcome = w.run_cycle().await.unwrap();
    assert!(matches!(outcome, CycleOutcome::Abandoned { .. }));
    assert_eq!(outcome.sleep_for(Duration::from_secs(2)), Duration::from_secs(10));
    assert!(db::fetch_stats(&pool, 2).await.unwrap().is_none());
    assert!(channel.texts().await.is_empty());

    assert!(matches!(w.run_cycle().await.unwrap(), CycleOutcome::Delivered { .. }));
    assert_eq!(
        queue_status(&pool).await,
        vec![(20, "sent".to_string()), (21, "sent".to_string())]
    );
    assert_eq!(db::fetch_stats(&pool, 2).await.unwrap().unwrap().sent_lifetime, 1);
}

#[tokio::test]
async fn pause_blocks_dequeue_and_resume_continues_in_order() {
    let pool = setup_pool().await;
    let channel = RecordingChannel::default();
    for mid in 1..=3 {
        db::enqueue(&pool, 1, mid, MediaKind::Video).await.unwrap();
    }

    let mut w = worker(&pool, &channel);
    w.run_cycle().await.unwrap();

    db::set_flag(&pool, SettingKey::Paused, true).await.unwrap();
    assert_eq!(w.run_cycle().await.unwrap(), CycleOutcome::Paused);
    assert_eq!(w.run_cycle().await.unwrap(), CycleOutcome::Paused);
    assert_eq!(channel.copies().await.len(), 1);

    db::set_flag(&pool, SettingKey::Paused, false).await.unwrap();
    w.run_cycle().await.unwrap();
    w.run_cycle().await.unwrap();

    let ids: Vec<i32> = channel.copies().await.iter().map(|c| c.message_id).collect();
    assert_eq!(ids, vec![1, 2, 3]);
}

#[tokio::test]
async fn cancelled_items_are_never_delivered() {
    let pool = setup_pool().await;
    let channel = RecordingChannel::default();
    for mid in 1..=3 {
        db::enqueue(&pool, 1, mid, MediaKind::Video).await.unwrap();
    }

    let mut w = worker(&pool, &channel);
    w.run_cycle().await.unwrap();
    assert_eq!(db::cancel_pending(&pool).await.unwrap(), 2);
    assert_eq!(w.run_cycle().await.unwrap(), CycleOutcome::Idle);

    db::enqueue(&pool, 1, 4, MediaKind::Video).await.unwrap();
    w.run_cycle().await.unwrap();

    let ids: Vec<i32> = channel.copies().await.iter().map(|c| c.message_id).collect();
    assert_eq!(ids, vec![1, 4]);
    assert_eq!(
        queue_status(&pool).await,
        vec![
            (1, "sent".to_string()),
            (2, "cancelled".to_string()),
            (3, "cancelled".to_string()),
            (4, "sent".to_string()),
        ]
    );
}

#[tokio::test]
async fn policy_changes_apply_to_the_next_item() {
    let pool = setup_pool().await;
    let channel = RecordingChannel::default();
    db::enqueue(&pool, 1, 1, MediaKind::Video).await.unwrap();
    db::enqueue(&pool, 1, 2, MediaKind::Video).await.unwrap();

    let mut w = worker(&pool, &channel);
    w.run_cycle().await.unwrap();

    db::set_setting(&pool, SettingKey::Delay, "7").await.unwrap();
    db::set_flag(&pool, SettingKey::JoinEnabled, true).await.unwrap();
    db::set_setting(&pool, SettingKey::Link, "https://t.me/x").await.unwrap();
    let outcome = w.run_cycle().await.unwrap();
    assert!(matches!(outcome, CycleOutcome::Delivered { delay, .. } if delay == Duration::from_secs(7)));

    let copies = channel.copies().await;
    assert_eq!(copies[0].caption, "");
    assert_eq!(
        copies[1].caption,
        "For More Video <a href='https://t.me/x'>Join Here</a>"
    );
}

#[tokio::test]
async fn unreadable_delay_falls_back_to_minimum() {
    let pool = setup_pool().await;
    let channel = RecordingChannel::default();
    db::set_setting(&pool, SettingKey::Delay, "soon").await.unwrap();
    db::enqueue(&pool, 1, 1, MediaKind::Video).await.unwrap();

    let mut w = worker(&pool, &channel);
    let outcome = w.run_cycle().await.unwrap();
    assert_eq!(outcome.sleep_for(Duration::from_secs(2)), Duration::from_secs(5));
}

/// Clears the queue from inside the copy, as `/cancel` arriving mid-delivery would.
struct CancelDuringCopy {
    pool: sqlx::SqlitePool,
    inner: RecordingChannel,
}

#[async_trait::async_trait]
impl ChannelClient for CancelDuringCopy {
    async fn copy_message(
        &self,
        destination: i64,
        source_chat: i64,
        message_id: i32,
        caption: &str,
    ) -> Result<(), DeliveryError> {
        db::cancel_pending(&self.pool).await.unwrap();
        self.inner
            .copy_message(destination, source_chat, message_id, caption)
            .await
    }

    async fn send_text(&self, chat_id: i64, text: &str) -> Result<()> {
        self.inner.send_text(chat_id, text).await
    }

    async fn reply_text(&self, chat_id: i64, reply_to: i32, text: &str) -> Result<()> {
        self.inner.reply_text(chat_id, reply_to, text).await
    }

    async fn delete_message(&self, chat_id: i64, message_id: i32) -> Result<()> {
        self.inner.delete_message(chat_id, message_id).await
    }

    async fn resolve_profile(&self, user_id: i64) -> Result<Profile> {
        self.inner.resolve_profile(user_id).await
    }
}

#[tokio::test]
async fn cancel_during_delivery_settles_the_in_flight_item_as_sent() {
    let pool = setup_pool().await;
    let recorder = RecordingChannel::default();
    for mid in 1..=3 {
        db::enqueue(&pool, 1, mid, MediaKind::Video).await.unwrap();
    }

    let channel = CancelDuringCopy {
        pool: pool.clone(),
        inner: recorder.clone(),
    };
    let mut w = RelayWorker::new(
        pool.clone(),
        Arc::new(channel),
        RelayOptions {
            destination: DESTINATION,
            poll_interval: Duration::from_millis(10),
            error_cooldown: Duration::from_millis(10),
            zone: zone(),
        },
    );

    assert!(matches!(
        w.run_cycle().await.unwrap(),
        CycleOutcome::Delivered { id: 1, .. }
    ));
    assert_eq!(w.run_cycle().await.unwrap(), CycleOutcome::Idle);

    let ids: Vec<i32> = recorder.copies().await.iter().map(|c| c.message_id).collect();
    assert_eq!(ids, vec![1]);
    assert_eq!(
        queue_status(&pool).await,
        vec![
            (1, "sent".to_string()),
            (2, "cancelled".to_string()),
            (3, "cancelled".to_string()),
        ]
    );

    let activity = db::sender_activity(&pool, 1).await.unwrap();
    let stats = activity.stats.unwrap();
    assert_eq!((stats.sent_today, stats.sent_lifetime), (1, 1));
    assert!(activity.last_sent_at.is_some());

    let texts = recorder.texts().await;
    assert_eq!(texts.len(), 1);
    assert!(texts[0].1.contains("Video Sent :</b> 1/1"));
    assert!(texts[0].1.contains("Total in Queue :</b> 0"));
}

#[tokio::test]
async fn worker_loop_outlives_store_errors_and_resumes_delivery() {
    let pool = setup_pool().await;
    let channel = RecordingChannel::default();
    db::set_setting(&pool, SettingKey::Delay, "0").await.unwrap();
    sqlx::query("ALTER TABLE queue RENAME TO queue_parked")
        .execute(&pool)
        .await
        .unwrap();

    let handle = tokio::spawn(worker(&pool, &channel).run());

    // Every cycle fails while the table is missing; the loop keeps cooling down.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!handle.is_finished());
    assert!(channel.copies().await.is_empty());

    sqlx::query("ALTER TABLE queue_parked RENAME TO queue")
        .execute(&pool)
        .await
        .unwrap();
    db::enqueue(&pool, 1, 42, MediaKind::Photo).await.unwrap();

    for _ in 0..200 {
        if !channel.copies().await.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let ids: Vec<i32> = channel.copies().await.iter().map(|c| c.message_id).collect();
    assert_eq!(ids, vec![42]);
    assert!(!handle.is_finished());

    handle.abort();
}
