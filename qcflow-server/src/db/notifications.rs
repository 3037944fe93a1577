//! Notification storage with per-recipient read state

use chrono::{DateTime, Utc};
use qcflow_common::Result;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::models::notification::NotificationRow;
use crate::models::{NewNotification, Notification, NotificationView};

/// Insert the notification and one recipient row per addressee
///
/// Duplicate recipient ids are collapsed.
pub async fn insert_notification(
    pool: &SqlitePool,
    new_notification: &NewNotification,
) -> Result<Notification> {
    let mut recipients = new_notification.recipients.clone();
    recipients.sort();
    recipients.dedup();

    let notification = Notification {
        id: Uuid::new_v4(),
        subject: new_notification.subject.clone(),
        message: new_notification.message.clone(),
        priority: new_notification.priority,
        sender: new_notification.sender.clone(),
        recipients,
        related_data: new_notification.related_data.clone(),
        created_at: Utc::now(),
    };
    let related = notification.related_data.as_ref();

    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO notifications (id, subject, message, priority, sender, related_type,
                                   related_lab_data_id, related_production_data_id,
                                   related_batch_number, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(notification.id)
    .bind(&notification.subject)
    .bind(&notification.message)
    .bind(notification.priority)
    .bind(&notification.sender)
    .bind(related.map(|r| r.kind.clone()))
    .bind(related.and_then(|r| r.lab_data_id))
    .bind(related.and_then(|r| r.production_data_id))
    .bind(related.and_then(|r| r.batch_number.clone()))
    .bind(notification.created_at)
    .execute(&mut *tx)
    .await?;

    for recipient in &notification.recipients {
        sqlx::query(
            "INSERT INTO notification_recipients (notification_id, recipient_id, read_at) VALUES (?, ?, NULL)",
        )
        .bind(notification.id)
        .bind(recipient)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    Ok(notification)
}

/// Notifications addressed to `user_id`, newest first
pub async fn list_for_recipient(
    pool: &SqlitePool,
    user_id: Uuid,
    unread_only: bool,
    limit: i64,
) -> Result<Vec<NotificationView>> {
    let rows = sqlx::query_as::<_, NotificationRow>(
        r#"
        SELECT n.id, n.subject, n.message, n.priority, n.sender, n.related_type,
               n.related_lab_data_id, n.related_production_data_id,
               n.related_batch_number, n.created_at, r.read_at
        FROM notifications n
        JOIN notification_recipients r ON r.notification_id = n.id
        WHERE r.recipient_id = ?
          AND (? = 0 OR r.read_at IS NULL)
        ORDER BY n.created_at DESC
        LIMIT ?
        "#,
    )
    .bind(user_id)
    .bind(unread_only)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(NotificationView::from).collect())
}

pub async fn unread_count(pool: &SqlitePool, user_id: Uuid) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM notification_recipients WHERE recipient_id = ? AND read_at IS NULL",
    )
    .bind(user_id)
    .fetch_one(pool)
    .await?;
    Ok(count)
}

/// Mark one notification read for one recipient
///
/// Returns `false` when the user is not a recipient. An earlier read time is
/// kept.
pub async fn mark_read(
    pool: &SqlitePool,
    notification_id: Uuid,
    user_id: Uuid,
    now: DateTime<Utc>,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE notification_recipients
        SET read_at = COALESCE(read_at, ?)
        WHERE notification_id = ? AND recipient_id = ?
        "#,
    )
    .bind(now)
    .bind(notification_id)
    .bind(user_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Mark everything addressed to `user_id` read; returns how many changed
pub async fn mark_all_read(pool: &SqlitePool, user_id: Uuid, now: DateTime<Utc>) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE notification_recipients SET read_at = ? WHERE recipient_id = ? AND read_at IS NULL",
    )
    .bind(now)
    .bind(user_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}
