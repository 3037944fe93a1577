//! Notification fan-out
//!
//! Recipients are resolved right before sending: every active user of the
//! target role. An empty pool is not an error; nothing is stored and `None`
//! is returned.

use chrono::Utc;
use qcflow_common::events::{EventBus, QcEvent};
use qcflow_common::{Result, Role};
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::db;
use crate::models::{NewNotification, Notification, Priority, RelatedData};

/// Notification content before recipients are known
#[derive(Debug, Clone)]
pub struct NotificationDraft {
    pub subject: String,
    pub message: String,
    pub priority: Priority,
    pub sender: String,
    pub related_data: Option<RelatedData>,
}

impl NotificationDraft {
    fn addressed_to(self, recipients: Vec<uuid::Uuid>) -> NewNotification {
        NewNotification {
            subject: self.subject,
            message: self.message,
            priority: self.priority,
            sender: self.sender,
            recipients,
            related_data: self.related_data,
        }
    }
}

/// Store one notification for all recipients and publish it on the bus
pub async fn send_notification(
    pool: &SqlitePool,
    event_bus: &EventBus,
    new_notification: NewNotification,
) -> Result<Option<Notification>> {
    if new_notification.recipients.is_empty() {
        debug!(subject = %new_notification.subject, "No recipients, notification skipped");
        return Ok(None);
    }

    let notification = db::notifications::insert_notification(pool, &new_notification).await?;
    info!(
        notification_id = %notification.id,
        recipients = notification.recipients.len(),
        priority = %notification.priority,
        "Notification sent: {}",
        notification.subject
    );

    event_bus.emit_lossy(QcEvent::NotificationCreated {
        notification_id: notification.id,
        subject: notification.subject.clone(),
        priority: notification.priority.to_string(),
        recipients: notification.recipients.clone(),
        batch_number: notification
            .related_data
            .as_ref()
            .and_then(|r| r.batch_number.clone()),
        timestamp: Utc::now(),
    });

    Ok(Some(notification))
}

/// Send `draft` to every active user holding `role`
pub async fn notify_role(
    pool: &SqlitePool,
    event_bus: &EventBus,
    role: Role,
    draft: NotificationDraft,
) -> Result<Option<Notification>> {
    let recipients = db::users::active_user_ids_by_role(pool, role).await?;
    if recipients.is_empty() {
        info!(role = %role, "No active users in role, notification skipped");
        return Ok(None);
    }
    send_notification(pool, event_bus, draft.addressed_to(recipients)).await
}
