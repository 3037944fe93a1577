//! In-app notifications
//!
//! One `notifications` row per message plus one `notification_recipients` row
//! per addressee. Read state lives on the recipient row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record a notification points at
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelatedData {
    /// `capa`, `lab-data` or `production-data`
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lab_data_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub production_data_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_number: Option<String>,
}

impl RelatedData {
    pub fn capa(batch_number: &str) -> Self {
        Self {
            kind: "capa".to_string(),
            batch_number: Some(batch_number.to_string()),
            ..Default::default()
        }
    }
}

/// Notification about to be stored
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub subject: String,
    pub message: String,
    pub priority: Priority,
    pub sender: String,
    pub recipients: Vec<Uuid>,
    pub related_data: Option<RelatedData>,
}

/// Stored notification with its full recipient list
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    pub subject: String,
    pub message: String,
    pub priority: Priority,
    pub sender: String,
    pub recipients: Vec<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_data: Option<RelatedData>,
    pub created_at: DateTime<Utc>,
}

/// Notification as seen by one recipient
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationView {
    pub id: Uuid,
    pub subject: String,
    pub message: String,
    pub priority: Priority,
    pub sender: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_data: Option<RelatedData>,
    pub created_at: DateTime<Utc>,
    pub read: bool,
    pub read_at: Option<DateTime<Utc>>,
}

/// `notifications` joined with the caller's recipient row
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct NotificationRow {
    pub id: Uuid,
    pub subject: String,
    pub message: String,
    pub priority: Priority,
    pub sender: String,
    pub related_type: Option<String>,
    pub related_lab_data_id: Option<Uuid>,
    pub related_production_data_id: Option<Uuid>,
    pub related_batch_number: Option<String>,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

impl From<NotificationRow> for NotificationView {
    fn from(row: NotificationRow) -> Self {
        let related_data = row.related_type.map(|kind| RelatedData {
            kind,
            lab_data_id: row.related_lab_data_id,
            production_data_id: row.related_production_data_id,
            batch_number: row.related_batch_number,
        });

        NotificationView {
            id: row.id,
            subject: row.subject,
            message: row.message,
            priority: row.priority,
            sender: row.sender,
            related_data,
            created_at: row.created_at,
            read: row.read_at.is_some(),
            read_at: row.read_at,
        }
    }
}
