//! Event types and EventBus
//!
//! Workflow steps publish events on the bus; the SSE endpoint forwards them to
//! connected clients according to [`QcEvent::visible_to`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::roles::{Permission, Role};

/// Root-cause workflow state for one batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnalysisState {
    Searching,
    NotFound,
    FoundAnalyzed,
    FoundUnanalyzed,
    Analyzing,
    AnalysisComplete,
    AnalysisFailed,
}

/// QCFlow event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum QcEvent {
    /// Notification created and addressed to `recipients`
    NotificationCreated {
        notification_id: Uuid,
        subject: String,
        priority: String,
        recipients: Vec<Uuid>,
        batch_number: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// Root-cause workflow moved to a new state
    AnalysisStateChanged {
        batch_number: String,
        state: AnalysisState,
        timestamp: DateTime<Utc>,
    },

    /// Batch flags changed after a data submission or analysis
    ProcessFlagsChanged {
        batch_number: String,
        is_fabricated: bool,
        is_lab_tested: bool,
        is_analyzed: bool,
        timestamp: DateTime<Utc>,
    },

    /// Manager recorded feedback on a prediction
    FeedbackRecorded {
        feedback_id: Uuid,
        batch_number: String,
        is_correct: bool,
        timestamp: DateTime<Utc>,
    },

    /// Retraining job changed status
    RetrainingJobUpdated {
        job_id: Uuid,
        status: String,
        timestamp: DateTime<Utc>,
    },
}

impl QcEvent {
    /// Event name used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            QcEvent::NotificationCreated { .. } => "NotificationCreated",
            QcEvent::AnalysisStateChanged { .. } => "AnalysisStateChanged",
            QcEvent::ProcessFlagsChanged { .. } => "ProcessFlagsChanged",
            QcEvent::FeedbackRecorded { .. } => "FeedbackRecorded",
            QcEvent::RetrainingJobUpdated { .. } => "RetrainingJobUpdated",
        }
    }

    /// Whether a connected user may receive this event
    ///
    /// Notifications go to their recipients only; everything else is gated by
    /// the permission that reads the underlying data.
    pub fn visible_to(&self, user_id: Uuid, role: Role) -> bool {
        match self {
            QcEvent::NotificationCreated { recipients, .. } => recipients.contains(&user_id),
            QcEvent::AnalysisStateChanged { .. } => role.allows(Permission::RootCauseRead),
            QcEvent::ProcessFlagsChanged { .. } => role.allows(Permission::ProcessesRead),
            QcEvent::FeedbackRecorded { .. } | QcEvent::RetrainingJobUpdated { .. } => {
                role.allows(Permission::FeedbackRead)
            }
        }
    }
}

/// Broadcast bus shared by all handlers
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<QcEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<QcEvent> {
        self.tx.subscribe()
    }

    /// Emit an event; `Err` when nobody is listening
    #[allow(clippy::result_large_err)]
    pub fn emit(&self, event: QcEvent) -> Result<usize, broadcast::error::SendError<QcEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring the no-subscriber case
    pub fn emit_lossy(&self, event: QcEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notification_for(recipients: Vec<Uuid>) -> QcEvent {
        QcEvent::NotificationCreated {
            notification_id: Uuid::new_v4(),
            subject: "CAPA required".to_string(),
            priority: "high".to_string(),
            recipients,
            batch_number: Some("AB12".to_string()),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_notification_visible_to_recipients_only() {
        let recipient = Uuid::new_v4();
        let event = notification_for(vec![recipient]);

        assert!(event.visible_to(recipient, Role::LabAnalyst));
        assert!(!event.visible_to(Uuid::new_v4(), Role::Manager));
    }

    #[test]
    fn test_feedback_events_hidden_from_analysts() {
        let event = QcEvent::RetrainingJobUpdated {
            job_id: Uuid::new_v4(),
            status: "queued".to_string(),
            timestamp: Utc::now(),
        };
        assert!(event.visible_to(Uuid::new_v4(), Role::Manager));
        assert!(!event.visible_to(Uuid::new_v4(), Role::LabAnalyst));
    }

    #[test]
    fn test_serialized_event_carries_type_tag() {
        let event = QcEvent::AnalysisStateChanged {
            batch_number: "AB12".to_string(),
            state: AnalysisState::Analyzing,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "AnalysisStateChanged");
        assert_eq!(json["state"], "analyzing");
    }

    #[tokio::test]
    async fn test_emit_reaches_subscriber() {
        let bus = EventBus::new(16);
        assert!(bus.emit(notification_for(vec![])).is_err());

        let mut rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
        bus.emit_lossy(notification_for(vec![]));

        let received = rx.recv().await.unwrap();
        assert_eq!(received.event_type(), "NotificationCreated");
    }
}
