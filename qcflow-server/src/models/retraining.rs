//! Retraining jobs and model performance history

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Job lifecycle: queued → running → completed | failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Queued or running
    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Queued | JobStatus::Running)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct RetrainingJob {
    pub id: Uuid,
    pub status: JobStatus,
    /// Counted feedback at request time
    pub feedback_count: i64,
    pub requested_by: Uuid,
    /// Failure reason or training service reply
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Accuracy snapshot written when a retraining job completes
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ModelPerformance {
    pub id: Uuid,
    pub recorded_at: DateTime<Utc>,
    pub total_feedback: i64,
    pub incorrect_feedback: i64,
    /// Share of feedback confirming the prediction, 0..1
    pub accuracy: f64,
    pub job_id: Option<Uuid>,
}

impl ModelPerformance {
    pub fn accuracy_of(total_feedback: i64, incorrect_feedback: i64) -> f64 {
        if total_feedback <= 0 {
            return 0.0;
        }
        (total_feedback - incorrect_feedback).max(0) as f64 / total_feedback as f64
    }
}
