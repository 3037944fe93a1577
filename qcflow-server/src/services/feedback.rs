//! Manager feedback and the retraining threshold

use chrono::Utc;
use qcflow_common::config::FeedbackCountMode;
use qcflow_common::events::{EventBus, QcEvent};
use qcflow_common::validation::ValidationError;
use serde::Serialize;
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::db;
use crate::models::{ModelFeedback, Verdict};

#[derive(Debug, Error)]
pub enum FeedbackError {
    #[error("No prediction stored for batch {0}")]
    NoPrediction(String),

    #[error("Feedback {0} not found")]
    NotFound(Uuid),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Common(#[from] qcflow_common::Error),
}

/// Whether enough feedback has accumulated to offer retraining
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrainingEligibility {
    pub count: i64,
    pub threshold: i64,
    pub count_mode: FeedbackCountMode,
    pub eligible: bool,
}

impl RetrainingEligibility {
    pub fn new(count: i64, threshold: i64, count_mode: FeedbackCountMode) -> Self {
        Self {
            count,
            threshold,
            count_mode,
            eligible: count >= threshold,
        }
    }
}

/// Record a review of the latest prediction for `batch_number`
///
/// Always creates a new record; reviews are never merged.
pub async fn submit_feedback(
    pool: &SqlitePool,
    event_bus: &EventBus,
    manager_id: Uuid,
    batch_number: &str,
    verdict: Verdict,
) -> Result<ModelFeedback, FeedbackError> {
    let batch_number = batch_number.trim();
    let verdict = verdict.normalized()?;

    let prediction = db::predictions::latest_for_batch(pool, batch_number)
        .await?
        .ok_or_else(|| FeedbackError::NoPrediction(batch_number.to_string()))?;

    let product_name = match db::processes::get_by_batch(pool, batch_number).await? {
        Some(process) => process.product_name,
        None => prediction.product.clone(),
    };

    let feedback =
        db::feedback::insert_feedback(pool, &product_name, &prediction, &verdict, manager_id)
            .await?;

    info!(
        feedback_id = %feedback.id,
        batch_number,
        is_correct = feedback.user_feedback.is_correct,
        "Feedback recorded"
    );
    publish(event_bus, &feedback);

    Ok(feedback)
}

/// Replace a record's verdict with a confirmation
pub async fn confirm(
    pool: &SqlitePool,
    event_bus: &EventBus,
    id: Uuid,
    comments: Option<String>,
) -> Result<ModelFeedback, FeedbackError> {
    update(pool, event_bus, id, Verdict::ConfirmCorrect { comments }).await
}

/// Replace a record's verdict with a correction
pub async fn correct(
    pool: &SqlitePool,
    event_bus: &EventBus,
    id: Uuid,
    actual_root_cause: String,
    actual_capa_actions: Vec<String>,
    comments: Option<String>,
) -> Result<ModelFeedback, FeedbackError> {
    let verdict = Verdict::ReportIncorrect {
        actual_root_cause,
        actual_capa_actions,
        comments,
    };
    update(pool, event_bus, id, verdict).await
}

async fn update(
    pool: &SqlitePool,
    event_bus: &EventBus,
    id: Uuid,
    verdict: Verdict,
) -> Result<ModelFeedback, FeedbackError> {
    let verdict = verdict.normalized()?;
    let feedback = db::feedback::update_verdict(pool, id, &verdict)
        .await?
        .ok_or(FeedbackError::NotFound(id))?;

    info!(feedback_id = %id, is_correct = verdict.is_correct(), "Feedback updated");
    publish(event_bus, &feedback);

    Ok(feedback)
}

pub async fn eligibility(
    pool: &SqlitePool,
    threshold: i64,
    count_mode: FeedbackCountMode,
) -> Result<RetrainingEligibility, FeedbackError> {
    let count = db::feedback::count_for_retraining(pool, count_mode).await?;
    Ok(RetrainingEligibility::new(count, threshold, count_mode))
}

fn publish(event_bus: &EventBus, feedback: &ModelFeedback) {
    event_bus.emit_lossy(QcEvent::FeedbackRecorded {
        feedback_id: feedback.id,
        batch_number: feedback.batch_number.clone(),
        is_correct: feedback.user_feedback.is_correct,
        timestamp: Utc::now(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eligibility_boundary() {
        assert!(!RetrainingEligibility::new(9, 10, FeedbackCountMode::Incorrect).eligible);
        assert!(RetrainingEligibility::new(10, 10, FeedbackCountMode::Incorrect).eligible);
        assert!(RetrainingEligibility::new(11, 10, FeedbackCountMode::All).eligible);
    }
}
