//! Model feedback persistence

use chrono::Utc;
use qcflow_common::config::FeedbackCountMode;
use qcflow_common::Result;
use sqlx::types::Json;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::models::feedback::FeedbackRow;
use crate::models::{ModelFeedback, StoredPrediction, UserFeedback, Verdict};

const FEEDBACK_COLUMNS: &str = "id, batch_number, product_name, original_prediction, is_correct, \
                                actual_root_cause, actual_capa_actions, comments, manager_id, \
                                created_at, updated_at";

/// Columns written for a verdict
struct VerdictColumns {
    is_correct: bool,
    actual_root_cause: Option<String>,
    actual_capa_actions: Vec<String>,
    comments: Option<String>,
}

impl From<&Verdict> for VerdictColumns {
    fn from(verdict: &Verdict) -> Self {
        let feedback = UserFeedback::from(verdict.clone());
        VerdictColumns {
            is_correct: feedback.is_correct,
            actual_root_cause: feedback.actual_root_cause,
            actual_capa_actions: feedback.actual_capa_actions.unwrap_or_default(),
            comments: feedback.comments,
        }
    }
}

/// Insert one feedback record; the verdict must already be normalized
pub async fn insert_feedback(
    pool: &SqlitePool,
    product_name: &str,
    prediction: &StoredPrediction,
    verdict: &Verdict,
    manager_id: Uuid,
) -> Result<ModelFeedback> {
    let id = Uuid::new_v4();
    let now = Utc::now();
    let columns = VerdictColumns::from(verdict);

    sqlx::query(
        r#"
        INSERT INTO model_feedback (id, batch_number, product_name, original_prediction,
                                    is_correct, actual_root_cause, actual_capa_actions,
                                    comments, manager_id, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id)
    .bind(&prediction.batch_number)
    .bind(product_name)
    .bind(Json(prediction))
    .bind(columns.is_correct)
    .bind(&columns.actual_root_cause)
    .bind(Json(&columns.actual_capa_actions))
    .bind(&columns.comments)
    .bind(manager_id)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(ModelFeedback {
        id,
        batch_number: prediction.batch_number.clone(),
        product_name: product_name.to_string(),
        original_prediction: prediction.clone(),
        user_feedback: UserFeedback::from(verdict.clone()),
        manager_id,
        created_at: now,
        updated_at: now,
    })
}

pub async fn get_feedback(pool: &SqlitePool, id: Uuid) -> Result<Option<ModelFeedback>> {
    let row = sqlx::query_as::<_, FeedbackRow>(&format!(
        "SELECT {} FROM model_feedback WHERE id = ?",
        FEEDBACK_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(ModelFeedback::from))
}

/// Oldest first, so a batch's review history reads in order
pub async fn list_for_batch(pool: &SqlitePool, batch_number: &str) -> Result<Vec<ModelFeedback>> {
    let rows = sqlx::query_as::<_, FeedbackRow>(&format!(
        "SELECT {} FROM model_feedback WHERE batch_number = ? ORDER BY created_at",
        FEEDBACK_COLUMNS
    ))
    .bind(batch_number)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(ModelFeedback::from).collect())
}

/// Newest first
pub async fn list_recent(pool: &SqlitePool, limit: i64) -> Result<Vec<ModelFeedback>> {
    let rows = sqlx::query_as::<_, FeedbackRow>(&format!(
        "SELECT {} FROM model_feedback ORDER BY created_at DESC LIMIT ?",
        FEEDBACK_COLUMNS
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(ModelFeedback::from).collect())
}

/// Replace the verdict of an existing record; `None` when the id is unknown
pub async fn update_verdict(
    pool: &SqlitePool,
    id: Uuid,
    verdict: &Verdict,
) -> Result<Option<ModelFeedback>> {
    let columns = VerdictColumns::from(verdict);

    let result = sqlx::query(
        r#"
        UPDATE model_feedback
        SET is_correct = ?, actual_root_cause = ?, actual_capa_actions = ?,
            comments = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(columns.is_correct)
    .bind(&columns.actual_root_cause)
    .bind(Json(&columns.actual_capa_actions))
    .bind(&columns.comments)
    .bind(Utc::now())
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Ok(None);
    }

    get_feedback(pool, id).await
}

/// Feedback counted towards the retraining threshold
pub async fn count_for_retraining(pool: &SqlitePool, mode: FeedbackCountMode) -> Result<i64> {
    let sql = match mode {
        FeedbackCountMode::Incorrect => "SELECT COUNT(*) FROM model_feedback WHERE is_correct = 0",
        FeedbackCountMode::All => "SELECT COUNT(*) FROM model_feedback",
    };
    let count: i64 = sqlx::query_scalar(sql).fetch_one(pool).await?;
    Ok(count)
}

/// (total, incorrect) across all feedback
pub async fn totals(pool: &SqlitePool) -> Result<(i64, i64)> {
    let (total, incorrect): (i64, i64) = sqlx::query_as(
        "SELECT COUNT(*), COALESCE(SUM(CASE WHEN is_correct = 0 THEN 1 ELSE 0 END), 0) FROM model_feedback",
    )
    .fetch_one(pool)
    .await?;
    Ok((total, incorrect))
}
