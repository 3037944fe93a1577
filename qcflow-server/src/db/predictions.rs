//! Prediction persistence

use chrono::Utc;
use qcflow_common::Result;
use sqlx::types::Json;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::models::{PredictionResult, RootCauseCategory, StoredPrediction};

const PREDICTION_COLUMNS: &str =
    "id, batch_number, product, confidence, loss, root_cause, category, evidence, capa, created_at";

/// Persist a prediction and mark its batch analyzed, atomically
///
/// The flag flip is guarded by `is_analyzed = 0`. When another analysis got
/// there first nothing is written and `None` is returned.
pub async fn store_if_unanalyzed(
    pool: &SqlitePool,
    process_id: Uuid,
    result: &PredictionResult,
    category: RootCauseCategory,
) -> Result<Option<StoredPrediction>> {
    let stored = StoredPrediction {
        id: Uuid::new_v4(),
        batch_number: result.batch_number.clone(),
        product: result.product.clone(),
        confidence: result.confidence,
        loss: result.loss,
        root_cause: result.root_cause.clone(),
        category,
        evidence: result.evidence.clone(),
        capa: result.capa.clone(),
        created_at: Utc::now(),
    };

    let mut tx = pool.begin().await?;

    let flipped = sqlx::query(
        "UPDATE fabrication_processes SET is_analyzed = 1 WHERE id = ? AND is_analyzed = 0",
    )
    .bind(process_id)
    .execute(&mut *tx)
    .await?;

    if flipped.rows_affected() == 0 {
        tx.rollback().await?;
        return Ok(None);
    }

    sqlx::query(
        r#"
        INSERT INTO predictions (id, batch_number, product, confidence, loss, root_cause,
                                 category, evidence, capa, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(stored.id)
    .bind(&stored.batch_number)
    .bind(&stored.product)
    .bind(stored.confidence)
    .bind(stored.loss)
    .bind(&stored.root_cause)
    .bind(stored.category)
    .bind(Json(&stored.evidence))
    .bind(Json(&stored.capa))
    .bind(stored.created_at)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(Some(stored))
}

/// Most recent prediction for a batch
pub async fn latest_for_batch(
    pool: &SqlitePool,
    batch_number: &str,
) -> Result<Option<StoredPrediction>> {
    let prediction = sqlx::query_as::<_, StoredPrediction>(&format!(
        r#"
        SELECT {} FROM predictions
        WHERE batch_number = ?
        ORDER BY created_at DESC
        LIMIT 1
        "#,
        PREDICTION_COLUMNS
    ))
    .bind(batch_number)
    .fetch_optional(pool)
    .await?;
    Ok(prediction)
}

/// Newest first
pub async fn list_recent(pool: &SqlitePool, limit: i64) -> Result<Vec<StoredPrediction>> {
    let predictions = sqlx::query_as::<_, StoredPrediction>(&format!(
        "SELECT {} FROM predictions ORDER BY created_at DESC LIMIT ?",
        PREDICTION_COLUMNS
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(predictions)
}
