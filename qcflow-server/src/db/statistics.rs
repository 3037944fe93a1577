//! Aggregate queries behind the dashboards

use qcflow_common::{Result, Role};
use sqlx::SqlitePool;

use crate::models::RootCauseCategory;

/// Batch counts by workflow flag
#[derive(Debug, Clone, Copy, Default, PartialEq, sqlx::FromRow)]
pub struct ProcessCounts {
    pub total: i64,
    pub fabricated: i64,
    pub lab_tested: i64,
    pub analyzed: i64,
}

pub async fn process_counts(pool: &SqlitePool) -> Result<ProcessCounts> {
    let counts = sqlx::query_as::<_, ProcessCounts>(
        r#"
        SELECT COUNT(*) AS total,
               COALESCE(SUM(is_fabricated), 0) AS fabricated,
               COALESCE(SUM(is_lab_tested), 0) AS lab_tested,
               COALESCE(SUM(is_analyzed), 0) AS analyzed
        FROM fabrication_processes
        "#,
    )
    .fetch_one(pool)
    .await?;
    Ok(counts)
}

/// Confidence of every stored prediction
pub async fn prediction_confidences(pool: &SqlitePool) -> Result<Vec<f64>> {
    let values = sqlx::query_scalar::<_, f64>("SELECT confidence FROM predictions")
        .fetch_all(pool)
        .await?;
    Ok(values)
}

/// Prediction count per category, most frequent first
pub async fn category_counts(pool: &SqlitePool) -> Result<Vec<(RootCauseCategory, i64)>> {
    let rows = sqlx::query_as::<_, (RootCauseCategory, i64)>(
        "SELECT category, COUNT(*) AS n FROM predictions GROUP BY category ORDER BY n DESC, category",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Most frequent root-cause texts
pub async fn top_root_causes(pool: &SqlitePool, limit: i64) -> Result<Vec<(String, i64)>> {
    let rows = sqlx::query_as::<_, (String, i64)>(
        r#"
        SELECT root_cause, COUNT(*) AS n
        FROM predictions
        GROUP BY root_cause
        ORDER BY n DESC, root_cause
        LIMIT ?
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Active user count per role
pub async fn active_users_by_role(pool: &SqlitePool) -> Result<Vec<(Role, i64)>> {
    let rows = sqlx::query_as::<_, (Role, i64)>(
        "SELECT role, COUNT(*) FROM users WHERE status = 'active' GROUP BY role ORDER BY role",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
