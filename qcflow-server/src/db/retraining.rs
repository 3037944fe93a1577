//! Retraining jobs and performance snapshots

use chrono::{DateTime, Utc};
use qcflow_common::{Error, Result};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::models::{JobStatus, ModelPerformance, RetrainingJob};

const JOB_COLUMNS: &str =
    "id, status, feedback_count, requested_by, message, created_at, started_at, finished_at";

/// Insert a queued job unless one is already queued or running
///
/// The existence check and the insert are one statement, so two concurrent
/// requests cannot both create a job. Returns the job and whether it is new.
pub async fn insert_job_if_idle(
    pool: &SqlitePool,
    feedback_count: i64,
    requested_by: Uuid,
) -> Result<(RetrainingJob, bool)> {
    let id = Uuid::new_v4();

    let inserted = sqlx::query(
        r#"
        INSERT INTO retraining_jobs (id, status, feedback_count, requested_by, created_at)
        SELECT ?, 'queued', ?, ?, ?
        WHERE NOT EXISTS (
            SELECT 1 FROM retraining_jobs WHERE status IN ('queued', 'running')
        )
        "#,
    )
    .bind(id)
    .bind(feedback_count)
    .bind(requested_by)
    .bind(Utc::now())
    .execute(pool)
    .await?;

    if inserted.rows_affected() == 1 {
        let job = get_job(pool, id)
            .await?
            .ok_or_else(|| Error::Internal(format!("Retraining job {} vanished", id)))?;
        return Ok((job, true));
    }

    let job = active_job(pool)
        .await?
        .ok_or_else(|| Error::Internal("Active retraining job vanished".to_string()))?;
    Ok((job, false))
}

pub async fn get_job(pool: &SqlitePool, id: Uuid) -> Result<Option<RetrainingJob>> {
    let job = sqlx::query_as::<_, RetrainingJob>(&format!(
        "SELECT {} FROM retraining_jobs WHERE id = ?",
        JOB_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(job)
}

/// The queued or running job, if any
pub async fn active_job(pool: &SqlitePool) -> Result<Option<RetrainingJob>> {
    let job = sqlx::query_as::<_, RetrainingJob>(&format!(
        r#"
        SELECT {} FROM retraining_jobs
        WHERE status IN ('queued', 'running')
        ORDER BY created_at
        LIMIT 1
        "#,
        JOB_COLUMNS
    ))
    .fetch_optional(pool)
    .await?;
    Ok(job)
}

/// Newest first
pub async fn list_jobs(pool: &SqlitePool, limit: i64) -> Result<Vec<RetrainingJob>> {
    let jobs = sqlx::query_as::<_, RetrainingJob>(&format!(
        "SELECT {} FROM retraining_jobs ORDER BY created_at DESC LIMIT ?",
        JOB_COLUMNS
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(jobs)
}

/// queued → running; `false` when the job is not queued
pub async fn mark_running(pool: &SqlitePool, id: Uuid, now: DateTime<Utc>) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE retraining_jobs SET status = 'running', started_at = ? WHERE id = ? AND status = 'queued'",
    )
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Record the final status of a job
pub async fn mark_finished(
    pool: &SqlitePool,
    id: Uuid,
    status: JobStatus,
    message: Option<&str>,
    now: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        "UPDATE retraining_jobs SET status = ?, message = ?, finished_at = ? WHERE id = ?",
    )
    .bind(status)
    .bind(message)
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Fail jobs left queued or running by a previous process
pub async fn fail_interrupted_jobs(pool: &SqlitePool, now: DateTime<Utc>) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE retraining_jobs
        SET status = 'failed', message = 'Interrupted by server restart', finished_at = ?
        WHERE status IN ('queued', 'running')
        "#,
    )
    .bind(now)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

pub async fn insert_performance(
    pool: &SqlitePool,
    total_feedback: i64,
    incorrect_feedback: i64,
    job_id: Option<Uuid>,
) -> Result<ModelPerformance> {
    let snapshot = ModelPerformance {
        id: Uuid::new_v4(),
        recorded_at: Utc::now(),
        total_feedback,
        incorrect_feedback,
        accuracy: ModelPerformance::accuracy_of(total_feedback, incorrect_feedback),
        job_id,
    };

    sqlx::query(
        r#"
        INSERT INTO model_performance (id, recorded_at, total_feedback, incorrect_feedback, accuracy, job_id)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(snapshot.id)
    .bind(snapshot.recorded_at)
    .bind(snapshot.total_feedback)
    .bind(snapshot.incorrect_feedback)
    .bind(snapshot.accuracy)
    .bind(snapshot.job_id)
    .execute(pool)
    .await?;

    Ok(snapshot)
}

/// Oldest first, for charting
pub async fn list_performance(pool: &SqlitePool, limit: i64) -> Result<Vec<ModelPerformance>> {
    let mut history = sqlx::query_as::<_, ModelPerformance>(
        r#"
        SELECT id, recorded_at, total_feedback, incorrect_feedback, accuracy, job_id
        FROM model_performance
        ORDER BY recorded_at DESC
        LIMIT ?
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;
    history.reverse();
    Ok(history)
}
