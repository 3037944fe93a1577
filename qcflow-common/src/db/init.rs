//! Database initialization
//!
//! Opens (or creates) the SQLite database and applies the schema. Every
//! statement is idempotent, so this runs on each startup.
//!
//! Identifiers are UUIDs stored as BLOB; timestamps are RFC 3339 TEXT; list
//! and map columns hold JSON TEXT.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // WAL allows concurrent readers alongside the single writer
    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;

    init_schema(&pool).await?;

    Ok(pool)
}

/// Apply connection pragmas and create every table and index
///
/// Split from [`init_database`] so tests can run it against their own pools.
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query("PRAGMA foreign_keys = ON").execute(pool).await?;
    sqlx::query("PRAGMA busy_timeout = 5000").execute(pool).await?;

    create_users_table(pool).await?;
    create_sessions_table(pool).await?;
    create_fabrication_processes_table(pool).await?;
    create_lab_analysis_data_table(pool).await?;
    create_fabrication_data_table(pool).await?;
    create_predictions_table(pool).await?;
    create_model_feedback_table(pool).await?;
    create_notifications_tables(pool).await?;
    create_retraining_jobs_table(pool).await?;
    create_model_performance_table(pool).await?;

    Ok(())
}

async fn create_users_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id BLOB PRIMARY KEY,
            username TEXT NOT NULL UNIQUE,
            email TEXT NOT NULL,
            role TEXT NOT NULL CHECK (role IN ('lab-analyst', 'production-analyst', 'manager', 'administrator')),
            status TEXT NOT NULL DEFAULT 'active' CHECK (status IN ('active', 'inactive')),
            department TEXT NOT NULL DEFAULT '',
            password_hash TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_users_role_status ON users(role, status)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_sessions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sessions (
            token BLOB PRIMARY KEY,
            user_id BLOB NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            role TEXT NOT NULL,
            created_at TEXT NOT NULL,
            expires_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_fabrication_processes_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS fabrication_processes (
            id BLOB PRIMARY KEY,
            batch_number TEXT NOT NULL UNIQUE,
            product_name TEXT NOT NULL,
            product_type TEXT NOT NULL DEFAULT '',
            date_time TEXT NOT NULL,
            is_fabricated INTEGER NOT NULL DEFAULT 0,
            is_lab_tested INTEGER NOT NULL DEFAULT 0,
            is_analyzed INTEGER NOT NULL DEFAULT 0,
            created_by BLOB NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_lab_analysis_data_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS lab_analysis_data (
            id BLOB PRIMARY KEY,
            process_id BLOB NOT NULL REFERENCES fabrication_processes(id),
            batch_number TEXT NOT NULL UNIQUE,
            submitted_by BLOB NOT NULL,
            measurements TEXT NOT NULL,
            notes TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_fabrication_data_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS fabrication_data (
            id BLOB PRIMARY KEY,
            process_id BLOB NOT NULL REFERENCES fabrication_processes(id),
            batch_number TEXT NOT NULL UNIQUE,
            submitted_by BLOB NOT NULL,
            measurements TEXT NOT NULL,
            notes TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_predictions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS predictions (
            id BLOB PRIMARY KEY,
            batch_number TEXT NOT NULL,
            product TEXT NOT NULL,
            confidence REAL NOT NULL,
            loss REAL NOT NULL,
            root_cause TEXT NOT NULL,
            category TEXT NOT NULL,
            evidence TEXT NOT NULL,
            capa TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_predictions_batch ON predictions(batch_number, created_at)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_model_feedback_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS model_feedback (
            id BLOB PRIMARY KEY,
            batch_number TEXT NOT NULL,
            product_name TEXT NOT NULL,
            original_prediction TEXT NOT NULL,
            is_correct INTEGER NOT NULL,
            actual_root_cause TEXT,
            actual_capa_actions TEXT NOT NULL DEFAULT '[]',
            comments TEXT,
            manager_id BLOB NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_feedback_batch ON model_feedback(batch_number)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_notifications_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS notifications (
            id BLOB PRIMARY KEY,
            subject TEXT NOT NULL,
            message TEXT NOT NULL,
            priority TEXT NOT NULL CHECK (priority IN ('high', 'medium', 'low')),
            sender TEXT NOT NULL,
            related_type TEXT,
            related_lab_data_id BLOB,
            related_production_data_id BLOB,
            related_batch_number TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // One row per recipient: read state is tracked per user
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS notification_recipients (
            notification_id BLOB NOT NULL REFERENCES notifications(id) ON DELETE CASCADE,
            recipient_id BLOB NOT NULL,
            read_at TEXT,
            PRIMARY KEY (notification_id, recipient_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_recipients_user ON notification_recipients(recipient_id, read_at)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_retraining_jobs_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS retraining_jobs (
            id BLOB PRIMARY KEY,
            status TEXT NOT NULL CHECK (status IN ('queued', 'running', 'completed', 'failed')),
            feedback_count INTEGER NOT NULL,
            requested_by BLOB NOT NULL,
            message TEXT,
            created_at TEXT NOT NULL,
            started_at TEXT,
            finished_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_model_performance_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS model_performance (
            id BLOB PRIMARY KEY,
            recorded_at TEXT NOT NULL,
            total_feedback INTEGER NOT NULL,
            incorrect_feedback INTEGER NOT NULL,
            accuracy REAL NOT NULL,
            job_id BLOB
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
