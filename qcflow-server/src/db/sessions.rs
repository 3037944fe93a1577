//! Login sessions
//!
//! The role is copied onto the session at login, so a role change takes
//! effect on the next login. Expiry is checked in Rust against `Utc::now()`.

use chrono::{DateTime, Duration, Utc};
use qcflow_common::{Result, Role};
use sqlx::SqlitePool;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct SessionRecord {
    pub token: Uuid,
    pub user_id: Uuid,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

pub async fn create_session(
    pool: &SqlitePool,
    user_id: Uuid,
    role: Role,
    ttl: Duration,
) -> Result<SessionRecord> {
    let now = Utc::now();
    let session = SessionRecord {
        token: Uuid::new_v4(),
        user_id,
        role,
        created_at: now,
        expires_at: now + ttl,
    };

    sqlx::query(
        "INSERT INTO sessions (token, user_id, role, created_at, expires_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(session.token)
    .bind(session.user_id)
    .bind(session.role)
    .bind(session.created_at)
    .bind(session.expires_at)
    .execute(pool)
    .await?;

    Ok(session)
}

pub async fn get_session(pool: &SqlitePool, token: Uuid) -> Result<Option<SessionRecord>> {
    let session = sqlx::query_as::<_, SessionRecord>(
        "SELECT token, user_id, role, created_at, expires_at FROM sessions WHERE token = ?",
    )
    .bind(token)
    .fetch_optional(pool)
    .await?;
    Ok(session)
}

pub async fn delete_session(pool: &SqlitePool, token: Uuid) -> Result<()> {
    sqlx::query("DELETE FROM sessions WHERE token = ?")
        .bind(token)
        .execute(pool)
        .await?;
    Ok(())
}

/// Drop every session of a user (deactivation, role or password change)
pub async fn delete_sessions_for_user(pool: &SqlitePool, user_id: Uuid) -> Result<u64> {
    let result = sqlx::query("DELETE FROM sessions WHERE user_id = ?")
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// Remove sessions that expired before `now`
pub async fn purge_expired(pool: &SqlitePool, now: DateTime<Utc>) -> Result<u64> {
    let sessions = sqlx::query_as::<_, SessionRecord>(
        "SELECT token, user_id, role, created_at, expires_at FROM sessions",
    )
    .fetch_all(pool)
    .await?;

    let mut removed = 0;
    for session in sessions.iter().filter(|s| s.is_expired(now)) {
        delete_session(pool, session.token).await?;
        removed += 1;
    }
    Ok(removed)
}
