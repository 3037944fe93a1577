//! User account persistence

use chrono::Utc;
use qcflow_common::password::hash_password;
use qcflow_common::{Error, Result, Role};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::conflict_on_unique;
use crate::models::{NewUser, User, UserStatus, UserUpdate};

const USER_COLUMNS: &str =
    "id, username, email, role, status, department, password_hash, created_at, updated_at";

/// Insert a user with a freshly hashed password
pub async fn create_user(pool: &SqlitePool, new_user: &NewUser) -> Result<User> {
    let now = Utc::now();
    let user = User {
        id: Uuid::new_v4(),
        username: new_user.username.trim().to_string(),
        email: new_user.email.trim().to_string(),
        role: new_user.role,
        status: UserStatus::Active,
        department: new_user.department.trim().to_string(),
        password_hash: hash_password(&new_user.password)?,
        created_at: now,
        updated_at: now,
    };

    sqlx::query(
        r#"
        INSERT INTO users (id, username, email, role, status, department,
                           password_hash, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(user.id)
    .bind(&user.username)
    .bind(&user.email)
    .bind(user.role)
    .bind(user.status)
    .bind(&user.department)
    .bind(&user.password_hash)
    .bind(user.created_at)
    .bind(user.updated_at)
    .execute(pool)
    .await
    .map_err(|e| conflict_on_unique(e, format!("Username '{}' already exists", user.username)))?;

    Ok(user)
}

pub async fn get_user(pool: &SqlitePool, id: Uuid) -> Result<Option<User>> {
    let user = sqlx::query_as::<_, User>(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(user)
}

pub async fn find_by_username(pool: &SqlitePool, username: &str) -> Result<Option<User>> {
    let user = sqlx::query_as::<_, User>(&format!(
        "SELECT {} FROM users WHERE username = ?",
        USER_COLUMNS
    ))
    .bind(username.trim())
    .fetch_optional(pool)
    .await?;
    Ok(user)
}

pub async fn list_users(pool: &SqlitePool) -> Result<Vec<User>> {
    let users = sqlx::query_as::<_, User>(&format!(
        "SELECT {} FROM users ORDER BY username",
        USER_COLUMNS
    ))
    .fetch_all(pool)
    .await?;
    Ok(users)
}

/// Apply a partial update; `None` fields keep their value
pub async fn update_user(pool: &SqlitePool, id: Uuid, update: &UserUpdate) -> Result<User> {
    let mut user = get_user(pool, id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("User {}", id)))?;

    if let Some(email) = &update.email {
        user.email = email.trim().to_string();
    }
    if let Some(role) = update.role {
        user.role = role;
    }
    if let Some(status) = update.status {
        user.status = status;
    }
    if let Some(department) = &update.department {
        user.department = department.trim().to_string();
    }
    if let Some(password) = &update.password {
        user.password_hash = hash_password(password)?;
    }
    user.updated_at = Utc::now();

    sqlx::query(
        r#"
        UPDATE users
        SET email = ?, role = ?, status = ?, department = ?,
            password_hash = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&user.email)
    .bind(user.role)
    .bind(user.status)
    .bind(&user.department)
    .bind(&user.password_hash)
    .bind(user.updated_at)
    .bind(user.id)
    .execute(pool)
    .await?;

    Ok(user)
}

/// Ids of every active user holding `role`
pub async fn active_user_ids_by_role(pool: &SqlitePool, role: Role) -> Result<Vec<Uuid>> {
    let ids = sqlx::query_scalar::<_, Uuid>(
        "SELECT id FROM users WHERE role = ? AND status = 'active' ORDER BY username",
    )
    .bind(role)
    .fetch_all(pool)
    .await?;
    Ok(ids)
}

pub async fn count_users(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(pool)
        .await?;
    Ok(count)
}
