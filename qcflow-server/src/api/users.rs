//! User administration

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use qcflow_common::validation::require_text;
use qcflow_common::Permission;
use tracing::info;
use uuid::Uuid;

use crate::api::auth::Session;
use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::models::{NewUser, User, UserStatus, UserUpdate};
use crate::AppState;

/// Shortest accepted password
pub const MIN_PASSWORD_LEN: usize = 8;

fn check_password(password: &str) -> ApiResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::BadRequest(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

/// GET /api/users
pub async fn list_users(
    State(state): State<AppState>,
    session: Session,
) -> ApiResult<Json<Vec<User>>> {
    session.require(Permission::UsersRead)?;
    Ok(Json(db::users::list_users(&state.db).await?))
}

/// POST /api/users
pub async fn create_user(
    State(state): State<AppState>,
    session: Session,
    Json(body): Json<NewUser>,
) -> ApiResult<(StatusCode, Json<User>)> {
    session.require(Permission::UsersWrite)?;

    let new_user = NewUser {
        username: require_text("username", &body.username)?,
        email: require_text("email", &body.email)?,
        role: body.role,
        department: body.department,
        password: body.password,
    };
    check_password(&new_user.password)?;

    let user = db::users::create_user(&state.db, &new_user).await?;
    info!(username = %user.username, role = %user.role, created_by = %session.user.username, "User created");

    Ok((StatusCode::CREATED, Json(user)))
}

/// PUT /api/users/:id
///
/// Role, status or password changes end the user's open sessions.
pub async fn update_user(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<Uuid>,
    Json(mut update): Json<UserUpdate>,
) -> ApiResult<Json<User>> {
    session.require(Permission::UsersWrite)?;

    if let Some(email) = update.email.take() {
        update.email = Some(require_text("email", &email)?);
    }

    if id == session.user_id() {
        let demotes = update.role.is_some_and(|role| role != session.role);
        let deactivates = update.status == Some(UserStatus::Inactive);
        if demotes || deactivates {
            return Err(ApiError::BadRequest(
                "Administrators cannot change their own role or status".to_string(),
            ));
        }
    }
    if let Some(password) = &update.password {
        check_password(password)?;
    }

    let user = db::users::update_user(&state.db, id, &update).await?;

    if update.role.is_some() || update.status.is_some() || update.password.is_some() {
        let ended = db::sessions::delete_sessions_for_user(&state.db, id).await?;
        info!(username = %user.username, sessions_ended = ended, "User updated");
    } else {
        info!(username = %user.username, "User updated");
    }

    Ok(Json(user))
}

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/api/users", get(list_users).post(create_user))
        .route("/api/users/:id", put(update_user))
}
