//! Sessions and the permission gate
//!
//! Every protected handler takes a [`Session`] extractor, which rejects the
//! request with 401 when there is no valid session, and then calls
//! [`Session::require`] with the route's permission (403 when missing).

use axum::{
    async_trait,
    extract::{FromRequestParts, State},
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use qcflow_common::password::verify_password;
use qcflow_common::{Permission, Role};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::models::User;
use crate::AppState;

/// Authenticated caller
///
/// The role is the one resolved at login, not re-read from the user row.
#[derive(Debug, Clone)]
pub struct Session {
    pub token: Uuid,
    pub user: User,
    pub role: Role,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn user_id(&self) -> Uuid {
        self.user.id
    }

    /// 403 unless the session's role grants `permission`
    pub fn require(&self, permission: Permission) -> ApiResult<()> {
        if self.role.allows(permission) {
            Ok(())
        } else {
            debug!(
                user = %self.user.username,
                role = %self.role,
                permission = %permission,
                "Permission denied"
            );
            Err(ApiError::Forbidden(format!(
                "Role {} lacks permission {}",
                self.role, permission
            )))
        }
    }

    /// Resolve a raw token string to a live session
    pub async fn from_token(state: &AppState, raw_token: &str) -> ApiResult<Self> {
        let token = Uuid::parse_str(raw_token.trim())
            .map_err(|_| ApiError::Unauthorized("Malformed session token".to_string()))?;

        let record = db::sessions::get_session(&state.db, token)
            .await?
            .ok_or_else(|| ApiError::Unauthorized("Unknown session".to_string()))?;

        if record.is_expired(Utc::now()) {
            db::sessions::delete_session(&state.db, token).await?;
            return Err(ApiError::Unauthorized("Session expired".to_string()));
        }

        let user = db::users::get_user(&state.db, record.user_id)
            .await?
            .ok_or_else(|| ApiError::Unauthorized("Unknown session".to_string()))?;

        if !user.is_active() {
            return Err(ApiError::Unauthorized("Account is inactive".to_string()));
        }

        Ok(Session {
            token,
            user,
            role: record.role,
            expires_at: record.expires_at,
        })
    }
}

#[async_trait]
impl FromRequestParts<AppState> for Session {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| ApiError::Unauthorized("Missing Authorization header".to_string()))?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| ApiError::Unauthorized("Expected a Bearer token".to_string()))?;

        Session::from_token(state, token).await
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: Uuid,
    pub expires_at: DateTime<Utc>,
    pub user: User,
    pub permissions: Vec<&'static str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    pub user: User,
    pub role: Role,
    pub permissions: Vec<&'static str>,
    pub expires_at: DateTime<Utc>,
}

fn permission_names(role: Role) -> Vec<&'static str> {
    role.permissions().iter().map(|p| p.as_str()).collect()
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    let invalid = || ApiError::Unauthorized("Invalid username or password".to_string());

    let user = db::users::find_by_username(&state.db, &request.username)
        .await?
        .ok_or_else(invalid)?;

    if !verify_password(&request.password, &user.password_hash) {
        warn!(username = %user.username, "Failed login");
        return Err(invalid());
    }

    if !user.is_active() {
        warn!(username = %user.username, "Login refused for inactive account");
        return Err(ApiError::Unauthorized("Account is inactive".to_string()));
    }

    let session =
        db::sessions::create_session(&state.db, user.id, user.role, state.settings.session_ttl)
            .await?;
    info!(username = %user.username, role = %user.role, "Login");

    Ok(Json(LoginResponse {
        token: session.token,
        expires_at: session.expires_at,
        permissions: permission_names(session.role),
        user,
    }))
}

/// POST /api/auth/logout
pub async fn logout(State(state): State<AppState>, session: Session) -> ApiResult<StatusCode> {
    db::sessions::delete_session(&state.db, session.token).await?;
    info!(username = %session.user.username, "Logout");
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/auth/me
pub async fn me(session: Session) -> Json<MeResponse> {
    Json(MeResponse {
        permissions: permission_names(session.role),
        role: session.role,
        expires_at: session.expires_at,
        user: session.user,
    })
}

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/me", get(me))
}
