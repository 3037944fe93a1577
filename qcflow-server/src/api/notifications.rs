//! Notification inbox endpoints
//!
//! Every read operation is scoped to the caller: a user only sees and marks
//! notifications addressed to them.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use qcflow_common::validation::require_text;
use qcflow_common::{Permission, Role};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::auth::Session;
use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::models::{Notification, NotificationView, Priority, RelatedData};
use crate::services::notifier::{self, NotificationDraft};
use crate::AppState;

const DEFAULT_INBOX_LIMIT: i64 = 100;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboxQuery {
    #[serde(default)]
    pub unread_only: bool,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct UnreadCount {
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct MarkAllResponse {
    pub updated: u64,
}

/// POST /api/notifications body: ad-hoc message to a role pool
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest {
    pub role: Role,
    pub subject: String,
    pub message: String,
    #[serde(default = "default_priority")]
    pub priority: Priority,
    #[serde(default)]
    pub related_data: Option<RelatedData>,
}

fn default_priority() -> Priority {
    Priority::Medium
}

#[derive(Debug, Serialize)]
pub struct SendResponse {
    /// `null` when the role has no active users
    pub notification: Option<Notification>,
}

/// GET /api/notifications
pub async fn inbox(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<InboxQuery>,
) -> ApiResult<Json<Vec<NotificationView>>> {
    session.require(Permission::NotificationsRead)?;

    let limit = query.limit.unwrap_or(DEFAULT_INBOX_LIMIT).max(1);
    let notifications = db::notifications::list_for_recipient(
        &state.db,
        session.user_id(),
        query.unread_only,
        limit,
    )
    .await?;
    Ok(Json(notifications))
}

/// GET /api/notifications/unread-count
pub async fn unread_count(
    State(state): State<AppState>,
    session: Session,
) -> ApiResult<Json<UnreadCount>> {
    session.require(Permission::NotificationsRead)?;

    let count = db::notifications::unread_count(&state.db, session.user_id()).await?;
    Ok(Json(UnreadCount { count }))
}

/// POST /api/notifications/:id/read
pub async fn mark_read(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    session.require(Permission::NotificationsRead)?;

    if db::notifications::mark_read(&state.db, id, session.user_id(), Utc::now()).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("Notification {}", id)))
    }
}

/// POST /api/notifications/read-all
pub async fn mark_all_read(
    State(state): State<AppState>,
    session: Session,
) -> ApiResult<Json<MarkAllResponse>> {
    session.require(Permission::NotificationsRead)?;

    let updated = db::notifications::mark_all_read(&state.db, session.user_id(), Utc::now()).await?;
    Ok(Json(MarkAllResponse { updated }))
}

/// POST /api/notifications
pub async fn send(
    State(state): State<AppState>,
    session: Session,
    Json(request): Json<SendRequest>,
) -> ApiResult<(StatusCode, Json<SendResponse>)> {
    session.require(Permission::NotificationsWrite)?;

    let draft = NotificationDraft {
        subject: require_text("subject", &request.subject)?,
        message: require_text("message", &request.message)?,
        priority: request.priority,
        sender: session.user.username.clone(),
        related_data: request.related_data,
    };

    let notification = notifier::notify_role(&state.db, &state.event_bus, request.role, draft).await?;
    let status = if notification.is_some() {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(SendResponse { notification })))
}

pub fn notification_routes() -> Router<AppState> {
    Router::new()
        .route("/api/notifications", get(inbox).post(send))
        .route("/api/notifications/unread-count", get(unread_count))
        .route("/api/notifications/read-all", post(mark_all_read))
        .route("/api/notifications/:id/read", post(mark_read))
}
