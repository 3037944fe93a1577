//! Manager feedback endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use qcflow_common::Permission;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::auth::Session;
use crate::db;
use crate::error::ApiResult;
use crate::models::{ModelFeedback, Verdict};
use crate::services::feedback as feedback_service;
use crate::AppState;

const DEFAULT_LIST_LIMIT: i64 = 100;

/// POST /api/feedback body: batch number plus a tagged verdict
///
/// `{"batchNumber": "AB12", "kind": "report-incorrect", "actualRootCause": ..., "actualCapaActions": [...]}`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRequest {
    pub batch_number: String,
    #[serde(flatten)]
    pub verdict: Verdict,
}

#[derive(Debug, Default, Deserialize)]
pub struct ConfirmRequest {
    #[serde(default)]
    pub comments: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrectionRequest {
    pub actual_root_cause: String,
    #[serde(default)]
    pub actual_capa_actions: Vec<String>,
    #[serde(default)]
    pub comments: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackQuery {
    pub batch_number: Option<String>,
    pub limit: Option<i64>,
}

/// GET /api/feedback
pub async fn list_feedback(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<FeedbackQuery>,
) -> ApiResult<Json<Vec<ModelFeedback>>> {
    session.require(Permission::FeedbackRead)?;

    let feedback = match query.batch_number.as_deref().map(str::trim) {
        Some(batch_number) if !batch_number.is_empty() => {
            db::feedback::list_for_batch(&state.db, batch_number).await?
        }
        _ => {
            let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT).max(1);
            db::feedback::list_recent(&state.db, limit).await?
        }
    };
    Ok(Json(feedback))
}

/// POST /api/feedback
pub async fn submit_feedback(
    State(state): State<AppState>,
    session: Session,
    Json(request): Json<FeedbackRequest>,
) -> ApiResult<(StatusCode, Json<ModelFeedback>)> {
    session.require(Permission::FeedbackWrite)?;

    let feedback = feedback_service::submit_feedback(
        &state.db,
        &state.event_bus,
        session.user_id(),
        &request.batch_number,
        request.verdict,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(feedback)))
}

/// PUT /api/feedback/:id/confirm
pub async fn confirm_feedback(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<Uuid>,
    Json(request): Json<ConfirmRequest>,
) -> ApiResult<Json<ModelFeedback>> {
    session.require(Permission::FeedbackWrite)?;

    let feedback =
        feedback_service::confirm(&state.db, &state.event_bus, id, request.comments).await?;
    Ok(Json(feedback))
}

/// PUT /api/feedback/:id/correction
pub async fn correct_feedback(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<Uuid>,
    Json(request): Json<CorrectionRequest>,
) -> ApiResult<Json<ModelFeedback>> {
    session.require(Permission::FeedbackWrite)?;

    let feedback = feedback_service::correct(
        &state.db,
        &state.event_bus,
        id,
        request.actual_root_cause,
        request.actual_capa_actions,
        request.comments,
    )
    .await?;
    Ok(Json(feedback))
}

pub fn feedback_routes() -> Router<AppState> {
    Router::new()
        .route("/api/feedback", get(list_feedback).post(submit_feedback))
        .route("/api/feedback/:id/confirm", put(confirm_feedback))
        .route("/api/feedback/:id/correction", put(correct_feedback))
}
