//! Retraining trigger, job status and model performance history

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use qcflow_common::Permission;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::auth::Session;
use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::models::{ModelPerformance, RetrainingJob};
use crate::services::feedback::{self as feedback_service, RetrainingEligibility};
use crate::services::retraining;
use crate::AppState;

const RECENT_JOBS: i64 = 10;
const DEFAULT_HISTORY: i64 = 100;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrainingOverview {
    #[serde(flatten)]
    pub eligibility: RetrainingEligibility,
    pub active_job: Option<RetrainingJob>,
    pub recent_jobs: Vec<RetrainingJob>,
}

/// GET /api/model/retraining
pub async fn overview(
    State(state): State<AppState>,
    session: Session,
) -> ApiResult<Json<RetrainingOverview>> {
    session.require(Permission::FeedbackRead)?;

    let eligibility = feedback_service::eligibility(
        &state.db,
        state.settings.retraining_threshold,
        state.settings.count_mode,
    )
    .await?;
    let active_job = db::retraining::active_job(&state.db).await?;
    let recent_jobs = db::retraining::list_jobs(&state.db, RECENT_JOBS).await?;

    Ok(Json(RetrainingOverview {
        eligibility,
        active_job,
        recent_jobs,
    }))
}

/// POST /api/model/retraining
///
/// 202 with a new job, 200 with the job already in progress, 409 below the
/// threshold.
pub async fn request_retraining(
    State(state): State<AppState>,
    session: Session,
) -> ApiResult<(StatusCode, Json<RetrainingJob>)> {
    session.require(Permission::ModelTrain)?;

    let (job, created) = retraining::request_retraining(
        &state.db,
        &state.event_bus,
        &state.retraining,
        session.user_id(),
        state.settings.retraining_threshold,
        state.settings.count_mode,
    )
    .await?;

    let status = if created {
        StatusCode::ACCEPTED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(job)))
}

/// GET /api/model/retraining/:id
pub async fn get_job(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<RetrainingJob>> {
    session.require(Permission::FeedbackRead)?;

    let job = db::retraining::get_job(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Retraining job {}", id)))?;
    Ok(Json(job))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

/// GET /api/model/performance
pub async fn performance_history(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<Vec<ModelPerformance>>> {
    session.require(Permission::StatisticsRead)?;

    let limit = query.limit.unwrap_or(DEFAULT_HISTORY).max(1);
    let history = db::retraining::list_performance(&state.db, limit).await?;
    Ok(Json(history))
}

pub fn retraining_routes() -> Router<AppState> {
    Router::new()
        .route("/api/model/retraining", get(overview).post(request_retraining))
        .route("/api/model/retraining/:id", get(get_job))
        .route("/api/model/performance", get(performance_history))
}
