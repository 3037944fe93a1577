//! Root-cause analysis endpoints
//!
//! `GET` only looks the batch up; `POST .../analyze` runs the workflow and
//! may call the prediction service. An unknown batch answers 404 with the
//! `not-found` outcome as body.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use qcflow_common::Permission;
use serde::Deserialize;
use tracing::info;

use crate::api::auth::Session;
use crate::db;
use crate::error::ApiResult;
use crate::models::StoredPrediction;
use crate::services::{RootCauseWorkflow, WorkflowOutcome};
use crate::AppState;

const DEFAULT_LIST_LIMIT: i64 = 50;
const MAX_LIST_LIMIT: i64 = 500;

fn with_status(outcome: WorkflowOutcome) -> (StatusCode, Json<WorkflowOutcome>) {
    let status = match outcome {
        WorkflowOutcome::NotFound { .. } => StatusCode::NOT_FOUND,
        _ => StatusCode::OK,
    };
    (status, Json(outcome))
}

fn workflow(state: &AppState) -> RootCauseWorkflow<'_> {
    RootCauseWorkflow {
        db: &state.db,
        event_bus: &state.event_bus,
        prediction: state.prediction.as_ref(),
    }
}

/// GET /api/root-cause/:batch
pub async fn lookup(
    State(state): State<AppState>,
    session: Session,
    Path(batch_number): Path<String>,
) -> ApiResult<(StatusCode, Json<WorkflowOutcome>)> {
    session.require(Permission::RootCauseRead)?;

    let outcome = workflow(&state).lookup(&batch_number).await?;
    Ok(with_status(outcome))
}

/// POST /api/root-cause/:batch/analyze
pub async fn analyze(
    State(state): State<AppState>,
    session: Session,
    Path(batch_number): Path<String>,
) -> ApiResult<(StatusCode, Json<WorkflowOutcome>)> {
    session.require(Permission::RootCauseWrite)?;

    info!(batch_number = %batch_number, requested_by = %session.user.username, "Root-cause analysis requested");
    let outcome = workflow(&state).run(&batch_number).await?;
    Ok(with_status(outcome))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
}

/// GET /api/predictions
pub async fn list_predictions(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<StoredPrediction>>> {
    session.require(Permission::RootCauseRead)?;

    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);
    let predictions = db::predictions::list_recent(&state.db, limit).await?;
    Ok(Json(predictions))
}

pub fn root_cause_routes() -> Router<AppState> {
    Router::new()
        .route("/api/root-cause/:batch", get(lookup))
        .route("/api/root-cause/:batch/analyze", post(analyze))
        .route("/api/predictions", get(list_predictions))
}
