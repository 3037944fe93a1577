//! Dashboard statistics and prediction-service insights

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use qcflow_common::Permission;
use serde::Deserialize;
use serde_json::Value;

use crate::api::auth::Session;
use crate::error::{ApiError, ApiResult};
use crate::services::statistics::{self, Overview, RootCauseBreakdown};
use crate::services::InsightKind;
use crate::AppState;

const DEFAULT_TOP: i64 = 10;

#[derive(Debug, Deserialize)]
pub struct TopQuery {
    pub top: Option<i64>,
}

/// GET /api/stats/overview
pub async fn overview(State(state): State<AppState>, session: Session) -> ApiResult<Json<Overview>> {
    session.require(Permission::StatisticsRead)?;
    Ok(Json(statistics::overview(&state.db).await?))
}

/// GET /api/stats/root-causes
pub async fn root_causes(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<TopQuery>,
) -> ApiResult<Json<RootCauseBreakdown>> {
    session.require(Permission::StatisticsRead)?;

    let top = query.top.unwrap_or(DEFAULT_TOP).max(1);
    Ok(Json(statistics::root_cause_breakdown(&state.db, top).await?))
}

/// GET /api/insights/:kind
///
/// Passed through from the prediction service unchanged; upstream failures
/// are 502, never replaced with placeholder data.
pub async fn insight(
    State(state): State<AppState>,
    session: Session,
    Path(kind): Path<String>,
) -> ApiResult<Json<Value>> {
    session.require(Permission::StatisticsRead)?;

    let kind: InsightKind = kind.parse().map_err(ApiError::NotFound)?;
    let body = state.prediction.insight(kind).await?;
    Ok(Json(body))
}

pub fn stats_routes() -> Router<AppState> {
    Router::new()
        .route("/api/stats/overview", get(overview))
        .route("/api/stats/root-causes", get(root_causes))
        .route("/api/insights/:kind", get(insight))
}
