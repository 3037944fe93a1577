//! Fabrication process registry endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use qcflow_common::validation::require_text;
use qcflow_common::Permission;
use serde::Deserialize;
use tracing::info;

use crate::api::auth::Session;
use crate::db;
use crate::db::processes::ProcessFilter;
use crate::error::{ApiError, ApiResult};
use crate::models::{FabricationProcess, NewProcess};
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessQuery {
    pub analyzed: Option<bool>,
    pub fabricated: Option<bool>,
    pub lab_tested: Option<bool>,
}

/// GET /api/processes
pub async fn list_processes(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<ProcessQuery>,
) -> ApiResult<Json<Vec<FabricationProcess>>> {
    session.require(Permission::ProcessesRead)?;

    let filter = ProcessFilter {
        is_analyzed: query.analyzed,
        is_fabricated: query.fabricated,
        is_lab_tested: query.lab_tested,
    };
    let processes = db::processes::list_processes(&state.db, filter).await?;
    Ok(Json(processes))
}

/// POST /api/processes
pub async fn create_process(
    State(state): State<AppState>,
    session: Session,
    Json(body): Json<NewProcess>,
) -> ApiResult<(StatusCode, Json<FabricationProcess>)> {
    session.require(Permission::ProcessesWrite)?;

    let new_process = NewProcess {
        batch_number: require_text("batchNumber", &body.batch_number)?,
        product_name: require_text("productName", &body.product_name)?,
        product_type: body.product_type.trim().to_string(),
        date_time: body.date_time,
    };

    let process = db::processes::create_process(&state.db, &new_process, session.user_id()).await?;
    info!(
        batch_number = %process.batch_number,
        product = %process.product_name,
        created_by = %session.user.username,
        "Batch registered"
    );

    Ok((StatusCode::CREATED, Json(process)))
}

/// GET /api/processes/:batch
pub async fn get_process(
    State(state): State<AppState>,
    session: Session,
    Path(batch_number): Path<String>,
) -> ApiResult<Json<FabricationProcess>> {
    session.require(Permission::ProcessesRead)?;

    let process = db::processes::get_by_batch(&state.db, batch_number.trim())
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Batch {}", batch_number)))?;
    Ok(Json(process))
}

pub fn process_routes() -> Router<AppState> {
    Router::new()
        .route("/api/processes", get(list_processes).post(create_process))
        .route("/api/processes/:batch", get(get_process))
}
