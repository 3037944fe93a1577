//! Lab analysis and production data capture
//!
//! A submission flips the batch flag and alerts the complementary role: lab
//! results go to production analysts and production data to lab analysts.
//! Once both are in, managers are told the batch is ready for analysis.
//! Notification failures are logged; the submission stands.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use qcflow_common::events::QcEvent;
use qcflow_common::validation::{optional_text, require_text, sanitize_measurements};
use qcflow_common::Role;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::api::auth::Session;
use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::models::{
    FabricationProcess, MeasurementKind, MeasurementRecord, Notification, Priority, RelatedData,
};
use crate::services::notifier::{self, NotificationDraft};
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionRequest {
    pub batch_number: String,
    /// Raw form values; numbers or numeric strings
    pub measurements: BTreeMap<String, Value>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionResponse {
    pub record: MeasurementRecord,
    pub process: FabricationProcess,
    /// Ids of the notifications raised by this submission
    pub notifications: Vec<uuid::Uuid>,
}

async fn submit(
    kind: MeasurementKind,
    state: AppState,
    session: Session,
    request: SubmissionRequest,
) -> ApiResult<(StatusCode, Json<SubmissionResponse>)> {
    session.require(kind.write_permission())?;

    let batch_number = require_text("batchNumber", &request.batch_number)?;
    let measurements = sanitize_measurements(&request.measurements)?;
    let notes = optional_text(request.notes.as_deref());

    let process = db::processes::get_by_batch(&state.db, &batch_number)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Batch {}", batch_number)))?;

    let record = db::measurements::submit(
        &state.db,
        kind,
        &process,
        session.user_id(),
        measurements,
        notes,
    )
    .await?;
    info!(
        batch_number = %record.batch_number,
        kind = kind.label(),
        fields = record.measurements.len(),
        submitted_by = %session.user.username,
        "Measurements submitted"
    );

    let process = db::processes::get_by_batch(&state.db, &batch_number)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Batch {}", batch_number)))?;
    state.event_bus.emit_lossy(QcEvent::ProcessFlagsChanged {
        batch_number: process.batch_number.clone(),
        is_fabricated: process.is_fabricated,
        is_lab_tested: process.is_lab_tested,
        is_analyzed: process.is_analyzed,
        timestamp: Utc::now(),
    });

    let mut notifications = Vec::new();
    for (role, draft) in submission_drafts(kind, &process, &record, &session) {
        match notifier::notify_role(&state.db, &state.event_bus, role, draft).await {
            Ok(Some(Notification { id, .. })) => notifications.push(id),
            Ok(None) => {}
            Err(e) => warn!(
                batch_number = %process.batch_number,
                role = %role,
                "Submission notification failed: {}",
                e
            ),
        }
    }

    Ok((
        StatusCode::CREATED,
        Json(SubmissionResponse {
            record,
            process,
            notifications,
        }),
    ))
}

/// Notifications raised by a submission, with their target role
fn submission_drafts(
    kind: MeasurementKind,
    process: &FabricationProcess,
    record: &MeasurementRecord,
    session: &Session,
) -> Vec<(Role, NotificationDraft)> {
    let related = RelatedData {
        kind: kind.related_type().to_string(),
        lab_data_id: (kind == MeasurementKind::Lab).then_some(record.id),
        production_data_id: (kind == MeasurementKind::Production).then_some(record.id),
        batch_number: Some(process.batch_number.clone()),
    };

    let mut drafts = vec![(
        kind.complementary_role(),
        NotificationDraft {
            subject: format!(
                "{} data submitted: batch {}",
                kind.label(),
                process.batch_number
            ),
            message: format!(
                "{} submitted {} values for batch {} ({}).",
                session.user.username,
                record.measurements.len(),
                process.batch_number,
                process.product_name
            ),
            priority: Priority::Medium,
            sender: session.user.username.clone(),
            related_data: Some(related.clone()),
        },
    )];

    if process.is_fabricated && process.is_lab_tested && !process.is_analyzed {
        drafts.push((
            Role::Manager,
            NotificationDraft {
                subject: format!("Batch {} ready for root-cause analysis", process.batch_number),
                message: format!(
                    "Lab and production data are both in for batch {} ({}).",
                    process.batch_number, process.product_name
                ),
                priority: Priority::Low,
                sender: session.user.username.clone(),
                related_data: Some(related),
            },
        ));
    }

    drafts
}

async fn fetch(
    kind: MeasurementKind,
    state: AppState,
    session: Session,
    batch_number: String,
) -> ApiResult<Json<MeasurementRecord>> {
    session.require(kind.read_permission())?;

    let record = db::measurements::get_by_batch(&state.db, kind, batch_number.trim())
        .await?
        .ok_or_else(|| {
            ApiError::NotFound(format!("{} data for batch {}", kind.label(), batch_number))
        })?;
    Ok(Json(record))
}

/// POST /api/lab-data
pub async fn submit_lab_data(
    State(state): State<AppState>,
    session: Session,
    Json(request): Json<SubmissionRequest>,
) -> ApiResult<(StatusCode, Json<SubmissionResponse>)> {
    submit(MeasurementKind::Lab, state, session, request).await
}

/// GET /api/lab-data/:batch
pub async fn get_lab_data(
    State(state): State<AppState>,
    session: Session,
    Path(batch_number): Path<String>,
) -> ApiResult<Json<MeasurementRecord>> {
    fetch(MeasurementKind::Lab, state, session, batch_number).await
}

/// POST /api/production-data
pub async fn submit_production_data(
    State(state): State<AppState>,
    session: Session,
    Json(request): Json<SubmissionRequest>,
) -> ApiResult<(StatusCode, Json<SubmissionResponse>)> {
    submit(MeasurementKind::Production, state, session, request).await
}

/// GET /api/production-data/:batch
pub async fn get_production_data(
    State(state): State<AppState>,
    session: Session,
    Path(batch_number): Path<String>,
) -> ApiResult<Json<MeasurementRecord>> {
    fetch(MeasurementKind::Production, state, session, batch_number).await
}

pub fn measurement_routes() -> Router<AppState> {
    Router::new()
        .route("/api/lab-data", post(submit_lab_data))
        .route("/api/lab-data/:batch", get(get_lab_data))
        .route("/api/production-data", post(submit_production_data))
        .route("/api/production-data/:batch", get(get_production_data))
}
