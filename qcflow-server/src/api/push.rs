//! Push delivery configuration

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::api::auth::Session;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyResponse {
    pub public_key: String,
}

/// GET /api/push/public-key
pub async fn public_key(
    State(state): State<AppState>,
    _session: Session,
) -> ApiResult<Json<PublicKeyResponse>> {
    let public_key = state
        .settings
        .push_public_key
        .clone()
        .ok_or_else(|| ApiError::NotFound("Push public key is not configured".to_string()))?;
    Ok(Json(PublicKeyResponse { public_key }))
}

pub fn push_routes() -> Router<AppState> {
    Router::new().route("/api/push/public-key", get(public_key))
}
