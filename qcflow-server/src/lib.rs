//! qcflow-server library interface
//!
//! Exposes the router and application state so integration tests can drive
//! the service without binding a port.

pub mod api;
pub mod bootstrap;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;

pub use crate::error::{ApiError, ApiResult};

use axum::routing::get;
use axum::Router;
use chrono::{DateTime, Utc};
use qcflow_common::events::EventBus;
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::ServerSettings;
use crate::services::{PredictionService, RetrainingQueue};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Event bus feeding the SSE stream
    pub event_bus: EventBus,
    /// External prediction service
    pub prediction: Arc<dyn PredictionService>,
    /// Hand-off queue to the retraining worker
    pub retraining: RetrainingQueue,
    pub settings: Arc<ServerSettings>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        db: SqlitePool,
        event_bus: EventBus,
        prediction: Arc<dyn PredictionService>,
        retraining: RetrainingQueue,
        settings: ServerSettings,
    ) -> Self {
        Self {
            db,
            event_bus,
            prediction,
            retraining,
            settings: Arc::new(settings),
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::health_routes())
        .merge(api::auth_routes())
        .merge(api::push_routes())
        .merge(api::process_routes())
        .merge(api::measurement_routes())
        .merge(api::root_cause_routes())
        .merge(api::feedback_routes())
        .merge(api::retraining_routes())
        .merge(api::notification_routes())
        .merge(api::user_routes())
        .merge(api::stats_routes())
        .route("/api/events", get(api::event_stream))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
