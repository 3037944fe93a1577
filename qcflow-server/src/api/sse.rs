//! Server-Sent Events stream
//!
//! Browsers' EventSource cannot set headers, so the session token may be
//! passed as `?token=`. Each connected user receives only the events
//! `QcEvent::visible_to` allows for them.
//!
//! The session is checked again before every forwarded event and on a
//! timer; the stream ends once it has been logged out, expired or revoked.

use axum::{
    extract::{Query, State},
    http::{header::AUTHORIZATION, HeaderMap},
    response::sse::{Event, Sse},
};
use futures::stream::Stream;
use qcflow_common::sse::{connected_event, heartbeat_keep_alive, to_sse_event};
use serde::Deserialize;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::api::auth::Session;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// How often an idle stream re-validates its session
const SESSION_RECHECK_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    pub token: Option<String>,
}

/// GET /api/events
pub async fn event_stream(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<StreamQuery>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let header_token = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string);
    let token = header_token
        .or(query.token)
        .ok_or_else(|| ApiError::Unauthorized("Missing session token".to_string()))?;

    let session = Session::from_token(&state, &token).await?;
    let user_id = session.user_id();
    let role = session.role;
    info!(username = %session.user.username, "SSE client connected");

    let username = session.user.username.clone();
    let mut rx = state.event_bus.subscribe();
    let mut recheck = tokio::time::interval(SESSION_RECHECK_INTERVAL);
    recheck.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately
    recheck.tick().await;

    let stream = async_stream::stream! {
        yield Ok(connected_event());

        loop {
            let received = tokio::select! {
                received = rx.recv() => Some(received),
                _ = recheck.tick() => None,
            };

            let Some(received) = received else {
                if !session_alive(&state, &token).await {
                    info!(username = %username, "SSE: Session ended, closing stream");
                    break;
                }
                continue;
            };

            match received {
                Ok(event) => {
                    if !session_alive(&state, &token).await {
                        info!(username = %username, "SSE: Session ended, closing stream");
                        break;
                    }
                    if !event.visible_to(user_id, role) {
                        continue;
                    }
                    debug!("SSE: Forwarding {}", event.event_type());
                    if let Some(frame) = to_sse_event(&event) {
                        yield Ok(frame);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("SSE: Client lagged, {} events dropped", skipped);
                }
                Err(RecvError::Closed) => {
                    info!("SSE: Event bus closed");
                    break;
                }
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(heartbeat_keep_alive()))
}

/// Whether the stream's session still authenticates
///
/// Database errors keep the stream open; only a rejected session closes it.
async fn session_alive(state: &AppState, token: &str) -> bool {
    match Session::from_token(state, token).await {
        Ok(_) => true,
        Err(ApiError::Unauthorized(reason)) => {
            debug!("SSE: {}", reason);
            false
        }
        Err(e) => {
            warn!("SSE: Session check failed: {}", e);
            true
        }
    }
}
