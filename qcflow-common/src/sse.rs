//! Server-Sent Events (SSE) utilities

use axum::response::sse::{Event, KeepAlive};
use std::time::Duration;
use tracing::warn;

use crate::events::QcEvent;

/// Heartbeat interval for every SSE stream
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Keep-alive sending a `heartbeat` comment every 15 seconds
pub fn heartbeat_keep_alive() -> KeepAlive {
    KeepAlive::new().interval(HEARTBEAT_INTERVAL).text("heartbeat")
}

/// Serialize an event into an SSE frame named after its type
///
/// Returns `None` (and logs) when serialization fails.
pub fn to_sse_event(event: &QcEvent) -> Option<Event> {
    let event_type = event.event_type();
    match serde_json::to_string(event) {
        Ok(json) => Some(Event::default().event(event_type).data(json)),
        Err(e) => {
            warn!("SSE: Failed to serialize event {}: {}", event_type, e);
            None
        }
    }
}

/// Initial frame sent when a client connects
pub fn connected_event() -> Event {
    Event::default().event("ConnectionStatus").data("connected")
}
