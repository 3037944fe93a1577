//! HTTP API handlers for qcflow-server
//!
//! JSON over REST plus one SSE stream. Every route except `/health` and
//! `/api/auth/login` needs a session.

pub mod auth;
pub mod feedback;
pub mod health;
pub mod measurements;
pub mod notifications;
pub mod processes;
pub mod push;
pub mod retraining;
pub mod root_cause;
pub mod sse;
pub mod stats;
pub mod users;

pub use auth::{auth_routes, Session};
pub use feedback::feedback_routes;
pub use health::health_routes;
pub use measurements::measurement_routes;
pub use notifications::notification_routes;
pub use processes::process_routes;
pub use push::push_routes;
pub use retraining::retraining_routes;
pub use root_cause::root_cause_routes;
pub use sse::event_stream;
pub use stats::stats_routes;
pub use users::user_routes;
