//! Database access for qcflow-server
//!
//! One module per table group. Schema creation lives in
//! `qcflow_common::db::init`.

pub mod feedback;
pub mod measurements;
pub mod notifications;
pub mod predictions;
pub mod processes;
pub mod retraining;
pub mod sessions;
pub mod statistics;
pub mod users;

/// Map a UNIQUE violation to `Error::Conflict`, pass anything else through
pub(crate) fn conflict_on_unique(err: sqlx::Error, what: impl Into<String>) -> qcflow_common::Error {
    let err = qcflow_common::Error::from(err);
    if err.is_unique_violation() {
        qcflow_common::Error::Conflict(what.into())
    } else {
        err
    }
}
