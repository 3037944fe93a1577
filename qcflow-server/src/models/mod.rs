//! Data models for qcflow-server
//!
//! Row types map 1:1 to the tables created by `qcflow_common::db::init`.
//! JSON bodies use camelCase field names.

pub mod feedback;
pub mod measurement;
pub mod notification;
pub mod prediction;
pub mod process;
pub mod retraining;
pub mod user;

pub use feedback::{ModelFeedback, UserFeedback, Verdict};
pub use measurement::{MeasurementKind, MeasurementRecord};
pub use notification::{NewNotification, Notification, NotificationView, Priority, RelatedData};
pub use prediction::{Evidence, PredictionResult, RootCauseCategory, StoredPrediction};
pub use process::{FabricationProcess, NewProcess};
pub use retraining::{JobStatus, ModelPerformance, RetrainingJob};
pub use user::{NewUser, User, UserStatus, UserUpdate};
