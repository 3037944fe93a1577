//! Workflow services
//!
//! Business logic between the HTTP handlers and the database layer.

pub mod feedback;
pub mod notifier;
pub mod prediction_client;
pub mod retraining;
pub mod root_cause;
pub mod statistics;

pub use prediction_client::{
    HttpPredictionClient, InsightKind, PredictionError, PredictionService,
    UnconfiguredPredictionService,
};
pub use retraining::{
    spawn_retraining_worker, HttpTrainingClient, RetrainingQueue, TrainingService,
    UnconfiguredTrainingService,
};
pub use root_cause::{RootCauseWorkflow, WorkflowOutcome};
