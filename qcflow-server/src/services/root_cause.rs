//! Batch root-cause workflow
//!
//! ```text
//! Searching ─┬─> NotFound
//!            ├─> FoundAnalyzed                      (stored prediction, no call)
//!            └─> FoundUnanalyzed ─> Analyzing ─┬─> AnalysisComplete
//!                                              └─> AnalysisFailed
//! ```
//!
//! Every transition is published as `AnalysisStateChanged`. A failed analysis
//! persists nothing and leaves the batch unanalyzed, so it can be retried.

use chrono::Utc;
use qcflow_common::events::{AnalysisState, EventBus, QcEvent};
use serde::Serialize;
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{info, warn};

use crate::db;
use crate::models::{
    FabricationProcess, ModelFeedback, Notification, Priority, RelatedData, RootCauseCategory,
    StoredPrediction,
};
use crate::services::notifier::{self, NotificationDraft};
use crate::services::prediction_client::{PredictionError, PredictionService};

/// Sender shown on CAPA notifications
pub const CAPA_SENDER: &str = "Root Cause Analysis";

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Prediction(#[from] PredictionError),

    #[error(transparent)]
    Common(#[from] qcflow_common::Error),
}

/// Stored analysis of a batch
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    pub process: FabricationProcess,
    pub prediction: StoredPrediction,
    pub feedback: Vec<ModelFeedback>,
    /// CAPA notification sent by this analysis, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification: Option<Notification>,
    /// Set when the analysis stands but the notification could not be sent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification_error: Option<String>,
}

/// Where the workflow stopped
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum WorkflowOutcome {
    #[serde(rename_all = "camelCase")]
    NotFound { batch_number: String },

    /// Lookup only: batch exists but has no prediction yet
    #[serde(rename_all = "camelCase")]
    FoundUnanalyzed { process: FabricationProcess },

    FoundAnalyzed(AnalysisReport),

    AnalysisComplete(AnalysisReport),
}

impl WorkflowOutcome {
    pub fn state(&self) -> AnalysisState {
        match self {
            WorkflowOutcome::NotFound { .. } => AnalysisState::NotFound,
            WorkflowOutcome::FoundUnanalyzed { .. } => AnalysisState::FoundUnanalyzed,
            WorkflowOutcome::FoundAnalyzed(_) => AnalysisState::FoundAnalyzed,
            WorkflowOutcome::AnalysisComplete(_) => AnalysisState::AnalysisComplete,
        }
    }

    pub fn report(&self) -> Option<&AnalysisReport> {
        match self {
            WorkflowOutcome::FoundAnalyzed(report) | WorkflowOutcome::AnalysisComplete(report) => {
                Some(report)
            }
            _ => None,
        }
    }
}

/// Root-cause workflow over shared application resources
pub struct RootCauseWorkflow<'a> {
    pub db: &'a SqlitePool,
    pub event_bus: &'a EventBus,
    pub prediction: &'a dyn PredictionService,
}

impl<'a> RootCauseWorkflow<'a> {
    /// Look a batch up without ever calling the prediction service
    pub async fn lookup(&self, batch_number: &str) -> Result<WorkflowOutcome, WorkflowError> {
        let batch_number = batch_number.trim();
        let Some(process) = db::processes::get_by_batch(self.db, batch_number).await? else {
            return Ok(WorkflowOutcome::NotFound {
                batch_number: batch_number.to_string(),
            });
        };

        if !process.is_analyzed {
            return Ok(WorkflowOutcome::FoundUnanalyzed { process });
        }

        Ok(WorkflowOutcome::FoundAnalyzed(self.stored_report(process).await?))
    }

    /// Run the workflow: search, then analyze when the batch has no prediction
    pub async fn run(&self, batch_number: &str) -> Result<WorkflowOutcome, WorkflowError> {
        let batch_number = batch_number.trim();
        self.publish(batch_number, AnalysisState::Searching);

        let Some(process) = db::processes::get_by_batch(self.db, batch_number).await? else {
            info!(batch_number, "Batch not found");
            self.publish(batch_number, AnalysisState::NotFound);
            return Ok(WorkflowOutcome::NotFound {
                batch_number: batch_number.to_string(),
            });
        };

        if process.is_analyzed {
            self.publish(batch_number, AnalysisState::FoundAnalyzed);
            return Ok(WorkflowOutcome::FoundAnalyzed(self.stored_report(process).await?));
        }

        self.publish(batch_number, AnalysisState::FoundUnanalyzed);
        self.publish(batch_number, AnalysisState::Analyzing);

        match self.analyze(process).await {
            Ok(outcome) => {
                self.publish(batch_number, outcome.state());
                Ok(outcome)
            }
            Err(e) => {
                warn!(batch_number, "Analysis failed: {}", e);
                self.publish(batch_number, AnalysisState::AnalysisFailed);
                Err(e)
            }
        }
    }

    async fn analyze(&self, process: FabricationProcess) -> Result<WorkflowOutcome, WorkflowError> {
        let batch_number = process.batch_number.clone();

        let mut result = self.prediction.predict(&batch_number).await?;
        let category = result.validate().map_err(PredictionError::Invalid)?;
        if category == RootCauseCategory::Unclassified {
            warn!(
                batch_number = %batch_number,
                root_cause = %result.root_cause,
                "Unrecognized root-cause category, routing to production"
            );
        }

        // Store under the batch that was asked for, whatever the service echoes
        if !result.batch_number.is_empty() && result.batch_number != batch_number {
            warn!(
                batch_number = %batch_number,
                returned = %result.batch_number,
                "Prediction service echoed a different batch number"
            );
        }
        result.batch_number = batch_number.clone();
        if result.product.trim().is_empty() {
            result.product = process.product_name.clone();
        }

        let Some(prediction) =
            db::predictions::store_if_unanalyzed(self.db, process.id, &result, category).await?
        else {
            info!(batch_number = %batch_number, "Batch analyzed concurrently, returning stored result");
            let process = self.reload(&batch_number).await?;
            return Ok(WorkflowOutcome::FoundAnalyzed(self.stored_report(process).await?));
        };

        info!(
            batch_number = %batch_number,
            category = %category,
            confidence = prediction.confidence,
            "Prediction stored"
        );

        let process = self.reload(&batch_number).await?;
        self.event_bus.emit_lossy(QcEvent::ProcessFlagsChanged {
            batch_number: batch_number.clone(),
            is_fabricated: process.is_fabricated,
            is_lab_tested: process.is_lab_tested,
            is_analyzed: process.is_analyzed,
            timestamp: Utc::now(),
        });

        let (notification, notification_error) =
            match self.dispatch_capa(&process, &prediction).await {
                Ok(notification) => (notification, None),
                Err(e) => {
                    warn!(batch_number = %batch_number, "CAPA notification failed: {}", e);
                    (None, Some(e.to_string()))
                }
            };

        let feedback = db::feedback::list_for_batch(self.db, &batch_number).await?;

        Ok(WorkflowOutcome::AnalysisComplete(AnalysisReport {
            process,
            prediction,
            feedback,
            notification,
            notification_error,
        }))
    }

    /// Notify the role pool responsible for the predicted category
    async fn dispatch_capa(
        &self,
        process: &FabricationProcess,
        prediction: &StoredPrediction,
    ) -> qcflow_common::Result<Option<Notification>> {
        let role = prediction.category.responsible_role();
        let mut message = format!(
            "Root cause for batch {} ({}): {} (confidence {:.0}%).",
            process.batch_number,
            process.product_name,
            prediction.root_cause,
            prediction.confidence * 100.0
        );
        if !prediction.capa.is_empty() {
            message.push_str("\nCAPA actions:");
            for action in &prediction.capa {
                message.push_str("\n- ");
                message.push_str(action);
            }
        }

        let draft = NotificationDraft {
            subject: format!("CAPA required: batch {}", process.batch_number),
            message,
            priority: Priority::High,
            sender: CAPA_SENDER.to_string(),
            related_data: Some(RelatedData::capa(&process.batch_number)),
        };

        notifier::notify_role(self.db, self.event_bus, role, draft).await
    }

    async fn stored_report(
        &self,
        process: FabricationProcess,
    ) -> Result<AnalysisReport, WorkflowError> {
        let prediction = db::predictions::latest_for_batch(self.db, &process.batch_number)
            .await?
            .ok_or_else(|| {
                qcflow_common::Error::Internal(format!(
                    "Batch {} is analyzed but has no prediction",
                    process.batch_number
                ))
            })?;
        let feedback = db::feedback::list_for_batch(self.db, &process.batch_number).await?;

        Ok(AnalysisReport {
            process,
            prediction,
            feedback,
            notification: None,
            notification_error: None,
        })
    }

    async fn reload(&self, batch_number: &str) -> Result<FabricationProcess, WorkflowError> {
        let process = db::processes::get_by_batch(self.db, batch_number)
            .await?
            .ok_or_else(|| qcflow_common::Error::NotFound(format!("Batch {}", batch_number)))?;
        Ok(process)
    }

    fn publish(&self, batch_number: &str, state: AnalysisState) {
        self.event_bus.emit_lossy(QcEvent::AnalysisStateChanged {
            batch_number: batch_number.to_string(),
            state,
            timestamp: Utc::now(),
        });
    }
}
