//! Manager feedback on predictions
//!
//! A review is one of two verdicts. The stored row keeps the prediction it
//! judged as a JSON snapshot so later predictions for the same batch do not
//! rewrite history.

use chrono::{DateTime, Utc};
use qcflow_common::validation::{clean_lines, optional_text, require_text, ValidationError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::StoredPrediction;

/// Manager verdict on a prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Verdict {
    #[serde(rename_all = "camelCase")]
    ConfirmCorrect {
        #[serde(default)]
        comments: Option<String>,
    },

    #[serde(rename_all = "camelCase")]
    ReportIncorrect {
        actual_root_cause: String,
        #[serde(default)]
        actual_capa_actions: Vec<String>,
        #[serde(default)]
        comments: Option<String>,
    },
}

impl Verdict {
    /// Trim text fields and drop blank CAPA lines
    ///
    /// A correction without an actual root cause is rejected.
    pub fn normalized(self) -> Result<Self, ValidationError> {
        match self {
            Verdict::ConfirmCorrect { comments } => Ok(Verdict::ConfirmCorrect {
                comments: optional_text(comments.as_deref()),
            }),
            Verdict::ReportIncorrect {
                actual_root_cause,
                actual_capa_actions,
                comments,
            } => Ok(Verdict::ReportIncorrect {
                actual_root_cause: require_text("actualRootCause", &actual_root_cause)?,
                actual_capa_actions: clean_lines(actual_capa_actions),
                comments: optional_text(comments.as_deref()),
            }),
        }
    }

    pub fn is_correct(&self) -> bool {
        matches!(self, Verdict::ConfirmCorrect { .. })
    }
}

/// Flattened verdict as exposed in API responses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserFeedback {
    pub is_correct: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_root_cause: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_capa_actions: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
}

impl From<Verdict> for UserFeedback {
    fn from(verdict: Verdict) -> Self {
        match verdict {
            Verdict::ConfirmCorrect { comments } => UserFeedback {
                is_correct: true,
                actual_root_cause: None,
                actual_capa_actions: None,
                comments,
            },
            Verdict::ReportIncorrect {
                actual_root_cause,
                actual_capa_actions,
                comments,
            } => UserFeedback {
                is_correct: false,
                actual_root_cause: Some(actual_root_cause),
                actual_capa_actions: Some(actual_capa_actions),
                comments,
            },
        }
    }
}

/// Stored feedback record
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelFeedback {
    pub id: Uuid,
    pub batch_number: String,
    pub product_name: String,
    pub original_prediction: StoredPrediction,
    pub user_feedback: UserFeedback,
    pub manager_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Raw `model_feedback` row
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct FeedbackRow {
    pub id: Uuid,
    pub batch_number: String,
    pub product_name: String,
    #[sqlx(json)]
    pub original_prediction: StoredPrediction,
    pub is_correct: bool,
    pub actual_root_cause: Option<String>,
    #[sqlx(json)]
    pub actual_capa_actions: Vec<String>,
    pub comments: Option<String>,
    pub manager_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<FeedbackRow> for ModelFeedback {
    fn from(row: FeedbackRow) -> Self {
        // CAPA actions only carry meaning for a correction
        let actual_capa_actions = (!row.is_correct).then_some(row.actual_capa_actions);

        ModelFeedback {
            id: row.id,
            batch_number: row.batch_number,
            product_name: row.product_name,
            original_prediction: row.original_prediction,
            user_feedback: UserFeedback {
                is_correct: row.is_correct,
                actual_root_cause: row.actual_root_cause,
                actual_capa_actions,
                comments: row.comments,
            },
            manager_id: row.manager_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
