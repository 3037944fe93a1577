//! Root-cause predictions
//!
//! [`PredictionResult`] is the payload returned by the external prediction
//! service. It is checked and classified by [`PredictionResult::validate`]
//! before being stored as a [`StoredPrediction`].

use chrono::{DateTime, Utc};
use qcflow_common::Role;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// One piece of evidence behind a prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub name: String,
    pub value: f64,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default)]
    pub status: String,
}

/// Prediction payload from the external service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionResult {
    /// Echo of the requested batch; not every service build sends it
    #[serde(default, alias = "batch_number")]
    pub batch_number: String,
    #[serde(default)]
    pub product: String,
    pub confidence: f64,
    #[serde(default)]
    pub loss: f64,
    #[serde(alias = "root_cause")]
    pub root_cause: String,
    #[serde(default)]
    pub evidence: Vec<Evidence>,
    #[serde(default)]
    pub capa: Vec<String>,
}

impl PredictionResult {
    /// Check the payload and classify its root cause
    ///
    /// Rejects a blank root cause and a confidence outside 0..=1.
    pub fn validate(&self) -> Result<RootCauseCategory, String> {
        if self.root_cause.trim().is_empty() {
            return Err("rootCause is empty".to_string());
        }
        if !self.confidence.is_finite() || !(0.0..=1.0).contains(&self.confidence) {
            return Err(format!("confidence {} outside 0..1", self.confidence));
        }
        if !self.loss.is_finite() {
            return Err("loss is not a finite number".to_string());
        }
        Ok(RootCauseCategory::classify(&self.root_cause))
    }
}

/// Persisted prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct StoredPrediction {
    pub id: Uuid,
    pub batch_number: String,
    pub product: String,
    pub confidence: f64,
    pub loss: f64,
    pub root_cause: String,
    pub category: RootCauseCategory,
    #[sqlx(json)]
    pub evidence: Vec<Evidence>,
    #[sqlx(json)]
    pub capa: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Root-cause category, read from the text before the first `-`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "kebab-case")]
#[sqlx(rename_all = "kebab-case")]
pub enum RootCauseCategory {
    LabError,
    LabIssue,
    EquipmentIssue,
    ProcessError,
    ProcessIssue,
    MaterialIssue,
    OperatorError,
    EnvironmentalIssue,
    Unclassified,
}

/// Category labels as they appear in `rootCause` prefixes
const CATEGORY_LABELS: [(&str, RootCauseCategory); 8] = [
    ("lab error", RootCauseCategory::LabError),
    ("lab issue", RootCauseCategory::LabIssue),
    ("equipment issue", RootCauseCategory::EquipmentIssue),
    ("process error", RootCauseCategory::ProcessError),
    ("process issue", RootCauseCategory::ProcessIssue),
    ("material issue", RootCauseCategory::MaterialIssue),
    ("operator error", RootCauseCategory::OperatorError),
    ("environmental issue", RootCauseCategory::EnvironmentalIssue),
];

impl RootCauseCategory {
    /// Classify a root-cause string such as `"Lab Error-buffer"`
    ///
    /// ```
    /// use qcflow_server::models::RootCauseCategory;
    ///
    /// assert_eq!(RootCauseCategory::classify("Lab Error-buffer"), RootCauseCategory::LabError);
    /// assert_eq!(RootCauseCategory::classify("equipment issue - pump"), RootCauseCategory::EquipmentIssue);
    /// assert_eq!(RootCauseCategory::classify("Granulation drift"), RootCauseCategory::Unclassified);
    /// ```
    pub fn classify(root_cause: &str) -> Self {
        let prefix = root_cause
            .split('-')
            .next()
            .unwrap_or_default()
            .trim()
            .to_lowercase();

        CATEGORY_LABELS
            .iter()
            .find(|(label, _)| *label == prefix)
            .map(|(_, category)| *category)
            .unwrap_or(RootCauseCategory::Unclassified)
    }

    /// Role pool that receives the CAPA notification
    ///
    /// Unclassified causes go to production, the historical default.
    pub fn responsible_role(&self) -> Role {
        match self {
            RootCauseCategory::LabError
            | RootCauseCategory::LabIssue
            | RootCauseCategory::EquipmentIssue => Role::LabAnalyst,
            RootCauseCategory::ProcessError
            | RootCauseCategory::ProcessIssue
            | RootCauseCategory::MaterialIssue
            | RootCauseCategory::OperatorError
            | RootCauseCategory::EnvironmentalIssue
            | RootCauseCategory::Unclassified => Role::ProductionAnalyst,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RootCauseCategory::LabError => "Lab Error",
            RootCauseCategory::LabIssue => "Lab Issue",
            RootCauseCategory::EquipmentIssue => "Equipment Issue",
            RootCauseCategory::ProcessError => "Process Error",
            RootCauseCategory::ProcessIssue => "Process Issue",
            RootCauseCategory::MaterialIssue => "Material Issue",
            RootCauseCategory::OperatorError => "Operator Error",
            RootCauseCategory::EnvironmentalIssue => "Environmental Issue",
            RootCauseCategory::Unclassified => "Unclassified",
        }
    }
}

impl fmt::Display for RootCauseCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prediction(root_cause: &str, confidence: f64) -> PredictionResult {
        PredictionResult {
            batch_number: "AB12".to_string(),
            product: "Augmentin 60ml".to_string(),
            confidence,
            loss: 0.12,
            root_cause: root_cause.to_string(),
            evidence: vec![],
            capa: vec!["Retrain staff".to_string()],
        }
    }

    #[test]
    fn test_lab_categories_route_to_lab() {
        for cause in ["Lab Error-buffer", "Lab Issue-column", "Equipment Issue-HPLC pump"] {
            assert_eq!(
                RootCauseCategory::classify(cause).responsible_role(),
                Role::LabAnalyst,
                "{}",
                cause
            );
        }
    }

    #[test]
    fn test_other_categories_route_to_production() {
        for cause in ["Process Error-mixing time", "Material Issue-API lot", "Drying", ""] {
            assert_eq!(
                RootCauseCategory::classify(cause).responsible_role(),
                Role::ProductionAnalyst,
                "{}",
                cause
            );
        }
    }

    #[test]
    fn test_prefix_must_match_whole_label() {
        assert_eq!(
            RootCauseCategory::classify("Lab Errors-buffer"),
            RootCauseCategory::Unclassified
        );
        assert_eq!(
            RootCauseCategory::classify("  LAB ERROR  -buffer"),
            RootCauseCategory::LabError
        );
    }

    #[test]
    fn test_validate_rejects_bad_payloads() {
        assert!(prediction("  ", 0.5).validate().is_err());
        assert!(prediction("Lab Error-x", 1.5).validate().is_err());
        assert!(prediction("Lab Error-x", f64::NAN).validate().is_err());
        assert_eq!(
            prediction("Lab Error-x", 0.87).validate().unwrap(),
            RootCauseCategory::LabError
        );
    }

    #[test]
    fn test_payload_accepts_camel_and_snake_case() {
        let camel: PredictionResult = serde_json::from_str(
            r#"{"batchNumber":"AB12","product":"P","confidence":0.8,"loss":0.1,"rootCause":"Lab Error-x","evidence":[{"name":"pH","value":7.9,"min":6.5,"max":7.5,"status":"out"}],"capa":["A"]}"#,
        )
        .unwrap();
        let snake: PredictionResult = serde_json::from_str(
            r#"{"batch_number":"AB12","product":"P","confidence":0.8,"loss":0.1,"root_cause":"Lab Error-x","evidence":[{"name":"pH","value":7.9,"min":6.5,"max":7.5,"status":"out"}],"capa":["A"]}"#,
        )
        .unwrap();
        assert_eq!(camel, snake);
        assert_eq!(camel.evidence[0].max, Some(7.5));
    }
}
