//! Lab analysis and production measurement records
//!
//! The two record kinds share one shape and differ only in the table they
//! live in, the flag they flip and the role they alert.

use chrono::{DateTime, Utc};
use qcflow_common::{Permission, Role};
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeasurementKind {
    /// Instrument results from the QC lab
    Lab,
    /// Process parameters from the production floor
    Production,
}

impl MeasurementKind {
    pub fn table(&self) -> &'static str {
        match self {
            MeasurementKind::Lab => "lab_analysis_data",
            MeasurementKind::Production => "fabrication_data",
        }
    }

    /// Flag on `fabrication_processes` set by a submission
    pub fn flag_column(&self) -> &'static str {
        match self {
            MeasurementKind::Lab => "is_lab_tested",
            MeasurementKind::Production => "is_fabricated",
        }
    }

    /// Role alerted once this kind of data is in
    pub fn complementary_role(&self) -> Role {
        match self {
            MeasurementKind::Lab => Role::ProductionAnalyst,
            MeasurementKind::Production => Role::LabAnalyst,
        }
    }

    pub fn read_permission(&self) -> Permission {
        match self {
            MeasurementKind::Lab => Permission::LabDataRead,
            MeasurementKind::Production => Permission::ProductionDataRead,
        }
    }

    pub fn write_permission(&self) -> Permission {
        match self {
            MeasurementKind::Lab => Permission::LabDataWrite,
            MeasurementKind::Production => Permission::ProductionDataWrite,
        }
    }

    /// `relatedData.type` of the notification raised on submission
    pub fn related_type(&self) -> &'static str {
        match self {
            MeasurementKind::Lab => "lab-data",
            MeasurementKind::Production => "production-data",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            MeasurementKind::Lab => "Lab analysis",
            MeasurementKind::Production => "Production",
        }
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct MeasurementRecord {
    pub id: Uuid,
    pub process_id: Uuid,
    pub batch_number: String,
    pub submitted_by: Uuid,
    #[sqlx(json)]
    pub measurements: BTreeMap<String, f64>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}
