//! Fabrication process registry

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One production batch and the flags gating its workflow
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct FabricationProcess {
    pub id: Uuid,
    pub batch_number: String,
    pub product_name: String,
    pub product_type: String,
    pub date_time: DateTime<Utc>,
    /// Production data submitted
    pub is_fabricated: bool,
    /// Lab analysis data submitted
    pub is_lab_tested: bool,
    /// Root-cause prediction stored
    pub is_analyzed: bool,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

/// POST /api/processes body
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProcess {
    pub batch_number: String,
    pub product_name: String,
    #[serde(default)]
    pub product_type: String,
    /// Defaults to the creation time
    #[serde(default)]
    pub date_time: Option<DateTime<Utc>>,
}
