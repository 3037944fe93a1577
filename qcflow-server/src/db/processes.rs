//! Fabrication process registry

use chrono::Utc;
use qcflow_common::Result;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::conflict_on_unique;
use crate::models::{FabricationProcess, NewProcess};

const PROCESS_COLUMNS: &str = "id, batch_number, product_name, product_type, date_time, \
                               is_fabricated, is_lab_tested, is_analyzed, created_by, created_at";

/// Optional filters for [`list_processes`]
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessFilter {
    pub is_analyzed: Option<bool>,
    pub is_fabricated: Option<bool>,
    pub is_lab_tested: Option<bool>,
}

/// Register a new batch; all flags start false
///
/// Batch number and product name must already be trimmed and non-empty.
pub async fn create_process(
    pool: &SqlitePool,
    new_process: &NewProcess,
    created_by: Uuid,
) -> Result<FabricationProcess> {
    let now = Utc::now();
    let process = FabricationProcess {
        id: Uuid::new_v4(),
        batch_number: new_process.batch_number.clone(),
        product_name: new_process.product_name.clone(),
        product_type: new_process.product_type.clone(),
        date_time: new_process.date_time.unwrap_or(now),
        is_fabricated: false,
        is_lab_tested: false,
        is_analyzed: false,
        created_by,
        created_at: now,
    };

    sqlx::query(
        r#"
        INSERT INTO fabrication_processes (id, batch_number, product_name, product_type,
                                           date_time, is_fabricated, is_lab_tested,
                                           is_analyzed, created_by, created_at)
        VALUES (?, ?, ?, ?, ?, 0, 0, 0, ?, ?)
        "#,
    )
    .bind(process.id)
    .bind(&process.batch_number)
    .bind(&process.product_name)
    .bind(&process.product_type)
    .bind(process.date_time)
    .bind(process.created_by)
    .bind(process.created_at)
    .execute(pool)
    .await
    .map_err(|e| {
        conflict_on_unique(e, format!("Batch {} already registered", process.batch_number))
    })?;

    Ok(process)
}

pub async fn get_by_batch(pool: &SqlitePool, batch_number: &str) -> Result<Option<FabricationProcess>> {
    let process = sqlx::query_as::<_, FabricationProcess>(&format!(
        "SELECT {} FROM fabrication_processes WHERE batch_number = ?",
        PROCESS_COLUMNS
    ))
    .bind(batch_number)
    .fetch_optional(pool)
    .await?;
    Ok(process)
}

/// Newest first
pub async fn list_processes(
    pool: &SqlitePool,
    filter: ProcessFilter,
) -> Result<Vec<FabricationProcess>> {
    let processes = sqlx::query_as::<_, FabricationProcess>(&format!(
        r#"
        SELECT {} FROM fabrication_processes
        WHERE (?1 IS NULL OR is_analyzed = ?1)
          AND (?2 IS NULL OR is_fabricated = ?2)
          AND (?3 IS NULL OR is_lab_tested = ?3)
        ORDER BY created_at DESC
        "#,
        PROCESS_COLUMNS
    ))
    .bind(filter.is_analyzed)
    .bind(filter.is_fabricated)
    .bind(filter.is_lab_tested)
    .fetch_all(pool)
    .await?;
    Ok(processes)
}
