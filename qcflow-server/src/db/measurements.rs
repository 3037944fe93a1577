//! Lab analysis and production data records
//!
//! A submission inserts the record and sets the matching process flag in one
//! transaction. The flag update runs first so the transaction takes the write
//! lock before it reads anything.

use chrono::Utc;
use qcflow_common::{Error, Result};
use sqlx::types::Json;
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use uuid::Uuid;

use super::conflict_on_unique;
use crate::models::{FabricationProcess, MeasurementKind, MeasurementRecord};

/// Store a submission for `process` and flip its flag
///
/// A second submission of the same kind for a batch is a conflict.
pub async fn submit(
    pool: &SqlitePool,
    kind: MeasurementKind,
    process: &FabricationProcess,
    submitted_by: Uuid,
    measurements: BTreeMap<String, f64>,
    notes: Option<String>,
) -> Result<MeasurementRecord> {
    let record = MeasurementRecord {
        id: Uuid::new_v4(),
        process_id: process.id,
        batch_number: process.batch_number.clone(),
        submitted_by,
        measurements,
        notes,
        created_at: Utc::now(),
    };

    let mut tx = pool.begin().await?;

    let updated = sqlx::query(&format!(
        "UPDATE fabrication_processes SET {} = 1 WHERE id = ?",
        kind.flag_column()
    ))
    .bind(process.id)
    .execute(&mut *tx)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(Error::NotFound(format!("Batch {}", process.batch_number)));
    }

    sqlx::query(&format!(
        r#"
        INSERT INTO {} (id, process_id, batch_number, submitted_by, measurements, notes, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
        kind.table()
    ))
    .bind(record.id)
    .bind(record.process_id)
    .bind(&record.batch_number)
    .bind(record.submitted_by)
    .bind(Json(&record.measurements))
    .bind(&record.notes)
    .bind(record.created_at)
    .execute(&mut *tx)
    .await
    .map_err(|e| {
        conflict_on_unique(
            e,
            format!(
                "{} data already submitted for batch {}",
                kind.label(),
                record.batch_number
            ),
        )
    })?;

    tx.commit().await?;

    Ok(record)
}

pub async fn get_by_batch(
    pool: &SqlitePool,
    kind: MeasurementKind,
    batch_number: &str,
) -> Result<Option<MeasurementRecord>> {
    let record = sqlx::query_as::<_, MeasurementRecord>(&format!(
        r#"
        SELECT id, process_id, batch_number, submitted_by, measurements, notes, created_at
        FROM {}
        WHERE batch_number = ?
        "#,
        kind.table()
    ))
    .bind(batch_number)
    .fetch_optional(pool)
    .await?;
    Ok(record)
}
