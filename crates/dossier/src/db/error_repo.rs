//! Processing error repository — append-only failure history per job.
//!
//! The job row's own status/error_reason stays the single source of
//! truth for "is this job in trouble"; these rows hold the detailed
//! history and are cleared before a retry.

use rusqlite::{params, Row};
use serde::Serialize;

use super::{Database, DatabaseError};

/// A processing error row.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingErrorRow {
    pub id: i64,
    pub pending_folder_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_payload: Option<String>,
    pub created_at: String,
}

impl ProcessingErrorRow {
    pub(crate) fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            pending_folder_id: row.get("pending_folder_id")?,
            stage: row.get("stage")?,
            doc_type: row.get("doc_type")?,
            error_code: row.get("error_code")?,
            message: row.get("message")?,
            raw_payload: row.get("raw_payload")?,
            created_at: row.get("created_at")?,
        })
    }
}

/// Appends one error row. Never overwrites.
pub fn log(
    db: &Database,
    pending_folder_id: i64,
    stage: Option<&str>,
    doc_type: Option<&str>,
    error_code: Option<&str>,
    message: &str,
    raw_payload: Option<&str>,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO processing_errors
               (pending_folder_id, stage, doc_type, error_code, message, raw_payload)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![pending_folder_id, stage, doc_type, error_code, message, raw_payload],
        )?;
        Ok(())
    })
}

/// Deletes all error rows for a job. Called before a retry so stale
/// failures from earlier attempts do not accumulate.
pub fn clear(db: &Database, pending_folder_id: i64) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "DELETE FROM processing_errors WHERE pending_folder_id = ?1",
            params![pending_folder_id],
        )?;
        Ok(())
    })
}

/// Lists error rows for a job in stable replay order.
pub fn list(
    db: &Database,
    pending_folder_id: i64,
) -> Result<Vec<ProcessingErrorRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM processing_errors
             WHERE pending_folder_id = ?1
             ORDER BY created_at ASC, id ASC",
        )?;
        let rows: Vec<ProcessingErrorRow> = stmt
            .query_map(params![pending_folder_id], ProcessingErrorRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}
