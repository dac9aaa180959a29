//! Pending folder repository — the durable job queue.
//!
//! One row per case folder under evaluation, unique on `folder_id`.
//! `enqueue` is the only path back to `queued` from a terminal status;
//! it resets error_reason and processed_at in the same statement.

use rusqlite::{params, Row};
use serde::Serialize;

use super::{Database, DatabaseError};

/// Job lifecycle status. The four values are authoritative at the API
/// boundary; rows written by older tools may carry other strings, which
/// reads preserve as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Done,
    Error,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Done => "done",
            JobStatus::Error => "error",
        }
    }

    /// Parses a stored status string. Returns `None` for anything
    /// outside the four recognized values.
    pub fn parse(s: &str) -> Option<JobStatus> {
        match s {
            "queued" => Some(JobStatus::Queued),
            "processing" => Some(JobStatus::Processing),
            "done" => Some(JobStatus::Done),
            "error" => Some(JobStatus::Error),
            _ => None,
        }
    }
}

/// A raw pending folder row from the database.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingFolderRow {
    pub id: i64,
    pub folder_id: String,
    pub name: String,
    pub emoji: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<String>,
}

impl PendingFolderRow {
    pub(crate) fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            folder_id: row.get("folder_id")?,
            name: row.get("name")?,
            emoji: row.get("emoji")?,
            status: row.get("status")?,
            error_reason: row.get("error_reason")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            processed_at: row.get("processed_at")?,
        })
    }
}

/// Enqueues a folder for processing. Idempotent upsert: a new
/// `folder_id` is inserted as `queued`; an existing one is reset to
/// `queued` with error_reason and processed_at cleared and name/emoji
/// refreshed. This is the canonical re-queue path for retries.
pub fn enqueue(
    db: &Database,
    folder_id: &str,
    name: &str,
    emoji: &str,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO pending_folders (folder_id, name, emoji, status)
             VALUES (?1, ?2, ?3, 'queued')
             ON CONFLICT(folder_id) DO UPDATE SET
               name = excluded.name,
               emoji = excluded.emoji,
               status = 'queued',
               error_reason = NULL,
               updated_at = CURRENT_TIMESTAMP,
               processed_at = NULL",
            params![folder_id, name, emoji],
        )?;
        log::debug!("Enqueued folder {}", folder_id);
        Ok(())
    })
}

/// Lists jobs, optionally filtered by exact status, oldest first
/// (FIFO order for a consuming worker).
pub fn list(
    db: &Database,
    status: Option<JobStatus>,
) -> Result<Vec<PendingFolderRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut sql = String::from("SELECT * FROM pending_folders");
        let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
        if let Some(status) = status {
            sql.push_str(" WHERE status = ?1");
            param_values.push(Box::new(status.as_str().to_string()));
        }
        sql.push_str(" ORDER BY created_at ASC");

        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&sql)?;
        let rows: Vec<PendingFolderRow> = stmt
            .query_map(params_ref.as_slice(), PendingFolderRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Finds a job by its external folder ID.
pub fn find_by_folder_id(
    db: &Database,
    folder_id: &str,
) -> Result<Option<PendingFolderRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM pending_folders WHERE folder_id = ?1")?;
        let mut rows = stmt.query_map(params![folder_id], PendingFolderRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Updates the status (and error reason) of a job. `processed_at` is
/// derived from the new status: set on `done`, cleared on `queued` or
/// `processing`, preserved on `error`. Returns the number of affected
/// rows; an unknown `folder_id` affects zero rows and is not an error.
pub fn update_status(
    db: &Database,
    folder_id: &str,
    status: JobStatus,
    error_reason: Option<&str>,
) -> Result<usize, DatabaseError> {
    db.with_conn(|conn| {
        let affected = conn.execute(
            "UPDATE pending_folders
             SET status = ?2,
                 error_reason = ?3,
                 updated_at = CURRENT_TIMESTAMP,
                 processed_at = CASE
                     WHEN ?2 = 'done' THEN CURRENT_TIMESTAMP
                     WHEN ?2 IN ('queued', 'processing') THEN NULL
                     ELSE processed_at
                 END
             WHERE folder_id = ?1",
            params![folder_id, status.as_str(), error_reason],
        )?;
        log::debug!(
            "Status of folder {} set to {} ({} row(s))",
            folder_id,
            status.as_str(),
            affected
        );
        Ok(affected)
    })
}
