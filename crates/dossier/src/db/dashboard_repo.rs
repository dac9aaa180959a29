//! Dashboard repository — read-only aggregation over the pipeline tables.
//!
//! Composes jobs, extractions, reports and errors into the views the
//! dashboard serves. Documents attach to a job by direct back
//! reference first, falling back to folder-id match for rows written
//! before the job existed.

use std::collections::HashMap;

use rusqlite::params;
use serde::Serialize;

use super::error_repo::ProcessingErrorRow;
use super::extraction_repo::DocumentExtractionRow;
use super::folder_repo::{JobStatus, PendingFolderRow};
use super::report_repo::ReportRow;
use super::{Database, DatabaseError};

/// Global job counters per status bucket. Rows with an unrecognized
/// status count toward `total` only.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStats {
    pub total: i64,
    pub queued: i64,
    pub processing: i64,
    pub done: i64,
    pub error: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_update: Option<String>,
}

/// One job with its documents and report, as served in the job list.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobView {
    pub job: PendingFolderRow,
    pub documents: Vec<DocumentExtractionRow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<ReportRow>,
}

/// A single job with full detail, including its error history.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDetail {
    pub job: PendingFolderRow,
    pub documents: Vec<DocumentExtractionRow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<ReportRow>,
    pub errors: Vec<ProcessingErrorRow>,
}

/// Returns total job count, per-status counts and the most recent
/// `updated_at` across all jobs.
pub fn job_stats(db: &Database) -> Result<JobStats, DatabaseError> {
    db.with_conn(|conn| {
        let total: i64 = conn.query_row("SELECT COUNT(*) FROM pending_folders", [], |r| r.get(0))?;

        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM pending_folders GROUP BY status")?;
        let by_status: Vec<(String, i64)> = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        let last_update: Option<String> =
            conn.query_row("SELECT MAX(updated_at) FROM pending_folders", [], |r| r.get(0))?;

        let mut stats = JobStats {
            total,
            queued: 0,
            processing: 0,
            done: 0,
            error: 0,
            last_update,
        };
        for (status, count) in by_status {
            // Free-text statuses from older tools count toward total only.
            match JobStatus::parse(&status) {
                Some(JobStatus::Queued) => stats.queued = count,
                Some(JobStatus::Processing) => stats.processing = count,
                Some(JobStatus::Done) => stats.done = count,
                Some(JobStatus::Error) => stats.error = count,
                None => {}
            }
        }
        Ok(stats)
    })
}

/// Returns every job (newest first) joined with its extraction records
/// and report. Documents resolve their job by priority order: the
/// direct `pending_folder_id` back reference first, then folder-id
/// match; unattributable documents are dropped from the view.
pub fn jobs_with_extractions(db: &Database) -> Result<Vec<JobView>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM pending_folders ORDER BY created_at DESC")?;
        let jobs: Vec<PendingFolderRow> = stmt
            .query_map([], PendingFolderRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        if jobs.is_empty() {
            return Ok(Vec::new());
        }

        let folder_to_job_id: HashMap<String, i64> = jobs
            .iter()
            .map(|job| (job.folder_id.clone(), job.id))
            .collect();

        let mut stmt =
            conn.prepare("SELECT * FROM document_extractions ORDER BY created_at DESC")?;
        let docs: Vec<DocumentExtractionRow> = stmt
            .query_map([], DocumentExtractionRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        let mut doc_map: HashMap<i64, Vec<DocumentExtractionRow>> = HashMap::new();
        for doc in docs {
            let target_id = doc
                .pending_folder_id
                .or_else(|| folder_to_job_id.get(doc.folder_id.as_str()).copied());
            let Some(target_id) = target_id else {
                continue;
            };
            doc_map.entry(target_id).or_default().push(doc);
        }

        let mut stmt = conn.prepare("SELECT * FROM reports ORDER BY created_at DESC")?;
        let reports: Vec<ReportRow> = stmt
            .query_map([], ReportRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        let mut report_map: HashMap<i64, ReportRow> = reports
            .into_iter()
            .map(|r| (r.pending_folder_id, r))
            .collect();

        Ok(jobs
            .into_iter()
            .map(|job| {
                let documents = doc_map.remove(&job.id).unwrap_or_default();
                let report = report_map.remove(&job.id);
                JobView {
                    job,
                    documents,
                    report,
                }
            })
            .collect())
    })
}

/// Returns a single job with documents, report and full error history.
/// `None` when the folder is unknown.
pub fn job_with_details(db: &Database, folder_id: &str) -> Result<Option<JobDetail>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM pending_folders WHERE folder_id = ?1")?;
        let mut rows = stmt.query_map(params![folder_id], PendingFolderRow::from_row)?;
        let job = match rows.next() {
            Some(Ok(row)) => row,
            Some(Err(e)) => return Err(DatabaseError::Sqlite(e)),
            None => return Ok(None),
        };

        let mut stmt = conn.prepare(
            "SELECT * FROM document_extractions WHERE folder_id = ?1 ORDER BY created_at DESC",
        )?;
        let documents: Vec<DocumentExtractionRow> = stmt
            .query_map(params![folder_id], DocumentExtractionRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt = conn.prepare("SELECT * FROM reports WHERE pending_folder_id = ?1")?;
        let mut report_rows = stmt.query_map(params![job.id], ReportRow::from_row)?;
        let report = match report_rows.next() {
            Some(Ok(row)) => Some(row),
            Some(Err(e)) => return Err(DatabaseError::Sqlite(e)),
            None => None,
        };

        let mut stmt = conn.prepare(
            "SELECT * FROM processing_errors
             WHERE pending_folder_id = ?1
             ORDER BY created_at ASC, id ASC",
        )?;
        let errors: Vec<ProcessingErrorRow> = stmt
            .query_map(params![job.id], ProcessingErrorRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(JobDetail {
            job,
            documents,
            report,
            errors,
        }))
    })
}
