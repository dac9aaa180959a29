//! Report repository — at most one report per job, built incrementally.
//!
//! Every save is a merge-patch: each field is independently kept,
//! cleared or overwritten. The read-modify-write runs inside a single
//! transaction under the connection lock, so concurrent patches to the
//! same job serialize to last-committed-wins with no torn rows.

use rusqlite::{params, Row};
use serde::Serialize;
use serde_json::Value;

use super::{payload, Database, DatabaseError};

/// Three-state patch field: keep the stored value, clear it to NULL,
/// or overwrite it. The default is `Keep`, so a `ReportPatch::default()`
/// with one field set touches exactly that field.
///
/// Collapsing `Keep` and `Clear` into a plain `Option` would lose the
/// "leave unchanged" behavior callers depend on.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Patch<T> {
    #[default]
    Keep,
    Clear,
    Set(T),
}

/// Fields of a report save. Structured fields (`*_details`,
/// `final_synthesis`) are JSON-encoded on write; scalars are stored
/// as-is.
#[derive(Debug, Clone, Default)]
pub struct ReportPatch {
    pub plus_value: Patch<f64>,
    pub plus_value_details: Patch<Value>,
    pub evaluation_value: Patch<f64>,
    pub evaluation_details: Patch<Value>,
    pub final_synthesis: Patch<Value>,
    pub final_doc_id: Patch<String>,
    pub final_doc_link: Patch<String>,
}

/// A report row with structured fields decoded.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRow {
    pub id: i64,
    pub pending_folder_id: i64,
    pub folder_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plus_value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plus_value_details: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evaluation_value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evaluation_details: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_synthesis: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_doc_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_doc_link: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl ReportRow {
    pub(crate) fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        let plus_details: Option<String> = row.get("plus_value_details")?;
        let eval_details: Option<String> = row.get("evaluation_details")?;
        let synthesis: Option<String> = row.get("final_synthesis")?;
        Ok(Self {
            id: row.get("id")?,
            pending_folder_id: row.get("pending_folder_id")?,
            folder_id: row.get("folder_id")?,
            plus_value: row.get("plus_value")?,
            plus_value_details: plus_details.as_deref().and_then(payload::decode),
            evaluation_value: row.get("evaluation_value")?,
            evaluation_details: eval_details.as_deref().and_then(payload::decode),
            // Synthesis tolerates free text: a payload that is not valid
            // JSON is surfaced as a plain string value.
            final_synthesis: synthesis
                .map(|raw| payload::decode(&raw).unwrap_or(Value::String(raw))),
            final_doc_id: row.get("final_doc_id")?,
            final_doc_link: row.get("final_doc_link")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// Stored column values read back for patch resolution. Structured
/// fields stay as raw text so a `Keep` writes back exactly what was
/// stored, byte for byte.
#[derive(Default)]
struct StoredReport {
    plus_value: Option<f64>,
    plus_value_details: Option<String>,
    evaluation_value: Option<f64>,
    evaluation_details: Option<String>,
    final_synthesis: Option<String>,
    final_doc_id: Option<String>,
    final_doc_link: Option<String>,
}

fn resolve_scalar<T: Clone>(patch: &Patch<T>, stored: Option<T>) -> Option<T> {
    match patch {
        Patch::Keep => stored,
        Patch::Clear => None,
        Patch::Set(v) => Some(v.clone()),
    }
}

fn resolve_structured(patch: &Patch<Value>, stored: Option<String>) -> Option<String> {
    match patch {
        Patch::Keep => stored,
        Patch::Clear => None,
        Patch::Set(v) => Some(payload::encode(v)),
    }
}

/// Saves a report merge-patch. The first call for a job creates the
/// row; later calls patch it. Fields left at `Patch::Keep` retain their
/// stored value (NULL when no row exists yet).
pub fn save(
    db: &Database,
    pending_folder_id: i64,
    folder_id: &str,
    patch: &ReportPatch,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        let tx = conn.unchecked_transaction()?;

        let existing: Option<StoredReport> = {
            let mut stmt = tx.prepare(
                "SELECT plus_value, plus_value_details, evaluation_value,
                        evaluation_details, final_synthesis, final_doc_id, final_doc_link
                 FROM reports WHERE pending_folder_id = ?1",
            )?;
            let mut rows = stmt.query_map(params![pending_folder_id], |row| {
                Ok(StoredReport {
                    plus_value: row.get(0)?,
                    plus_value_details: row.get(1)?,
                    evaluation_value: row.get(2)?,
                    evaluation_details: row.get(3)?,
                    final_synthesis: row.get(4)?,
                    final_doc_id: row.get(5)?,
                    final_doc_link: row.get(6)?,
                })
            })?;
            match rows.next() {
                Some(Ok(row)) => Some(row),
                Some(Err(e)) => return Err(DatabaseError::Sqlite(e)),
                None => None,
            }
        };
        let stored = existing.unwrap_or_default();

        let plus_value = resolve_scalar(&patch.plus_value, stored.plus_value);
        let plus_details = resolve_structured(&patch.plus_value_details, stored.plus_value_details);
        let eval_value = resolve_scalar(&patch.evaluation_value, stored.evaluation_value);
        let eval_details = resolve_structured(&patch.evaluation_details, stored.evaluation_details);
        let synthesis = resolve_structured(&patch.final_synthesis, stored.final_synthesis);
        let doc_id = resolve_scalar(&patch.final_doc_id, stored.final_doc_id);
        let doc_link = resolve_scalar(&patch.final_doc_link, stored.final_doc_link);

        tx.execute(
            "INSERT INTO reports
               (pending_folder_id, folder_id, plus_value, plus_value_details,
                evaluation_value, evaluation_details, final_synthesis,
                final_doc_id, final_doc_link)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(pending_folder_id) DO UPDATE SET
               folder_id = excluded.folder_id,
               plus_value = excluded.plus_value,
               plus_value_details = excluded.plus_value_details,
               evaluation_value = excluded.evaluation_value,
               evaluation_details = excluded.evaluation_details,
               final_synthesis = excluded.final_synthesis,
               final_doc_id = excluded.final_doc_id,
               final_doc_link = excluded.final_doc_link,
               updated_at = CURRENT_TIMESTAMP",
            params![
                pending_folder_id,
                folder_id,
                plus_value,
                plus_details,
                eval_value,
                eval_details,
                synthesis,
                doc_id,
                doc_link,
            ],
        )?;

        tx.commit()?;
        Ok(())
    })
}

/// Fetches the report for a job.
pub fn get(db: &Database, pending_folder_id: i64) -> Result<Option<ReportRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM reports WHERE pending_folder_id = ?1")?;
        let mut rows = stmt.query_map(params![pending_folder_id], ReportRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}
