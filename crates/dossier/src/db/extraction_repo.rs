//! Document extraction repository — one row per (folder, document type).
//!
//! Extractions may arrive before the job row exists, so the back
//! reference to `pending_folders` is nullable and maintained with
//! ON DELETE SET NULL rather than a cascade.

use rusqlite::{params, Row};
use serde::Serialize;
use serde_json::Value;

use super::{payload, Database, DatabaseError};

/// A document extraction row with its payload decoded.
///
/// `data` is `None` when the stored payload is empty or corrupt; a bad
/// record degrades to an absent payload instead of failing the query.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentExtractionRow {
    pub id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_folder_id: Option<i64>,
    pub folder_id: String,
    pub doc_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    pub data: Option<Value>,
    pub created_at: String,
    pub updated_at: String,
}

impl DocumentExtractionRow {
    pub(crate) fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        let raw: String = row.get("data_json")?;
        Ok(Self {
            id: row.get("id")?,
            pending_folder_id: row.get("pending_folder_id")?,
            folder_id: row.get("folder_id")?,
            doc_type: row.get("doc_type")?,
            file_id: row.get("file_id")?,
            file_name: row.get("file_name")?,
            data: payload::decode(&raw),
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// Saves an extraction result. Upsert keyed on (`folder_id`,
/// `doc_type`): a re-extraction overwrites the payload, file reference
/// and back reference, keeps the original creation row and refreshes
/// `updated_at`.
pub fn save(
    db: &Database,
    pending_folder_id: Option<i64>,
    folder_id: &str,
    doc_type: &str,
    file_id: Option<&str>,
    file_name: Option<&str>,
    data: &Value,
) -> Result<(), DatabaseError> {
    let encoded = payload::encode(data);
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO document_extractions
               (pending_folder_id, folder_id, doc_type, file_id, file_name, data_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(folder_id, doc_type) DO UPDATE SET
               pending_folder_id = excluded.pending_folder_id,
               file_id = excluded.file_id,
               file_name = excluded.file_name,
               data_json = excluded.data_json,
               updated_at = CURRENT_TIMESTAMP",
            params![pending_folder_id, folder_id, doc_type, file_id, file_name, encoded],
        )?;
        Ok(())
    })
}

/// Fetches a single extraction by its natural key.
pub fn get(
    db: &Database,
    folder_id: &str,
    doc_type: &str,
) -> Result<Option<DocumentExtractionRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM document_extractions WHERE folder_id = ?1 AND doc_type = ?2",
        )?;
        let mut rows = stmt.query_map(params![folder_id, doc_type], DocumentExtractionRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Lists extractions, newest first. Both filters combine with AND;
/// with no filter every record is returned, so callers must treat the
/// unfiltered form as unbounded.
pub fn list(
    db: &Database,
    folder_id: Option<&str>,
    pending_folder_id: Option<i64>,
) -> Result<Vec<DocumentExtractionRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut conditions = Vec::new();
        let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(folder_id) = folder_id {
            conditions.push(format!("folder_id = ?{}", param_values.len() + 1));
            param_values.push(Box::new(folder_id.to_string()));
        }
        if let Some(pending_folder_id) = pending_folder_id {
            conditions.push(format!("pending_folder_id = ?{}", param_values.len() + 1));
            param_values.push(Box::new(pending_folder_id));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let sql = format!(
            "SELECT * FROM document_extractions {} ORDER BY created_at DESC",
            where_clause
        );

        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&sql)?;
        let rows: Vec<DocumentExtractionRow> = stmt
            .query_map(params_ref.as_slice(), DocumentExtractionRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::folder_repo;
    use serde_json::json;

    fn test_db() -> Database {
        Database::open_in_memory().expect("Failed to create test database")
    }

    #[test]
    fn test_save_and_get() {
        let db = test_db();
        let data = json!({"price": 250000, "currency": "EUR"});
        save(&db, None, "folder-1", "acte_vente", Some("file-9"), Some("acte.pdf"), &data).unwrap();

        let found = get(&db, "folder-1", "acte_vente").unwrap().unwrap();
        assert_eq!(found.folder_id, "folder-1");
        assert_eq!(found.doc_type, "acte_vente");
        assert_eq!(found.file_id.as_deref(), Some("file-9"));
        assert_eq!(found.file_name.as_deref(), Some("acte.pdf"));
        assert_eq!(found.data, Some(data));
        assert!(found.pending_folder_id.is_none());
    }

    #[test]
    fn test_get_nonexistent() {
        let db = test_db();
        assert!(get(&db, "folder-1", "acte_vente").unwrap().is_none());
    }

    #[test]
    fn test_save_twice_overwrites() {
        let db = test_db();
        save(&db, None, "f1", "diagnostic", None, None, &json!({"v": 1})).unwrap();
        save(&db, None, "f1", "diagnostic", Some("file-2"), None, &json!({"v": 2})).unwrap();

        let rows = list(&db, Some("f1"), None).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].data, Some(json!({"v": 2})));
        assert_eq!(rows[0].file_id.as_deref(), Some("file-2"));
    }

    #[test]
    fn test_extraction_before_job_exists() {
        // Extraction may land before the job row; the back reference
        // stays null and is filled on the next save.
        let db = test_db();
        save(&db, None, "f1", "photo", None, None, &json!({})).unwrap();

        folder_repo::enqueue(&db, "f1", "Case", "📁").unwrap();
        let job = folder_repo::find_by_folder_id(&db, "f1").unwrap().unwrap();
        save(&db, Some(job.id), "f1", "photo", None, None, &json!({})).unwrap();

        let row = get(&db, "f1", "photo").unwrap().unwrap();
        assert_eq!(row.pending_folder_id, Some(job.id));
    }

    #[test]
    fn test_list_filters_combine() {
        let db = test_db();
        folder_repo::enqueue(&db, "f1", "Case", "📁").unwrap();
        let job = folder_repo::find_by_folder_id(&db, "f1").unwrap().unwrap();

        save(&db, Some(job.id), "f1", "acte_vente", None, None, &json!({})).unwrap();
        save(&db, Some(job.id), "f1", "diagnostic", None, None, &json!({})).unwrap();
        save(&db, None, "f2", "acte_vente", None, None, &json!({})).unwrap();

        assert_eq!(list(&db, None, None).unwrap().len(), 3);
        assert_eq!(list(&db, Some("f1"), None).unwrap().len(), 2);
        assert_eq!(list(&db, None, Some(job.id)).unwrap().len(), 2);
        assert_eq!(list(&db, Some("f2"), Some(job.id)).unwrap().len(), 0);
    }

    #[test]
    fn test_list_newest_first() {
        let db = test_db();
        db.with_conn(|conn| {
            conn.execute_batch(
                "INSERT INTO document_extractions (folder_id, doc_type, data_json, created_at)
                 VALUES ('f1', 'old', '{}', '2026-01-01 00:00:00');
                 INSERT INTO document_extractions (folder_id, doc_type, data_json, created_at)
                 VALUES ('f1', 'new', '{}', '2026-01-02 00:00:00');",
            )?;
            Ok(())
        })
        .unwrap();

        let rows = list(&db, Some("f1"), None).unwrap();
        assert_eq!(rows[0].doc_type, "new");
        assert_eq!(rows[1].doc_type, "old");
    }

    #[test]
    fn test_corrupt_payload_degrades_to_none() {
        let db = test_db();
        save(&db, None, "f1", "good", None, None, &json!({"k": "v"})).unwrap();
        db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO document_extractions (folder_id, doc_type, data_json)
                 VALUES ('f1', 'bad', '{broken')",
                [],
            )?;
            Ok(())
        })
        .unwrap();

        // The corrupt record must not block listing the others.
        let rows = list(&db, Some("f1"), None).unwrap();
        assert_eq!(rows.len(), 2);
        let bad = rows.iter().find(|r| r.doc_type == "bad").unwrap();
        assert!(bad.data.is_none());
        let good = rows.iter().find(|r| r.doc_type == "good").unwrap();
        assert_eq!(good.data, Some(json!({"k": "v"})));
    }

    #[test]
    fn test_non_ascii_payload_round_trip() {
        let db = test_db();
        let data = json!({"adresse": "7 rue des Frères-Lumière, Besançon"});
        save(&db, None, "f1", "acte_vente", None, None, &data).unwrap();

        let row = get(&db, "f1", "acte_vente").unwrap().unwrap();
        assert_eq!(row.data, Some(data));
    }

    #[test]
    fn test_deleting_job_detaches_extraction() {
        let db = test_db();
        folder_repo::enqueue(&db, "f1", "Case", "📁").unwrap();
        let job = folder_repo::find_by_folder_id(&db, "f1").unwrap().unwrap();
        save(&db, Some(job.id), "f1", "photo", None, None, &json!({})).unwrap();

        db.with_conn(|conn| {
            conn.execute("DELETE FROM pending_folders WHERE id = ?1", params![job.id])?;
            Ok(())
        })
        .unwrap();

        // SET NULL, not CASCADE: the extraction survives detached.
        let row = get(&db, "f1", "photo").unwrap().unwrap();
        assert!(row.pending_folder_id.is_none());
    }
}
