//! Google token repository — credential records for the API wrapper layer.
//!
//! Append-only: every refresh inserts a new row and readers take the
//! latest one. The store never refreshes tokens itself.

use std::collections::BTreeSet;

use rusqlite::{params, Row};

use super::{Database, DatabaseError};

/// A stored credential row.
#[derive(Debug, Clone)]
pub struct GoogleTokenRow {
    pub id: i64,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_uri: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub scopes: Option<String>,
    pub expires_at: Option<String>,
    pub created_at: String,
}

impl GoogleTokenRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            access_token: row.get("access_token")?,
            refresh_token: row.get("refresh_token")?,
            token_uri: row.get("token_uri")?,
            client_id: row.get("client_id")?,
            client_secret: row.get("client_secret")?,
            scopes: row.get("scopes")?,
            expires_at: row.get("expires_at")?,
            created_at: row.get("created_at")?,
        })
    }

    /// Checks if the token is expired (or expires within `buffer_seconds`).
    /// A missing or unparseable expiry is treated as expired.
    pub fn is_expired(&self, buffer_seconds: u64) -> bool {
        let Some(expires_at) = self.expires_at.as_deref() else {
            return true;
        };
        let Ok(expires) = chrono::DateTime::parse_from_rfc3339(expires_at) else {
            return true;
        };
        let now = chrono::Utc::now();
        let buffer = chrono::Duration::seconds(buffer_seconds.min(365 * 24 * 3600) as i64);
        expires <= now + buffer
    }

    /// Checks if the token can be refreshed.
    pub fn can_refresh(&self) -> bool {
        self.refresh_token.is_some()
    }
}

/// Credentials to persist.
#[derive(Debug, Clone)]
pub struct NewGoogleToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_uri: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub scopes: Vec<String>,
    pub expires_at: Option<String>,
}

/// Inserts a credential record. Scopes are stored sorted and
/// deduplicated, comma-joined.
pub fn save(db: &Database, token: &NewGoogleToken) -> Result<(), DatabaseError> {
    let scope_str = token
        .scopes
        .iter()
        .map(String::as_str)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect::<Vec<_>>()
        .join(",");
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO google_tokens
               (access_token, refresh_token, token_uri, client_id, client_secret, scopes, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                token.access_token,
                token.refresh_token,
                token.token_uri,
                token.client_id,
                token.client_secret,
                scope_str,
                token.expires_at,
            ],
        )?;
        Ok(())
    })
}

/// Returns the most recently stored credential, if any.
pub fn latest(db: &Database) -> Result<Option<GoogleTokenRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT * FROM google_tokens ORDER BY id DESC LIMIT 1")?;
        let mut rows = stmt.query_map([], GoogleTokenRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Deletes all stored credentials.
pub fn clear(db: &Database) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute("DELETE FROM google_tokens", [])?;
        Ok(())
    })
}
