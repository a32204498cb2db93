//! SQLite-backed stores for achievement tracking.
//!
//! Two database files stand in for the two stores: `references.sqlite`
//! (accounts, students, lecturers, achievement references) and
//! `documents.sqlite` (achievement documents). Blocking rusqlite work is
//! pushed onto the blocking pool by the async trait adapters.

use anyhow::{anyhow, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

mod adapters;
pub mod documents;
pub mod references;

pub use documents::DocumentDb;
pub use references::{LecturerRecord, ReferenceDb, StudentRecord, UserRecord};

use skp_core::store::{DocumentStore, ReferenceStore, StudentDirectory};

pub(crate) const TARGET: &str = "skp::kernel";

/// Both stores opened from one state directory.
#[derive(Clone)]
pub struct Kernel {
    pub references: ReferenceDb,
    pub documents: DocumentDb,
}

impl Kernel {
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            references: ReferenceDb::open(&dir.join("references.sqlite"))?,
            documents: DocumentDb::open(&dir.join("documents.sqlite"))?,
        })
    }

    pub fn reference_store(&self) -> Arc<dyn ReferenceStore> {
        Arc::new(self.references.clone())
    }

    pub fn student_directory(&self) -> Arc<dyn StudentDirectory> {
        Arc::new(self.references.clone())
    }

    pub fn document_store(&self) -> Arc<dyn DocumentStore> {
        Arc::new(self.documents.clone())
    }
}

/// Opens `path` with the pragmas both stores share and runs `schema` once.
pub(crate) fn open_db(path: &Path, schema: &str) -> Result<()> {
    let conn = Connection::open(path)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    apply_busy_timeout(&conn)?;
    conn.execute_batch(schema)?;
    Ok(())
}

/// Busy timeout (default 5000ms; override with SKP_SQLITE_BUSY_MS)
pub(crate) fn apply_busy_timeout(conn: &Connection) -> Result<()> {
    let busy_ms: u64 = std::env::var("SKP_SQLITE_BUSY_MS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(5000);
    conn.busy_timeout(std::time::Duration::from_millis(busy_ms))?;
    Ok(())
}

pub(crate) fn now_ts() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn conversion_error(
    idx: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

pub(crate) fn ts_col(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

pub(crate) fn opt_ts_col(
    row: &rusqlite::Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(raw) => DateTime::parse_from_rfc3339(&raw)
            .map(|d| Some(d.with_timezone(&Utc)))
            .map_err(|e| conversion_error(idx, e)),
        None => Ok(None),
    }
}

pub(crate) fn uuid_col(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw).map_err(|e| conversion_error(idx, e))
}

pub(crate) fn opt_uuid_col(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Option<Uuid>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(raw) => Uuid::parse_str(&raw)
            .map(Some)
            .map_err(|e| conversion_error(idx, e)),
        None => Ok(None),
    }
}

pub(crate) fn json_col<T: serde::de::DeserializeOwned>(
    row: &rusqlite::Row<'_>,
    idx: usize,
) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| conversion_error(idx, e))
}

pub(crate) async fn blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| anyhow!("join error: {}", e))?
}
