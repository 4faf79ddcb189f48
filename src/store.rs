//! Durable storage for flushed entries.
//!
//! Everything lives in one append-only `changes` table with textual columns.
//! The table has no key; rows come back in insertion order.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use chrono::{DateTime, Local};
use rusqlite::{params, Connection, Row};
use crate::error::{PersistenceError, StoreResult};
use crate::{ChangeEntry, ChangeKind, ExtensionFilter};

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS changes (
    Extension TEXT,
    Filename TEXT,
    Path TEXT,
    Event TEXT,
    Date TEXT
)";

const INSERT_ROW: &str =
    "INSERT INTO changes (Extension, Filename, Path, Event, Date) VALUES (?1, ?2, ?3, ?4, ?5)";

const SELECT_ALL: &str =
    "SELECT Extension, Filename, Path, Event, Date FROM changes ORDER BY rowid";

const SELECT_BY_EXTENSION: &str =
    "SELECT Extension, Filename, Path, Event, Date FROM changes WHERE Extension = ?1 ORDER BY rowid";

/// Where flushed entries go and how the browser reads them back.
pub trait ChangeStore {
    /// Writes every entry as one row, all or nothing.
    fn append_all(&self, entries: &[ChangeEntry]) -> StoreResult<usize>;

    fn query_all(&self) -> StoreResult<Vec<ChangeEntry>>;

    fn query_by_extension(&self, extension: &str) -> StoreResult<Vec<ChangeEntry>>;

    /// Irreversibly removes every row. Callers confirm before asking.
    fn delete_all(&self) -> StoreResult<usize>;

    fn list(&self, filter: &ExtensionFilter) -> StoreResult<Vec<ChangeEntry>> {
        match filter {
            ExtensionFilter::All => self.query_all(),
            ExtensionFilter::Only(extension) => self.query_by_extension(extension),
        }
    }
}

/// SQLite-backed store. The connection sits behind a mutex so writes from
/// any path are serialized.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl SqliteStore {
    /// Opens `path`, creating the file and table if they do not exist.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let path = path.as_ref();
        let existed = path.exists();
        let conn = Connection::open(path).map_err(|e| PersistenceError::new("open", e))?;
        let store = Self::init(conn, Some(path.to_path_buf()))?;

        if existed {
            tracing::info!("Connection to SQLite database established: {}", path.display());
        } else {
            tracing::info!("SQLite database created: {}", path.display());
        }
        Ok(store)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory().map_err(|e| PersistenceError::new("open", e))?;
        Self::init(conn, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> StoreResult<Self> {
        conn.execute_batch(CREATE_TABLE)
            .map_err(|e| PersistenceError::new("create table", e))?;
        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn select(&self, sql: &str, extension: Option<&str>) -> StoreResult<Vec<ChangeEntry>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(sql).map_err(|e| PersistenceError::new("query", e))?;
        let rows = match extension {
            Some(ext) => stmt.query_map(params![ext], row_to_entry),
            None => stmt.query_map([], row_to_entry),
        }
        .map_err(|e| PersistenceError::new("query", e))?;

        let entries = rows
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| PersistenceError::new("query", e))?;
        Ok(entries)
    }
}

impl ChangeStore for SqliteStore {
    fn append_all(&self, entries: &[ChangeEntry]) -> StoreResult<usize> {
        if entries.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn();
        let tx = conn.transaction().map_err(|e| PersistenceError::new("write", e))?;
        {
            let mut stmt = tx.prepare(INSERT_ROW).map_err(|e| PersistenceError::new("write", e))?;
            for entry in entries {
                stmt.execute(params![
                    entry.extension,
                    entry.filename,
                    entry.path.to_string_lossy().into_owned(),
                    entry.kind.as_str(),
                    entry.date_string(),
                ])
                .map_err(|e| PersistenceError::new("write", e))?;
            }
        }
        // Dropping an uncommitted transaction rolls it back
        tx.commit().map_err(|e| PersistenceError::new("write", e))?;

        tracing::debug!("Wrote {} rows", entries.len());
        Ok(entries.len())
    }

    fn query_all(&self) -> StoreResult<Vec<ChangeEntry>> {
        self.select(SELECT_ALL, None)
    }

    fn query_by_extension(&self, extension: &str) -> StoreResult<Vec<ChangeEntry>> {
        self.select(SELECT_BY_EXTENSION, Some(extension))
    }

    fn delete_all(&self) -> StoreResult<usize> {
        let removed = self
            .conn()
            .execute("DELETE FROM changes", [])
            .map_err(|e| PersistenceError::new("delete", e))?;
        tracing::debug!("Deleted {} rows", removed);
        Ok(removed)
    }
}

fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<ChangeEntry> {
    let extension: Option<String> = row.get(0)?;
    let filename: Option<String> = row.get(1)?;
    let path: Option<String> = row.get(2)?;
    let event: Option<String> = row.get(3)?;
    let date: Option<String> = row.get(4)?;

    let kind = event
        .as_deref()
        .unwrap_or_default()
        .parse::<ChangeKind>()
        .map_err(|msg| conversion_error(3, msg))?;
    let timestamp = DateTime::parse_from_rfc3339(date.as_deref().unwrap_or_default())
        .map_err(|e| conversion_error(4, e.to_string()))?
        .with_timezone(&Local);

    Ok(ChangeEntry {
        extension: extension.unwrap_or_default(),
        filename: filename.unwrap_or_default(),
        path: PathBuf::from(path.unwrap_or_default()),
        kind,
        timestamp,
    })
}

fn conversion_error(column: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        column,
        rusqlite::types::Type::Text,
        message.into(),
    )
}
