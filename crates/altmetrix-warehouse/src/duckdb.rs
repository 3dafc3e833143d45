//! `DuckDB`-backed document store.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use ::duckdb::{Connection, ToSql};
use serde_json::Value;

use crate::migrations;
use crate::{check_revision, DocumentStore, Revision, StoreError, StoredDocument};

/// Configuration for the `DuckDB` document store.
#[derive(Debug, Clone)]
pub struct DuckDbStoreConfig {
    /// Path to the `DuckDB` database file.
    pub db_path: PathBuf,
}

impl DuckDbStoreConfig {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
        }
    }
}

/// Persistent [`DocumentStore`] keeping one row per document.
///
/// A single connection is shared behind a mutex; each operation runs inside
/// its own transaction so the revision check and the write are atomic.
pub struct DuckDbStore {
    db_path: Option<PathBuf>,
    connection: Mutex<Connection>,
}

impl DuckDbStore {
    /// Open (or create) a store at the configured path.
    pub fn open(config: DuckDbStoreConfig) -> Result<Self, StoreError> {
        if let Some(parent) = config.db_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let connection = Connection::open(&config.db_path)?;
        Self::initialize(connection, Some(config.db_path))
    }

    /// Open a throwaway in-memory database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let connection = Connection::open_in_memory()?;
        Self::initialize(connection, None)
    }

    fn initialize(connection: Connection, db_path: Option<PathBuf>) -> Result<Self, StoreError> {
        connection.execute_batch("PRAGMA disable_progress_bar;")?;
        migrations::apply_migrations(&connection)?;
        Ok(Self {
            db_path,
            connection: Mutex::new(connection),
        })
    }

    /// Path to the database file, `None` for in-memory stores.
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }
}

impl DocumentStore for DuckDbStore {
    fn get(&self, id: &str) -> Result<Option<StoredDocument>, StoreError> {
        let connection = self
            .connection
            .lock()
            .expect("duckdb store mutex poisoned");
        let Some((rev, body)) = read_row(&connection, id)? else {
            return Ok(None);
        };

        Ok(Some(StoredDocument {
            id: id.to_owned(),
            rev,
            body: serde_json::from_str(&body)?,
        }))
    }

    fn put(
        &self,
        id: &str,
        body: &Value,
        expected: Option<&Revision>,
    ) -> Result<Revision, StoreError> {
        let encoded = serde_json::to_string(body)?;
        let connection = self
            .connection
            .lock()
            .expect("duckdb store mutex poisoned");

        connection.execute_batch("BEGIN TRANSACTION")?;
        let result = (|| -> Result<Revision, StoreError> {
            let current = read_row(&connection, id)?.map(|(rev, _)| rev);
            check_revision(id, expected, current.as_ref())?;

            let rev = Revision::next(current.as_ref());
            let params: [&dyn ToSql; 3] = [&id, &rev.as_str(), &encoded];
            connection.execute(
                "INSERT OR REPLACE INTO documents (id, rev, body, updated_at) \
                 VALUES (?, ?, ?, CURRENT_TIMESTAMP)",
                params.as_slice(),
            )?;
            Ok(rev)
        })();

        finalize_transaction(&connection, result)
    }

    fn delete(&self, id: &str) -> Result<(), StoreError> {
        let connection = self
            .connection
            .lock()
            .expect("duckdb store mutex poisoned");
        let params: [&dyn ToSql; 1] = [&id];
        let removed = connection.execute("DELETE FROM documents WHERE id = ?", params.as_slice())?;
        if removed == 0 {
            return Err(StoreError::not_found(id));
        }
        Ok(())
    }
}

fn read_row(connection: &Connection, id: &str) -> Result<Option<(Revision, String)>, StoreError> {
    let params: [&dyn ToSql; 1] = [&id];
    let mut statement = connection.prepare("SELECT rev, body FROM documents WHERE id = ?")?;
    let mut rows = statement.query(params.as_slice())?;
    let Some(row) = rows.next()? else {
        return Ok(None);
    };

    let rev: String = row.get(0)?;
    let body: String = row.get(1)?;
    Ok(Some((Revision::new(rev), body)))
}

/// Finalize a transaction, committing on success or rolling back on failure.
fn finalize_transaction<T>(
    connection: &Connection,
    result: Result<T, StoreError>,
) -> Result<T, StoreError> {
    match result {
        Ok(value) => {
            connection.execute_batch("COMMIT")?;
            Ok(value)
        }
        Err(error) => {
            let _ = connection.execute_batch("ROLLBACK");
            Err(error)
        }
    }
}
