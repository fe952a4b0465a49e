//! Versioned local store backed by a single SQLite file.
//!
//! [`Store`] owns the one live connection, opening it lazily on first use and
//! caching it for every caller that shares the `Store`. Opening migrates the
//! file up to [`SCHEMA_VERSION`]; if required tables are still missing (or the
//! file is not a database at all) the file is deleted and rebuilt from empty.
//! All SQLite work runs on tokio's blocking pool, one transaction per
//! operation.

mod collection;
mod error;
mod scan;
mod schema;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rusqlite::types::ToSql;
use rusqlite::{Connection, ErrorCode, OptionalExtension};
use tracing::{debug, info, warn};

pub use collection::{Collection, Order, WritableCollection};
pub use error::StoreError;
pub use scan::Scan;
pub use schema::{CollectionDef, StoreSchema, SCHEMA, SCHEMA_VERSION};

use collection::placeholders;

/// An open connection plus the schema it was opened at.
pub struct StoreHandle {
    conn: Mutex<Connection>,
    schema: StoreSchema,
}

impl StoreHandle {
    pub fn version(&self) -> i64 {
        self.schema.version
    }

    fn run<T, F>(&self, collection: &'static str, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|_| StoreError::Task("store connection lock poisoned".to_string()))?;

        let live = user_version(&conn).map_err(StoreError::transaction(collection))?;
        if live != self.schema.version {
            return Err(StoreError::VersionChanged {
                expected: self.schema.version,
                found: live,
            });
        }

        let outcome = {
            let tx = conn.transaction().map_err(StoreError::transaction(collection))?;
            let result = f(&tx).and_then(|value| tx.commit().map(|()| value));
            result
        };

        outcome.map_err(|source| {
            // A table dropped under a live handle leaves the version intact.
            match missing_collections(&conn, self.schema) {
                Ok(missing) if !missing.is_empty() => StoreError::SchemaMissing {
                    missing: missing.join(", "),
                },
                _ => StoreError::Transaction { collection, source },
            }
        })
    }
}

pub struct Store {
    path: PathBuf,
    schema: StoreSchema,
    handle: tokio::sync::Mutex<Option<Arc<StoreHandle>>>,
}

impl Store {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_schema(path, SCHEMA)
    }

    pub fn with_schema(path: impl Into<PathBuf>, schema: StoreSchema) -> Self {
        Self {
            path: path.into(),
            schema,
            handle: tokio::sync::Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Return the shared handle, opening (and migrating) the database if
    /// nothing is cached. Concurrent callers queue on the same lock, so only
    /// one open is ever in flight.
    pub async fn open(&self) -> Result<Arc<StoreHandle>, StoreError> {
        let mut cached = self.handle.lock().await;
        if let Some(handle) = cached.as_ref() {
            return Ok(Arc::clone(handle));
        }

        let path = self.path.clone();
        let schema = self.schema;
        let conn = tokio::task::spawn_blocking(move || open_with_rebuild(&path, schema))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))??;

        let handle = Arc::new(StoreHandle {
            conn: Mutex::new(conn),
            schema: self.schema,
        });
        *cached = Some(Arc::clone(&handle));
        debug!(path = %self.path.display(), version = self.schema.version, "Store opened");
        Ok(handle)
    }

    pub async fn is_open(&self) -> bool {
        self.handle.lock().await.is_some()
    }

    /// Release the cached handle. The next operation re-opens.
    pub async fn close(&self) {
        if self.handle.lock().await.take().is_some() {
            debug!(path = %self.path.display(), "Store closed");
        }
    }

    /// Drop `stale` from the cache unless it has already been replaced.
    async fn invalidate(&self, stale: &Arc<StoreHandle>) {
        let mut cached = self.handle.lock().await;
        if cached.as_ref().is_some_and(|h| Arc::ptr_eq(h, stale)) {
            *cached = None;
        }
    }

    /// Run `f` inside one transaction on the shared connection.
    pub(crate) async fn transact<T, F>(&self, collection: &'static str, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let handle = self.open().await?;
        let worker = Arc::clone(&handle);
        let outcome = tokio::task::spawn_blocking(move || worker.run(collection, f))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))?;

        match &outcome {
            Err(StoreError::VersionChanged { expected, found }) => {
                warn!(expected, found, "Store schema changed by another process; releasing handle");
                self.invalidate(&handle).await;
            }
            Err(StoreError::SchemaMissing { missing }) => {
                warn!(%missing, "Store lost required collections; releasing handle for rebuild");
                self.invalidate(&handle).await;
            }
            _ => {}
        }
        outcome
    }

    // ========================================================================
    // Collection operations
    // ========================================================================

    pub async fn read<C: Collection>(&self, key: C::Key) -> Result<Option<C::Value>, StoreError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = ?1",
            C::COLUMNS.join(", "),
            C::NAME,
            C::KEY_COLUMN
        );
        self.transact(C::NAME, move |conn| {
            conn.query_row(&sql, rusqlite::params![key], |row| C::from_row(row, 0))
                .optional()
        })
        .await
    }

    /// Insert or replace the value stored under `key`.
    pub async fn write<C: WritableCollection>(&self, key: C::Key, value: C::Value) -> Result<(), StoreError> {
        let sql = format!(
            "INSERT OR REPLACE INTO {} ({}, {}) VALUES (?1, {})",
            C::NAME,
            C::KEY_COLUMN,
            C::COLUMNS.join(", "),
            placeholders(2, C::COLUMNS.len())
        );
        self.transact(C::NAME, move |conn| {
            let mut params = vec![key.to_sql()?];
            params.extend(C::to_row(&value)?);
            conn.execute(&sql, rusqlite::params_from_iter(params.iter()))?;
            Ok(())
        })
        .await
    }

    /// Insert `value` under a store-assigned key and return that key.
    pub async fn insert<C: WritableCollection>(&self, value: C::Value) -> Result<C::Key, StoreError> {
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            C::NAME,
            C::COLUMNS.join(", "),
            placeholders(1, C::COLUMNS.len())
        );
        let key_sql = format!("SELECT {} FROM {} WHERE rowid = ?1", C::KEY_COLUMN, C::NAME);
        self.transact(C::NAME, move |conn| {
            let params = C::to_row(&value)?;
            conn.execute(&sql, rusqlite::params_from_iter(params.iter()))?;
            let rowid = conn.last_insert_rowid();
            conn.query_row(&key_sql, [rowid], |row| row.get(0))
        })
        .await
    }

    /// Delete the value under `key`. Missing keys are not an error.
    pub async fn delete<C: Collection>(&self, key: C::Key) -> Result<(), StoreError> {
        let sql = format!("DELETE FROM {} WHERE {} = ?1", C::NAME, C::KEY_COLUMN);
        self.transact(C::NAME, move |conn| {
            conn.execute(&sql, rusqlite::params![key])?;
            Ok(())
        })
        .await
    }

    pub async fn clear<C: Collection>(&self) -> Result<(), StoreError> {
        let sql = format!("DELETE FROM {}", C::NAME);
        self.transact(C::NAME, move |conn| {
            conn.execute(&sql, [])?;
            Ok(())
        })
        .await
    }

    pub async fn count<C: Collection>(&self) -> Result<usize, StoreError> {
        let sql = format!("SELECT COUNT(*) FROM {}", C::NAME);
        let count: i64 = self
            .transact(C::NAME, move |conn| conn.query_row(&sql, [], |row| row.get(0)))
            .await?;
        Ok(count.max(0) as usize)
    }

    /// Walk `C` ordered by the named index. Nothing is read until the first
    /// call to [`Scan::next`].
    pub fn scan<C: Collection>(&self, index: &str, order: Order) -> Result<Scan<'_, C>, StoreError> {
        let column = C::index_column(index).ok_or_else(|| StoreError::UnknownIndex {
            collection: C::NAME,
            index: index.to_string(),
        })?;
        Ok(Scan::new(self, column, order))
    }
}

// ============================================================================
// Opening and migration
// ============================================================================

enum OpenFailure {
    /// The file cannot be brought to a consistent schema; rebuild it.
    Rebuild(String),
    Fatal(StoreError),
}

impl From<rusqlite::Error> for OpenFailure {
    fn from(e: rusqlite::Error) -> Self {
        match e.sqlite_error_code() {
            Some(ErrorCode::NotADatabase) | Some(ErrorCode::DatabaseCorrupt) => {
                OpenFailure::Rebuild(e.to_string())
            }
            _ => OpenFailure::Fatal(StoreError::Unavailable(e.to_string())),
        }
    }
}

impl From<std::io::Error> for OpenFailure {
    fn from(e: std::io::Error) -> Self {
        OpenFailure::Fatal(StoreError::Io(e))
    }
}

fn open_with_rebuild(path: &Path, schema: StoreSchema) -> Result<Connection, StoreError> {
    match open_and_migrate(path, schema) {
        Ok(conn) => Ok(conn),
        Err(OpenFailure::Fatal(e)) => Err(e),
        Err(OpenFailure::Rebuild(reason)) => {
            warn!(path = %path.display(), %reason, "Store schema unrecoverable; rebuilding from empty");
            destroy(path)?;
            open_and_migrate(path, schema).map_err(|failure| match failure {
                OpenFailure::Fatal(e) => e,
                OpenFailure::Rebuild(reason) => {
                    StoreError::Unavailable(format!("rebuilt store is still inconsistent: {}", reason))
                }
            })
        }
    }
}

fn open_and_migrate(path: &Path, schema: StoreSchema) -> Result<Connection, OpenFailure> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut conn = Connection::open(path)?;
    conn.busy_timeout(Duration::from_secs(5))?;
    conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get::<_, String>(0))?;

    let stored = user_version(&conn)?;
    if stored > schema.version {
        return Err(OpenFailure::Fatal(StoreError::Unavailable(format!(
            "database version {} is newer than supported version {}",
            stored, schema.version
        ))));
    }

    if stored < schema.version {
        let tx = conn.transaction()?;
        for def in schema.introduced_after(stored) {
            tx.execute_batch(def.ddl)?;
        }
        tx.pragma_update(None, "user_version", schema.version)?;
        tx.commit()?;
        info!(from = stored, to = schema.version, "Migrated store schema");
    }

    let missing = missing_collections(&conn, schema)?;
    if !missing.is_empty() {
        return Err(OpenFailure::Rebuild(format!(
            "missing collections: {}",
            missing.join(", ")
        )));
    }
    Ok(conn)
}

fn user_version(conn: &Connection) -> rusqlite::Result<i64> {
    conn.query_row("PRAGMA user_version", [], |row| row.get(0))
}

fn missing_collections(conn: &Connection, schema: StoreSchema) -> rusqlite::Result<Vec<&'static str>> {
    let mut stmt = conn.prepare("SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1")?;
    let mut missing = Vec::new();
    for name in schema.names() {
        if !stmt.exists([name])? {
            missing.push(name);
        }
    }
    Ok(missing)
}

/// Delete the database file and its WAL side files.
fn destroy(path: &Path) -> Result<(), StoreError> {
    let mut targets = vec![path.to_path_buf()];
    for suffix in ["-wal", "-shm"] {
        let mut side = path.as_os_str().to_owned();
        side.push(suffix);
        targets.push(PathBuf::from(side));
    }
    for target in targets {
        match std::fs::remove_file(&target) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}
