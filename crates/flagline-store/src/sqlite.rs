// crates/flagline-store/src/sqlite.rs
// ============================================================================
// Module: SQLite Data Store
// Description: Durable `DataStore` backed by `SQLite`, with a single writer
//              thread and a pool of read-only connections.
// Purpose: Let a host survive a restart without a full re-fetch from the
//          data source, while keeping reads off the writer's lock.
// Dependencies: flagline-core, rusqlite, serde_json, sha2
// ============================================================================

//! ## Overview
//! Writes are serialized through one background thread holding the sole
//! write connection, the way a single-writer `SQLite` database demands;
//! reads are served from a round-robin pool of read-only connections so a
//! slow writer batch never blocks a concurrent evaluation. Every stored
//! blob carries a `SHA-256` hash of its canonical JSON form, checked on
//! load so on-disk corruption is detected rather than silently served.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::mpsc;
use std::sync::mpsc::SyncSender;
use std::sync::Arc;
use std::sync::Mutex;
use std::thread;

use flagline_core::DataKind;
use flagline_core::DataStore;
use flagline_core::DataStoreStatus;
use flagline_core::StatusBroadcaster;
use flagline_core::StoredItem;
use rusqlite::params;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use serde_json::Value;
use sha2::Digest;
use sha2::Sha256;

use crate::error::SqliteStoreError;

// ============================================================================
// SECTION: Config
// ============================================================================

/// Configuration for [`SqliteDataStore`].
///
/// # Invariants
/// - `read_pool_size` and `writer_queue_capacity` must be greater than zero.
#[derive(Debug, Clone)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout applied to every connection, in milliseconds.
    pub busy_timeout_ms: u64,
    /// Number of read-only connections in the round-robin pool.
    pub read_pool_size: usize,
    /// Bound on the number of writer commands queued before `upsert`/`init`
    /// blocks the caller.
    pub writer_queue_capacity: usize,
}

impl Default for SqliteStoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("flagline.sqlite"),
            busy_timeout_ms: 5_000,
            read_pool_size: 4,
            writer_queue_capacity: 1_024,
        }
    }
}

fn validate_config(config: &SqliteStoreConfig) -> Result<(), SqliteStoreError> {
    if config.read_pool_size == 0 {
        return Err(SqliteStoreError::InvalidConfig("read_pool_size must be greater than zero".to_owned()));
    }
    if config.writer_queue_capacity == 0 {
        return Err(SqliteStoreError::InvalidConfig(
            "writer_queue_capacity must be greater than zero".to_owned(),
        ));
    }
    Ok(())
}

// ============================================================================
// SECTION: Schema
// ============================================================================

fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let connection = Connection::open(&config.path)?;
    connection.busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms))?;
    connection.pragma_update(None, "journal_mode", "wal")?;
    connection.pragma_update(None, "synchronous", "normal")?;
    Ok(connection)
}

fn initialize_schema(connection: &Connection) -> Result<(), SqliteStoreError> {
    connection.execute_batch(
        "CREATE TABLE IF NOT EXISTS items (
            kind TEXT NOT NULL,
            key TEXT NOT NULL,
            version INTEGER NOT NULL,
            data TEXT,
            hash TEXT NOT NULL,
            PRIMARY KEY (kind, key)
        );
        CREATE TABLE IF NOT EXISTS store_meta (
            meta_key TEXT PRIMARY KEY,
            meta_value TEXT NOT NULL
        );",
    )?;
    Ok(())
}

fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Path(err.to_string()))?;
        }
    }
    Ok(())
}

fn hash_payload(kind: DataKind, key: &str, version: i64, data: Option<&Value>) -> String {
    let canonical = data.map(serde_json::Value::to_string).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(kind.name().as_bytes());
    hasher.update(key.as_bytes());
    hasher.update(version.to_le_bytes());
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}

// ============================================================================
// SECTION: Writer Gateway
// ============================================================================

enum WriterCommand {
    Init {
        flags: Vec<(String, StoredItem)>,
        segments: Vec<(String, StoredItem)>,
        response: mpsc::Sender<Result<(), SqliteStoreError>>,
    },
    Upsert {
        kind: DataKind,
        key: String,
        item: StoredItem,
        response: mpsc::Sender<Result<(), SqliteStoreError>>,
    },
}

struct WriterGateway {
    sender: SyncSender<WriterCommand>,
}

fn spawn_writer(
    connection: Connection,
    receiver: mpsc::Receiver<WriterCommand>,
) {
    thread::spawn(move || {
        for command in receiver {
            match command {
                WriterCommand::Init { flags, segments, response } => {
                    let result = apply_init(&connection, &flags, &segments);
                    let _ignored = response.send(result);
                }
                WriterCommand::Upsert { kind, key, item, response } => {
                    let result = apply_upsert(&connection, kind, &key, &item);
                    let _ignored = response.send(result);
                }
            }
        }
    });
}

fn apply_init(
    connection: &Connection,
    flags: &[(String, StoredItem)],
    segments: &[(String, StoredItem)],
) -> Result<(), SqliteStoreError> {
    connection.execute("DELETE FROM items", [])?;
    for (key, item) in flags {
        insert_item(connection, DataKind::Flags, key, item)?;
    }
    for (key, item) in segments {
        insert_item(connection, DataKind::Segments, key, item)?;
    }
    connection.execute(
        "INSERT INTO store_meta (meta_key, meta_value) VALUES ('initialized', '1')
         ON CONFLICT(meta_key) DO UPDATE SET meta_value = '1'",
        [],
    )?;
    Ok(())
}

fn insert_item(connection: &Connection, kind: DataKind, key: &str, item: &StoredItem) -> Result<(), SqliteStoreError> {
    let hash = hash_payload(kind, key, item.version, item.data.as_ref());
    let data_text = item.data.as_ref().map(serde_json::Value::to_string);
    connection.execute(
        "INSERT INTO items (kind, key, version, data, hash) VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(kind, key) DO UPDATE SET version = excluded.version, data = excluded.data, hash = excluded.hash",
        params![kind.name(), key, item.version, data_text, hash],
    )?;
    Ok(())
}

fn apply_upsert(connection: &Connection, kind: DataKind, key: &str, item: &StoredItem) -> Result<(), SqliteStoreError> {
    let existing_version: Option<i64> = connection
        .query_row(
            "SELECT version FROM items WHERE kind = ?1 AND key = ?2",
            params![kind.name(), key],
            |row| row.get(0),
        )
        .optional()?;
    if existing_version.is_some_and(|version| version >= item.version) {
        return Ok(());
    }
    insert_item(connection, kind, key, item)
}

// ============================================================================
// SECTION: Data Store
// ============================================================================

/// A durable, `SQLite`-backed [`DataStore`].
pub struct SqliteDataStore {
    read_connections: Arc<Vec<Mutex<Connection>>>,
    read_cursor: Arc<AtomicUsize>,
    writer: Arc<WriterGateway>,
    status: StatusBroadcaster<DataStoreStatus>,
}

impl SqliteDataStore {
    /// Opens (creating if absent) a `SQLite`-backed store at `config.path`.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] if the database cannot be opened,
    /// migrated, or if `config` is invalid.
    pub fn open(config: SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        validate_config(&config)?;
        ensure_parent_dir(&config.path)?;
        let write_connection = open_connection(&config)?;
        initialize_schema(&write_connection)?;

        let mut read_connections = Vec::with_capacity(config.read_pool_size);
        for _ in 0..config.read_pool_size {
            let read_connection = open_connection(&config)?;
            initialize_schema(&read_connection)?;
            read_connections.push(Mutex::new(read_connection));
        }

        let (sender, receiver) = mpsc::sync_channel(config.writer_queue_capacity);
        spawn_writer(write_connection, receiver);

        Ok(Self {
            read_connections: Arc::new(read_connections),
            read_cursor: Arc::new(AtomicUsize::new(0)),
            writer: Arc::new(WriterGateway { sender }),
            status: StatusBroadcaster::new(DataStoreStatus::available()),
        })
    }

    /// The store's observable availability status.
    #[must_use]
    pub const fn status(&self) -> &StatusBroadcaster<DataStoreStatus> {
        &self.status
    }

    fn with_read_connection<T>(&self, f: impl FnOnce(&Connection) -> Result<T, SqliteStoreError>) -> Result<T, SqliteStoreError> {
        let index = self.read_cursor.fetch_add(1, Ordering::Relaxed) % self.read_connections.len();
        #[allow(clippy::unwrap_used, reason = "poisoned mutex indicates a prior panic in this process; propagating would only mask it")]
        let connection = self.read_connections[index].lock().unwrap();
        f(&connection)
    }

    fn submit_and_wait(&self, build: impl FnOnce(mpsc::Sender<Result<(), SqliteStoreError>>) -> WriterCommand) -> Result<(), SqliteStoreError> {
        let (response_tx, response_rx) = mpsc::channel();
        let command = build(response_tx);
        self.writer
            .sender
            .send(command)
            .map_err(|_err| SqliteStoreError::WriterGone)?;
        response_rx.recv().map_err(|_err| SqliteStoreError::WriterGone)?
    }
}

impl DataStore for SqliteDataStore {
    type Error = SqliteStoreError;

    fn init(&self, flags: Vec<(String, StoredItem)>, segments: Vec<(String, StoredItem)>) -> Result<(), SqliteStoreError> {
        self.submit_and_wait(|response| WriterCommand::Init { flags, segments, response })
    }

    fn upsert(&self, kind: DataKind, key: &str, item: StoredItem) -> Result<(), SqliteStoreError> {
        let key = key.to_owned();
        self.submit_and_wait(|response| WriterCommand::Upsert { kind, key, item, response })
    }

    fn get(&self, kind: DataKind, key: &str) -> Result<Option<Value>, SqliteStoreError> {
        self.with_read_connection(|connection| {
            let row: Option<(i64, Option<String>, String)> = connection
                .query_row(
                    "SELECT version, data, hash FROM items WHERE kind = ?1 AND key = ?2",
                    params![kind.name(), key],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
                .optional()?;
            let Some((version, data_text, hash)) = row else {
                return Ok(None);
            };
            let data = data_text.map(|text| serde_json::from_str(&text)).transpose()?;
            let expected_hash = hash_payload(kind, key, version, data.as_ref());
            if expected_hash != hash {
                return Err(SqliteStoreError::HashMismatch { key: key.to_owned() });
            }
            Ok(data)
        })
    }

    fn all(&self, kind: DataKind) -> Result<Vec<(String, Value)>, SqliteStoreError> {
        self.with_read_connection(|connection| {
            let mut statement = connection.prepare(
                "SELECT key, version, data, hash FROM items WHERE kind = ?1 AND data IS NOT NULL",
            )?;
            let rows = statement.query_map(params![kind.name()], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?, row.get::<_, String>(2)?, row.get::<_, String>(3)?))
            })?;
            let mut out = Vec::new();
            for row in rows {
                let (key, version, data_text, hash) = row?;
                let data: Value = serde_json::from_str(&data_text)?;
                let expected_hash = hash_payload(kind, &key, version, Some(&data));
                if expected_hash != hash {
                    return Err(SqliteStoreError::HashMismatch { key });
                }
                out.push((key, data));
            }
            Ok(out)
        })
    }

    fn initialized(&self) -> Result<bool, SqliteStoreError> {
        self.with_read_connection(|connection| {
            let value: Option<String> = connection
                .query_row(
                    "SELECT meta_value FROM store_meta WHERE meta_key = 'initialized'",
                    [],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(value.as_deref() == Some("1"))
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "test assertions favor panics over error propagation"
    )]

    use serde_json::json;
    use tempfile::TempDir;

    use super::*;

    fn open_temp_store() -> (TempDir, SqliteDataStore) {
        let dir = TempDir::new().expect("tempdir");
        let config = SqliteStoreConfig { path: dir.path().join("store.sqlite"), ..SqliteStoreConfig::default() };
        let store = SqliteDataStore::open(config).expect("open");
        (dir, store)
    }

    #[test]
    fn init_then_get_round_trips_through_hash_check() {
        let (_dir, store) = open_temp_store();
        store
            .init(vec![("f".to_owned(), StoredItem::live(1, json!({"on": true})))], Vec::new())
            .expect("init");
        assert!(store.initialized().expect("read"));
        let value = store.get(DataKind::Flags, "f").expect("read").expect("present");
        assert_eq!(value, json!({"on": true}));
    }

    #[test]
    fn upsert_rejects_stale_version() {
        let (_dir, store) = open_temp_store();
        store.upsert(DataKind::Flags, "f", StoredItem::live(5, json!({"v": 1}))).expect("write");
        store.upsert(DataKind::Flags, "f", StoredItem::live(2, json!({"v": 2}))).expect("write");
        let value = store.get(DataKind::Flags, "f").expect("read").expect("present");
        assert_eq!(value, json!({"v": 1}));
    }

    #[test]
    fn tombstone_is_excluded_from_all() {
        let (_dir, store) = open_temp_store();
        store.upsert(DataKind::Segments, "s", StoredItem::live(1, json!({}))).expect("write");
        store.upsert(DataKind::Segments, "s", StoredItem::tombstone(2)).expect("write");
        assert!(store.get(DataKind::Segments, "s").expect("read").is_none());
        assert!(store.all(DataKind::Segments).expect("read").is_empty());
    }
}
