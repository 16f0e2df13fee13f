//! SQLite-backed record store.
//!
//! Batches run inside a single transaction: preconditions are read and
//! checked first, and any failure rolls the whole batch back.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use tokio::sync::Mutex;

use whisper_proto::Address;

use crate::store::{RecordStore, StoreError, WriteBatch};

/// Current schema version for migrations.
const SCHEMA_VERSION: i32 = 1;

/// Persistent store over a single SQLite connection.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and run migrations.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|e| {
            StoreError::OperationFailed(format!("failed to open database: {}", e))
        })?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| StoreError::OperationFailed(format!("failed to set pragmas: {}", e)))?;

        Self::run_migrations(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn new_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|e| {
            StoreError::OperationFailed(format!("failed to open in-memory database: {}", e))
        })?;

        Self::run_migrations(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn run_migrations(conn: &Connection) -> Result<(), StoreError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY
            )",
            [],
        )
        .map_err(|e| StoreError::OperationFailed(format!("failed to create schema_version: {}", e)))?;

        let current_version: i32 = conn
            .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |row| {
                row.get(0)
            })
            .map_err(|e| StoreError::OperationFailed(format!("failed to read schema version: {}", e)))?;

        if current_version > SCHEMA_VERSION {
            return Err(StoreError::DataCorruption(format!(
                "database schema version {} is newer than supported version {}",
                current_version, SCHEMA_VERSION
            )));
        }

        if current_version < 1 {
            Self::migrate_v1(conn)?;
        }

        Ok(())
    }

    fn migrate_v1(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS records (
                address BLOB PRIMARY KEY,
                data BLOB NOT NULL
            );

            CREATE TABLE IF NOT EXISTS ledger_meta (
                id INTEGER PRIMARY KEY CHECK (id = 0),
                sequence INTEGER NOT NULL
            );
            INSERT OR IGNORE INTO ledger_meta (id, sequence) VALUES (0, 0);

            INSERT INTO schema_version (version) VALUES (1);
            "#,
        )
        .map_err(|e| StoreError::OperationFailed(format!("migration v1 failed: {}", e)))?;

        Ok(())
    }

    fn read(tx: &Transaction<'_>, address: &Address) -> Result<Option<Vec<u8>>, StoreError> {
        tx.query_row(
            "SELECT data FROM records WHERE address = ?1",
            params![address.as_bytes().as_slice()],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| StoreError::OperationFailed(format!("failed to read record: {}", e)))
    }
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn get(&self, address: &Address) -> Result<Option<Vec<u8>>, StoreError> {
        let conn = self.conn.lock().await;
        conn.query_row(
            "SELECT data FROM records WHERE address = ?1",
            params![address.as_bytes().as_slice()],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| StoreError::OperationFailed(format!("failed to get record: {}", e)))
    }

    async fn commit(&self, batch: WriteBatch) -> Result<u64, StoreError> {
        batch.check_distinct()?;

        let mut conn = self.conn.lock().await;
        let tx = conn
            .transaction()
            .map_err(|e| StoreError::OperationFailed(format!("failed to begin transaction: {}", e)))?;

        for write in batch.writes() {
            let current = Self::read(&tx, &write.address)?;
            if !write.expect.holds(current.as_deref()) {
                // Dropping `tx` rolls back.
                return Err(StoreError::Conflict {
                    address: write.address,
                });
            }
        }

        for write in batch.writes() {
            let key = write.address.as_bytes().as_slice();
            let result = match &write.value {
                Some(value) => tx.execute(
                    "INSERT OR REPLACE INTO records (address, data) VALUES (?1, ?2)",
                    params![key, value],
                ),
                None => tx.execute("DELETE FROM records WHERE address = ?1", params![key]),
            };
            result.map_err(|e| StoreError::OperationFailed(format!("failed to write record: {}", e)))?;
        }

        tx.execute("UPDATE ledger_meta SET sequence = sequence + 1 WHERE id = 0", [])
            .map_err(|e| StoreError::OperationFailed(format!("failed to bump sequence: {}", e)))?;
        let sequence: i64 = tx
            .query_row("SELECT sequence FROM ledger_meta WHERE id = 0", [], |row| row.get(0))
            .map_err(|e| StoreError::OperationFailed(format!("failed to read sequence: {}", e)))?;

        tx.commit()
            .map_err(|e| StoreError::OperationFailed(format!("failed to commit: {}", e)))?;

        u64::try_from(sequence)
            .map_err(|_| StoreError::DataCorruption(format!("negative sequence {}", sequence)))
    }

    async fn sequence(&self) -> Result<u64, StoreError> {
        let conn = self.conn.lock().await;
        let sequence: i64 = conn
            .query_row("SELECT sequence FROM ledger_meta WHERE id = 0", [], |row| row.get(0))
            .map_err(|e| StoreError::OperationFailed(format!("failed to read sequence: {}", e)))?;
        u64::try_from(sequence)
            .map_err(|_| StoreError::DataCorruption(format!("negative sequence {}", sequence)))
    }
}
