//! SQLite storage layer.
//!
//! A single connection behind a mutex: one writer, serialized, which is all
//! the isolation the queue engine needs. WAL mode for durability, enforced
//! foreign keys so deleting a fifo cascades to its tickets.

mod migration;
pub mod records;

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, Transaction};
use tracing::info;
use uuid::Uuid;

pub use records::{FifoRecord, TicketRecord};

/// Storage configuration.
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// Path to the database file.
    pub path: PathBuf,
    /// Enable WAL mode (recommended).
    pub wal_mode: bool,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("state"),
            wal_mode: true,
        }
    }
}

impl SqliteConfig {
    /// Read the store path from `DATA_PATH` (default `state`).
    pub fn from_env() -> Self {
        let path = std::env::var("DATA_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("state"));
        Self {
            path,
            wal_mode: true,
        }
    }
}

/// SQLite-backed store for fifos and tickets.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
    pub path: PathBuf,
}

impl SqliteStorage {
    pub fn new(config: SqliteConfig) -> Result<Self, rusqlite::Error> {
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).ok();
            }
        }

        let conn = Connection::open(&config.path)?;
        Self::configure(&conn, config.wal_mode)?;
        info!(path = %config.path.display(), "sqlite initialized");

        Ok(Self {
            conn: Mutex::new(conn),
            path: config.path,
        })
    }

    /// In-memory store for tests.
    pub fn in_memory() -> Result<Self, rusqlite::Error> {
        let conn = Connection::open_in_memory()?;
        Self::configure(&conn, false)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: PathBuf::from(":memory:"),
        })
    }

    fn configure(conn: &Connection, wal_mode: bool) -> Result<(), rusqlite::Error> {
        conn.execute_batch(&format!(
            "PRAGMA journal_mode = {};
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;",
            if wal_mode { "WAL" } else { "MEMORY" },
        ))
    }

    /// Run database migrations.
    pub fn migrate(&self) -> Result<(), rusqlite::Error> {
        let conn = self.conn.lock();
        migration::migrate(&conn)
    }

    /// Run `f` inside a transaction: committed on `Ok`, rolled back on `Err`.
    pub fn transaction<T>(
        &self,
        f: impl FnOnce(&Transaction<'_>) -> Result<T, rusqlite::Error>,
    ) -> Result<T, rusqlite::Error> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    // Committed-state reads and single-statement writes used outside the
    // queue-advancement transaction.

    pub fn insert_fifo(&self, fifo: &FifoRecord) -> Result<(), rusqlite::Error> {
        records::insert_fifo(&self.conn.lock(), fifo)
    }

    pub fn fifo(&self, uuid: Uuid) -> Result<Option<FifoRecord>, rusqlite::Error> {
        records::fifo(&self.conn.lock(), uuid)
    }

    pub fn all_fifos(&self) -> Result<Vec<FifoRecord>, rusqlite::Error> {
        records::all_fifos(&self.conn.lock())
    }

    pub fn insert_ticket(&self, ticket: &TicketRecord) -> Result<(), rusqlite::Error> {
        records::insert_ticket(&self.conn.lock(), ticket)
    }

    pub fn ticket(&self, uuid: Uuid) -> Result<Option<TicketRecord>, rusqlite::Error> {
        records::ticket(&self.conn.lock(), uuid)
    }

    pub fn oldest_tickets(
        &self,
        fifo: Uuid,
        limit: usize,
    ) -> Result<Vec<TicketRecord>, rusqlite::Error> {
        records::oldest_tickets(&self.conn.lock(), fifo, limit)
    }

    pub fn accept_ticket(&self, uuid: Uuid, at: DateTime<Utc>) -> Result<bool, rusqlite::Error> {
        records::accept_ticket(&self.conn.lock(), uuid, at)
    }

    pub fn delete_ticket(&self, uuid: Uuid) -> Result<bool, rusqlite::Error> {
        records::delete_ticket(&self.conn.lock(), uuid)
    }
}
