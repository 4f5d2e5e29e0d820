#![forbid(unsafe_code)]

//! SQLite connection management for nested-set tables.

use std::path::Path;
use std::time::Duration;

use rusqlite::{Connection, OpenFlags, Transaction, TransactionBehavior};
use tracing::debug;

use crate::error::{NestedSetError, Result};
use crate::schema::{quote, Schema};

/// Durability level applied through `PRAGMA synchronous`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Synchronous {
    /// Sync on every commit.
    Full,
    /// Sync at critical moments only; safe with WAL journaling.
    #[default]
    Normal,
    /// Never sync explicitly.
    Off,
}

impl Synchronous {
    /// Returns the pragma value.
    pub fn as_str(self) -> &'static str {
        match self {
            Synchronous::Full => "FULL",
            Synchronous::Normal => "NORMAL",
            Synchronous::Off => "OFF",
        }
    }
}

/// Journal mode applied through `PRAGMA journal_mode`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum JournalMode {
    /// Write-ahead log; readers proceed while a writer holds the lock.
    #[default]
    Wal,
    /// Rollback journal, deleted after each transaction.
    Delete,
}

impl JournalMode {
    /// Returns the pragma value.
    pub fn as_str(self) -> &'static str {
        match self {
            JournalMode::Wal => "WAL",
            JournalMode::Delete => "DELETE",
        }
    }
}

/// Options used when opening a database file.
#[derive(Clone, Debug)]
pub struct StoreOptions {
    /// Whether to create the database file when it does not exist.
    pub create_if_missing: bool,
    /// Journal mode of the database.
    pub journal_mode: JournalMode,
    /// Durability mode.
    pub synchronous: Synchronous,
    /// How long a writer waits for a competing writer before giving up.
    pub busy_timeout_ms: u64,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            journal_mode: JournalMode::Wal,
            synchronous: Synchronous::Normal,
            busy_timeout_ms: 5_000,
        }
    }
}

/// One connection to the relational store holding a tree table.
#[derive(Debug)]
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Opens (or creates) a database file and applies `opts`.
    pub fn open(path: impl AsRef<Path>, opts: &StoreOptions) -> Result<Self> {
        let path = path.as_ref();
        let mut flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        if opts.create_if_missing {
            flags |= OpenFlags::SQLITE_OPEN_CREATE;
        }
        let conn = Connection::open_with_flags(path, flags)?;
        conn.busy_timeout(Duration::from_millis(opts.busy_timeout_ms))?;
        let journal: String = conn.pragma_update_and_check(
            None,
            "journal_mode",
            opts.journal_mode.as_str(),
            |row| row.get(0),
        )?;
        conn.pragma_update(None, "synchronous", opts.synchronous.as_str())?;
        debug!(
            db_path = %path.display(),
            journal_mode = %journal,
            synchronous = opts.synchronous.as_str(),
            busy_timeout_ms = opts.busy_timeout_ms,
            "store.open"
        );
        Ok(Self { conn })
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        debug!("store.open_in_memory");
        Ok(Self { conn })
    }

    /// Borrows the underlying connection for reads.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Creates the tree table and its bound indexes when absent.
    pub fn ensure_table(&self, schema: &Schema) -> Result<()> {
        let table = quote(schema.table());
        let mut columns = vec![
            format!("{} INTEGER PRIMARY KEY", quote(schema.key_column())),
            format!("{} INTEGER NOT NULL", quote(schema.left_column())),
            format!("{} INTEGER NOT NULL", quote(schema.right_column())),
        ];
        columns.extend(schema.payload_columns().iter().map(|c| quote(c)));
        let mut ddl = format!(
            "CREATE TABLE IF NOT EXISTS {table} ({});",
            columns.join(", ")
        );
        for column in [schema.left_column(), schema.right_column()] {
            ddl.push_str(&format!(
                "CREATE INDEX IF NOT EXISTS {} ON {table} ({});",
                quote(&format!("{}_{}_idx", schema.table(), column)),
                quote(column)
            ));
        }
        self.conn.execute_batch(&ddl)?;
        debug!(table = schema.table(), "store.ensure_table");
        Ok(())
    }

    /// Number of rows in the tree table.
    pub fn count_rows(&self, schema: &Schema) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote(schema.table()));
        let count: i64 = self.conn.query_row(&sql, [], |row| row.get(0))?;
        u64::try_from(count)
            .map_err(|_| NestedSetError::configuration("negative row count reported"))
    }

    /// Begins a transaction holding the database-wide write lock.
    ///
    /// `BEGIN IMMEDIATE` takes the lock before the first statement so the
    /// target lookup and every renumbering update run under it. Dropping the
    /// guard without committing rolls back.
    pub(crate) fn write_txn(&mut self) -> Result<Transaction<'_>> {
        Ok(self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?)
    }
}
