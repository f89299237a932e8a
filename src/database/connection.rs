/*!
 * Database connection management.
 *
 * A `DatabaseConnection` owns one writer connection behind a mutex, so every
 * mutation serializes at this boundary, plus a small pool of read-only
 * connections for file-backed databases. With WAL journaling the readers
 * neither block each other nor the writer. All blocking SQLite work is moved
 * off the async runtime with `spawn_blocking`.
 */

use anyhow::{Context, Result};
use log::{debug, info};
use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::schema;

/// Default database filename
const DEFAULT_DB_FILENAME: &str = "translation_cache.db";

/// Default database directory name under user's data directory
const DEFAULT_DB_DIRNAME: &str = "subbatch";

/// Read-only connections opened for a file-backed database
const READER_POOL_SIZE: usize = 4;

/// How long a connection waits on a lock held by another process
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Database connection wrapper with single-writer, multi-reader access
#[derive(Clone)]
pub struct DatabaseConnection {
    /// Path to the database file
    db_path: PathBuf,
    /// The only connection allowed to write
    writer: Arc<Mutex<Connection>>,
    /// Read-only connections; empty for in-memory databases
    readers: Arc<Vec<Mutex<Connection>>>,
    /// Round-robin cursor into `readers`
    next_reader: Arc<AtomicUsize>,
}

impl DatabaseConnection {
    /// Create a new database connection at the default location
    pub fn new_default() -> Result<Self> {
        let db_path = Self::default_database_path()?;
        Self::new(&db_path)
    }

    /// Create a new database connection at the specified path
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create database directory: {:?}", parent))?;
            }
        }

        info!("Opening database at: {:?}", db_path);

        let writer = Connection::open(&db_path)
            .with_context(|| format!("Failed to open database: {:?}", db_path))?;
        writer.busy_timeout(BUSY_TIMEOUT)?;
        schema::initialize_schema(&writer)?;

        // Readers are opened after the schema exists
        let mut readers = Vec::with_capacity(READER_POOL_SIZE);
        for _ in 0..READER_POOL_SIZE {
            let reader = Connection::open_with_flags(
                &db_path,
                OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )
            .with_context(|| format!("Failed to open read connection: {:?}", db_path))?;
            reader.busy_timeout(BUSY_TIMEOUT)?;
            readers.push(Mutex::new(reader));
        }

        Ok(Self {
            db_path,
            writer: Arc::new(Mutex::new(writer)),
            readers: Arc::new(readers),
            next_reader: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Create an in-memory database (for testing)
    ///
    /// Reads and writes share the single connection.
    pub fn new_in_memory() -> Result<Self> {
        debug!("Creating in-memory database");

        let conn = Connection::open_in_memory().context("Failed to create in-memory database")?;
        schema::initialize_schema(&conn)?;

        Ok(Self {
            db_path: PathBuf::from(":memory:"),
            writer: Arc::new(Mutex::new(conn)),
            readers: Arc::new(Vec::new()),
            next_reader: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Get the default database path
    pub fn default_database_path() -> Result<PathBuf> {
        Ok(data_dir()?.join(DEFAULT_DB_FILENAME))
    }

    /// Get the database file path
    pub fn path(&self) -> &Path {
        &self.db_path
    }

    /// Whether this database lives only in memory
    pub fn is_in_memory(&self) -> bool {
        self.readers.is_empty()
    }

    /// Run a read-only operation on a pooled reader (or the writer for in-memory databases)
    pub fn read<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        if self.readers.is_empty() {
            let conn = self.writer.lock();
            return f(&conn);
        }

        let start = self.next_reader.fetch_add(1, Ordering::Relaxed);
        // Prefer an idle reader; only block if every reader is busy
        for offset in 0..self.readers.len() {
            let slot = &self.readers[(start + offset) % self.readers.len()];
            if let Some(conn) = slot.try_lock() {
                return f(&conn);
            }
        }
        let conn = self.readers[start % self.readers.len()].lock();
        f(&conn)
    }

    /// Run a mutating operation on the writer connection
    pub fn write<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.writer.lock();
        f(&conn)
    }

    /// Run a read-only operation without blocking the async runtime
    pub async fn read_async<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || db.read(f))
            .await
            .context("Database read task panicked")?
    }

    /// Run a mutating operation without blocking the async runtime
    pub async fn write_async<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || db.write(f))
            .await
            .context("Database write task panicked")?
    }

    /// Run operations inside one writer transaction; nothing is committed on error
    pub async fn transaction_async<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&rusqlite::Transaction) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let writer = self.writer.clone();

        tokio::task::spawn_blocking(move || {
            let mut conn = writer.lock();
            let tx = conn.transaction()?;
            let result = f(&tx)?;
            tx.commit()?;
            Ok(result)
        })
        .await
        .context("Database transaction task panicked")?
    }

    /// Vacuum the database to reclaim space
    pub async fn vacuum_async(&self) -> Result<()> {
        self.write_async(|conn| {
            conn.execute_batch("VACUUM;")?;
            Ok(())
        })
        .await
    }

    /// Size of the database file in bytes (0 for in-memory databases)
    pub fn file_size(&self) -> u64 {
        if self.is_in_memory() {
            return 0;
        }
        std::fs::metadata(&self.db_path).map(|m| m.len()).unwrap_or(0)
    }
}

/// Base data directory for the cache database and checkpoints
pub fn data_dir() -> Result<PathBuf> {
    let base_dir = dirs::data_local_dir()
        .or_else(dirs::data_dir)
        .or_else(|| dirs::home_dir().map(|h| h.join(".local").join("share")))
        .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;

    Ok(base_dir.join(DEFAULT_DB_DIRNAME))
}
