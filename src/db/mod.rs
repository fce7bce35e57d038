// Database module

pub mod migrations;
pub mod schema;

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use rusqlite::Connection;
use anyhow::{Context, Result};

use crate::constants::DB_BUSY_TIMEOUT_MS;

/// Open or create a database at the given path
pub fn open_db(db_path: &Path) -> Result<Connection> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Cannot create catalog directory {}", parent.display())
            })?;
        }
    }

    let conn = Connection::open(db_path)?;
    configure_connection(&conn)?;

    // WAL lets external readers keep their own connections while the scanner writes
    conn.execute_batch("PRAGMA journal_mode = WAL;")?;

    migrations::run_migrations(&conn)?;

    Ok(conn)
}

fn configure_connection(conn: &Connection) -> Result<()> {
    // Enable foreign keys (must be done per connection)
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.execute_batch(&format!("PRAGMA busy_timeout = {};", DB_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// The catalog store: a single writer connection behind a mutex.
///
/// All scanner mutations go through `with_transaction`, so a per-file
/// reconcile decision and its write are atomic with respect to every
/// other writer in this process.
pub struct Catalog {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog").field("path", &self.path).finish()
    }
}

impl Catalog {
    /// Open (and migrate) the catalog database at `db_path`.
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = open_db(db_path)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(db_path.to_path_buf()),
        })
    }

    /// In-memory catalog, used by tests and dry runs.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        configure_connection(&conn)?;
        migrations::run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Run `f` with exclusive access to the writer connection.
    pub fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> crate::error::Result<T>,
    ) -> crate::error::Result<T> {
        let guard = self.conn.lock()?;
        f(&guard)
    }

    /// Run `f` inside a transaction; commits on `Ok`, rolls back on `Err`.
    pub fn with_transaction<T>(
        &self,
        f: impl FnOnce(&Connection) -> crate::error::Result<T>,
    ) -> crate::error::Result<T> {
        let mut guard = self.conn.lock()?;
        let tx = guard.transaction()?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }
}
