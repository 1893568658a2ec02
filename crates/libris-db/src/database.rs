use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use libris_common::{Error, Result};
use rusqlite::Connection;
use tracing::info;

use crate::migrations::{
    Ledger, LedgerEntry, MigrationError, MigrationStatus, Migrator, RunReport,
};

/// Handle to the application's SQLite database.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(db_path: &Path, busy_timeout: Duration) -> Result<Self> {
        info!("opening database at {}", db_path.display());
        let conn = Connection::open(db_path)
            .map_err(|e| Error::Database(format!("failed to open database: {e}")))?;

        conn.busy_timeout(busy_timeout)
            .map_err(|e| Error::Database(format!("failed to set busy timeout: {e}")))?;

        Self::configure(conn)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Database(format!("failed to open in-memory database: {e}")))?;

        Self::configure(conn)
    }

    fn configure(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .map_err(|e| Error::Database(format!("failed to set pragmas: {e}")))?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn connection(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Database("database lock poisoned".into()))
    }

    /// Apply all pending migrations of `migrator`.
    pub fn migrate(&self, migrator: &Migrator) -> Result<RunReport> {
        let mut conn = self.connection()?;
        Ok(migrator.run(&mut conn)?)
    }

    pub fn migration_status(&self, migrator: &Migrator) -> Result<MigrationStatus> {
        let conn = self.connection()?;
        Ok(migrator.status(&conn)?)
    }

    /// Revert `id`, or the most recently applied migration when `id` is `None`.
    /// Returns the reverted migration, `None` if there was nothing to revert.
    pub fn rollback(&self, migrator: &Migrator, id: Option<&str>) -> Result<Option<String>> {
        let mut conn = self.connection()?;
        match id {
            Some(id) => {
                migrator.revert(&mut conn, id)?;
                Ok(Some(id.to_string()))
            }
            None => Ok(migrator.revert_last(&mut conn)?),
        }
    }

    pub fn ledger_entries(&self) -> Result<Vec<LedgerEntry>> {
        let conn = self.connection()?;
        let exists = Ledger::exists(&conn).map_err(MigrationError::LedgerRead)?;
        if !exists {
            return Ok(Vec::new());
        }
        Ok(Ledger::entries(&conn).map_err(MigrationError::LedgerRead)?)
    }

    pub fn table_row_count(&self, table: &str) -> Result<usize> {
        let valid = !table.is_empty()
            && table
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid {
            return Err(Error::Database(format!("invalid table name: {table}")));
        }

        let conn = self.connection()?;
        let count: i64 = conn
            .query_row(&format!("SELECT COUNT(*) FROM [{table}]"), [], |row| {
                row.get(0)
            })
            .map_err(|e| Error::Database(format!("failed to count rows in {table}: {e}")))?;
        Ok(count as usize)
    }
}
