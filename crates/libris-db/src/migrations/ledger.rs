use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, ffi, params};
use serde::Serialize;

const LEDGER_TABLE: &str = "schema_migrations";

/// One applied migration, as persisted in the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    pub migration_id: String,
    pub applied_at: DateTime<Utc>,
}

/// Reads and writes the `schema_migrations` table.
///
/// All functions take a plain connection; pass a `Transaction` (it derefs to
/// `Connection`) to make the write part of the migration's own unit of work.
pub struct Ledger;

impl Ledger {
    /// Create the ledger table if it does not exist yet. Existing rows are untouched.
    ///
    /// Fails if another kind of object (a view, say) already owns the name, since
    /// `CREATE TABLE IF NOT EXISTS` would silently accept it.
    pub fn ensure_table(conn: &Connection) -> rusqlite::Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                migration_id TEXT PRIMARY KEY,
                applied_at TIMESTAMP NOT NULL
            );",
        )?;

        let kind: String = conn.query_row(
            "SELECT type FROM sqlite_master WHERE name=?1 AND type != 'trigger'",
            params![LEDGER_TABLE],
            |row| row.get(0),
        )?;
        if kind != "table" {
            return Err(rusqlite::Error::SqliteFailure(
                ffi::Error::new(ffi::SQLITE_ERROR),
                Some(format!("{LEDGER_TABLE} is a {kind}, not a table")),
            ));
        }
        Ok(())
    }

    pub fn exists(conn: &Connection) -> rusqlite::Result<bool> {
        conn.query_row(
            "SELECT count(*) > 0 FROM sqlite_master WHERE type='table' AND name=?1",
            params![LEDGER_TABLE],
            |row| row.get(0),
        )
    }

    pub fn is_applied(conn: &Connection, migration_id: &str) -> rusqlite::Result<bool> {
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM schema_migrations WHERE migration_id = ?1)",
            params![migration_id],
            |row| row.get(0),
        )
    }

    /// Insert a ledger row. Fails on the primary key if the id is already recorded.
    pub fn record(
        conn: &Connection,
        migration_id: &str,
        applied_at: DateTime<Utc>,
    ) -> rusqlite::Result<()> {
        conn.execute(
            "INSERT INTO schema_migrations (migration_id, applied_at) VALUES (?1, ?2)",
            params![
                migration_id,
                applied_at.to_rfc3339_opts(SecondsFormat::Micros, true)
            ],
        )?;
        Ok(())
    }

    /// Delete a ledger row. Returns whether a row was removed.
    pub fn remove(conn: &Connection, migration_id: &str) -> rusqlite::Result<bool> {
        let deleted = conn.execute(
            "DELETE FROM schema_migrations WHERE migration_id = ?1",
            params![migration_id],
        )?;
        Ok(deleted > 0)
    }

    /// All ledger rows ordered by migration id.
    pub fn entries(conn: &Connection) -> rusqlite::Result<Vec<LedgerEntry>> {
        let mut stmt = conn.prepare(
            "SELECT migration_id, applied_at FROM schema_migrations ORDER BY migration_id ASC",
        )?;

        let rows = stmt.query_map([], |row| {
            let raw: String = row.get(1)?;
            let applied_at = parse_datetime(&raw).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e))
            })?;
            Ok(LedgerEntry {
                migration_id: row.get(0)?,
                applied_at,
            })
        })?;

        rows.collect()
    }
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // Rows written by hand with datetime('now') use "YYYY-MM-DD HH:MM:SS"
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                .map(|naive| naive.and_utc())
        })
}
