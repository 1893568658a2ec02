//! Migration system for evolving the database schema in ordered steps.
//!
//! Each [`Migration`] has a string identifier; identifiers are applied in
//! ascending lexicographic order, so callers should use zero-padded prefixes
//! such as `001_users`. Applied migrations are tracked in the
//! `schema_migrations` table, one row per identifier.
//!
//! Every migration runs in its own transaction together with its ledger row:
//! a step either commits completely or leaves no trace. A failing step aborts
//! the run, earlier steps stay committed, and running again resumes where the
//! failed run stopped.

mod error;
mod ledger;

pub use error::{BoxError, MigrationError};
pub use ledger::{Ledger, LedgerEntry};

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::time::Instant;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use serde::Serialize;
use tracing::{debug, error, info, warn};

/// A single schema or data change.
///
/// Implementations must only touch the database through the transaction they
/// are given. The transaction is committed or rolled back by the [`Migrator`].
pub trait Migration: Send + Sync {
    /// Stable, unique identifier. Sort order of identifiers is execution order.
    fn id(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    /// Forward change.
    fn apply(&self, tx: &Transaction<'_>) -> Result<(), BoxError>;

    /// Inverse of [`Migration::apply`]. Only used by explicit rollbacks.
    fn revert(&self, tx: &Transaction<'_>) -> Result<(), BoxError>;
}

/// Outcome of [`Migrator::run`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Migrations committed by this run, in execution order.
    pub applied: Vec<String>,
    /// Migrations found in the ledger and left alone.
    pub skipped: Vec<String>,
}

impl RunReport {
    pub fn is_noop(&self) -> bool {
        self.applied.is_empty()
    }
}

/// Ledger state of one registered migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationState {
    pub id: String,
    pub description: String,
    pub applied_at: Option<DateTime<Utc>>,
}

impl MigrationState {
    pub fn is_applied(&self) -> bool {
        self.applied_at.is_some()
    }
}

/// Snapshot returned by [`Migrator::status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationStatus {
    /// Registered migrations in execution order.
    pub migrations: Vec<MigrationState>,
    /// Ledger rows with no registered migration, e.g. written by a newer build.
    pub unknown: Vec<String>,
}

impl MigrationStatus {
    pub fn pending(&self) -> impl Iterator<Item = &MigrationState> {
        self.migrations.iter().filter(|m| !m.is_applied())
    }

    pub fn is_up_to_date(&self) -> bool {
        self.pending().next().is_none()
    }
}

enum Step {
    Skipped,
    Committed,
}

/// Applies registered migrations that are not yet recorded in the ledger.
#[derive(Default)]
pub struct Migrator {
    migrations: BTreeMap<String, Box<dyn Migration>>,
}

impl Migrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a migrator from a list of migrations, rejecting duplicate identifiers.
    pub fn with_migrations<I>(migrations: I) -> Result<Self, MigrationError>
    where
        I: IntoIterator<Item = Box<dyn Migration>>,
    {
        let mut migrator = Self::new();
        for migration in migrations {
            migrator.register_boxed(migration)?;
        }
        Ok(migrator)
    }

    pub fn register<M>(&mut self, migration: M) -> Result<(), MigrationError>
    where
        M: Migration + 'static,
    {
        self.register_boxed(Box::new(migration))
    }

    pub fn register_boxed(
        &mut self,
        migration: Box<dyn Migration>,
    ) -> Result<(), MigrationError> {
        let id = migration.id();
        if id.is_empty() {
            return Err(MigrationError::InvalidId);
        }

        match self.migrations.entry(id.to_string()) {
            Entry::Occupied(entry) => Err(MigrationError::Duplicate(entry.key().clone())),
            Entry::Vacant(entry) => {
                entry.insert(migration);
                Ok(())
            }
        }
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }

    /// Registered identifiers in execution order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.migrations.keys().map(String::as_str)
    }

    /// Apply every pending migration, in identifier order, one transaction each.
    ///
    /// The ledger table is created first if needed. The run stops at the first
    /// failure and returns it; migrations committed before that point remain
    /// committed and are skipped by the next run.
    pub fn run(&self, conn: &mut Connection) -> Result<RunReport, MigrationError> {
        Ledger::ensure_table(conn).map_err(MigrationError::LedgerBootstrap)?;

        let mut report = RunReport::default();
        for (id, migration) in &self.migrations {
            let started = Instant::now();
            match apply_pending(conn, id, migration.as_ref()) {
                Ok(Step::Skipped) => {
                    debug!("migration {id} already applied, skipping");
                    report.skipped.push(id.clone());
                }
                Ok(Step::Committed) => {
                    info!(
                        "applied migration {id} in {}ms",
                        started.elapsed().as_millis()
                    );
                    report.applied.push(id.clone());
                }
                Err(e) => {
                    error!("migration run aborted: {e}");
                    return Err(e);
                }
            }
        }

        info!(
            "migration setup completed ({} applied, {} already up to date)",
            report.applied.len(),
            report.skipped.len()
        );
        Ok(report)
    }

    /// Compare registered migrations against the ledger without writing anything.
    pub fn status(&self, conn: &Connection) -> Result<MigrationStatus, MigrationError> {
        let entries = if Ledger::exists(conn).map_err(MigrationError::LedgerRead)? {
            Ledger::entries(conn).map_err(MigrationError::LedgerRead)?
        } else {
            Vec::new()
        };

        let mut applied: BTreeMap<String, DateTime<Utc>> = entries
            .into_iter()
            .map(|entry| (entry.migration_id, entry.applied_at))
            .collect();

        let migrations = self
            .migrations
            .iter()
            .map(|(id, migration)| MigrationState {
                id: id.clone(),
                description: migration.description().to_string(),
                applied_at: applied.remove(id),
            })
            .collect();

        Ok(MigrationStatus {
            migrations,
            unknown: applied.into_keys().collect(),
        })
    }

    /// Revert one applied migration and drop its ledger row, in one transaction.
    ///
    /// Never called by [`Migrator::run`]; this is for operators rolling back by hand.
    pub fn revert(&self, conn: &mut Connection, id: &str) -> Result<(), MigrationError> {
        let migration = self
            .migrations
            .get(id)
            .ok_or_else(|| MigrationError::Unknown(id.to_string()))?;

        if !Ledger::exists(conn).map_err(MigrationError::LedgerRead)? {
            return Err(MigrationError::NotApplied(id.to_string()));
        }

        let tx = begin(conn, id)?;
        if !Ledger::is_applied(&tx, id).map_err(MigrationError::LedgerRead)? {
            rollback(tx, id);
            return Err(MigrationError::NotApplied(id.to_string()));
        }

        if let Err(source) = migration.revert(&tx) {
            rollback(tx, id);
            return Err(MigrationError::Revert {
                id: id.to_string(),
                source,
            });
        }

        if let Err(source) = Ledger::remove(&tx, id) {
            rollback(tx, id);
            return Err(MigrationError::LedgerWrite {
                id: id.to_string(),
                source,
            });
        }

        commit(tx, id)?;
        info!("reverted migration {id}");
        Ok(())
    }

    /// Revert the last applied registered migration. Returns its id, or `None`
    /// when nothing is applied.
    pub fn revert_last(&self, conn: &mut Connection) -> Result<Option<String>, MigrationError> {
        let status = self.status(conn)?;
        let Some(last) = status
            .migrations
            .iter()
            .rev()
            .find(|m| m.is_applied())
            .map(|m| m.id.clone())
        else {
            return Ok(None);
        };

        self.revert(conn, &last)?;
        Ok(Some(last))
    }
}

// Check, apply and record one migration inside a single transaction.
fn apply_pending(
    conn: &mut Connection,
    id: &str,
    migration: &dyn Migration,
) -> Result<Step, MigrationError> {
    let tx = begin(conn, id)?;

    if Ledger::is_applied(&tx, id).map_err(MigrationError::LedgerRead)? {
        rollback(tx, id);
        return Ok(Step::Skipped);
    }

    if let Err(source) = migration.apply(&tx) {
        rollback(tx, id);
        return Err(MigrationError::Apply {
            id: id.to_string(),
            source,
        });
    }

    if let Err(source) = Ledger::record(&tx, id, Utc::now()) {
        rollback(tx, id);
        return Err(MigrationError::LedgerWrite {
            id: id.to_string(),
            source,
        });
    }

    commit(tx, id)?;
    Ok(Step::Committed)
}

// IMMEDIATE takes SQLite's write lock up front, so the ledger check and the
// insert cannot interleave with another writer on the same file.
fn begin<'c>(conn: &'c mut Connection, id: &str) -> Result<Transaction<'c>, MigrationError> {
    conn.transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(|source| MigrationError::Transaction {
            id: id.to_string(),
            source,
        })
}

fn commit(tx: Transaction<'_>, id: &str) -> Result<(), MigrationError> {
    tx.commit().map_err(|source| MigrationError::Transaction {
        id: id.to_string(),
        source,
    })
}

fn rollback(tx: Transaction<'_>, id: &str) {
    if let Err(e) = tx.rollback() {
        warn!("rollback of migration {id} failed: {e}");
    }
}
