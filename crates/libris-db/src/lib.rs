pub mod database;
pub mod migrations;
pub mod schema;

pub use database::Database;
pub use migrations::{
    BoxError, Ledger, LedgerEntry, Migration, MigrationError, MigrationState, MigrationStatus,
    Migrator, RunReport,
};
