use rusqlite::{Transaction, params};

use crate::migrations::{BoxError, Migration};

const SEED_USERS: [(&str, &str, &str, &str); 2] = [
    ("Alice", "alice@example.com", "password123", "admin"),
    ("Bob", "bob@example.com", "password123", "user"),
];

/// Creates the `users` table and seeds the initial accounts.
pub struct CreateUsersTable;

impl Migration for CreateUsersTable {
    fn id(&self) -> &str {
        "001_users"
    }

    fn description(&self) -> &str {
        "create users table with seed accounts"
    }

    fn apply(&self, tx: &Transaction<'_>) -> Result<(), BoxError> {
        tx.execute_batch(
            "CREATE TABLE users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                email TEXT NOT NULL UNIQUE,
                password TEXT NOT NULL,
                role TEXT NOT NULL DEFAULT 'user',
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );",
        )?;

        let mut insert = tx.prepare(
            "INSERT INTO users (name, email, password, role) VALUES (?1, ?2, ?3, ?4)",
        )?;
        for (name, email, password, role) in SEED_USERS {
            insert.execute(params![name, email, password, role])?;
        }
        Ok(())
    }

    fn revert(&self, tx: &Transaction<'_>) -> Result<(), BoxError> {
        tx.execute_batch("DROP TABLE IF EXISTS users;")?;
        Ok(())
    }
}
